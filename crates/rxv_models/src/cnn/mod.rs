//! CNN models for medication images.

mod mednet;

pub use mednet::{ConvStage, MedNet, MedNetConfig, POOL_STAGE};
