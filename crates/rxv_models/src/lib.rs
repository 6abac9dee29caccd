//! # rxv_models
//!
//! Models and the Burn inference engine adapter for rxvision.
//!
//! This crate provides:
//! - [`MedNet`] - compact convolutional classifier with named stages
//! - [`BurnEngine`] - [`rxv_core::InferenceEngine`] implementation over MedNet
//! - Checkpointing of weights, config and metadata as a model directory
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxv_models::BurnEngine;
//!
//! type Backend = Autodiff<NdArray>;
//!
//! let engine = BurnEngine::<Backend>::load("models/best", Default::default())?;
//! let probs = engine.forward(batch)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;
pub mod engine;

pub use checkpoint::{
    load_model_dir, load_record, save_model, save_model_dir, CheckpointError, CheckpointMetadata,
};
pub use cnn::*;
pub use engine::BurnEngine;
