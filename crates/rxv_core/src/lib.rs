//! # rxv_core
//!
//! Core types and traits for rxvision medication image classification.
//!
//! This crate provides:
//! - [`ImageShape`] for the `(H, W, C)` input contract of an engine
//! - [`CanonicalImage`] and [`CanonicalBatch`] wrappers for normalized Burn tensors
//! - [`InferenceEngine`], the capability trait over a trained classifier
//! - [`ClassIndexMap`], [`ProbabilityVector`] and [`RankedPrediction`]
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image tensors follow the channels-last convention `(N, H, W, C)`:
//! - `N`: Batch size (1 for a single canonical image)
//! - `H`, `W`: Spatial size fixed by the engine
//! - `C`: Color channels
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxv_core::{CanonicalBatch, ImageShape};
//!
//! let shape = ImageShape::new(224, 224, 3);
//! let batch = CanonicalBatch::stack(vec![image_a, image_b])?;
//! let probs = engine.forward(batch)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod class_map;
mod engine;
mod error;
mod prediction;
mod shape;
mod tensor;

pub use class_map::ClassIndexMap;
pub use engine::{ActivationPoint, InferenceEngine};
pub use error::{CoreError, Result};
pub use prediction::{Prediction, ProbabilityVector, RankedPrediction};
pub use shape::ImageShape;
pub use tensor::{tensor_to_vec, Activation, CanonicalBatch, CanonicalImage};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    #[cfg(feature = "backend-ndarray")]
    pub use burn_autodiff::Autodiff;
}
