//! # rxv_infer
//!
//! The rxvision prediction and explanation pipeline.
//!
//! This crate provides:
//! - [`format_top_k`]: ranked, labeled top-k extraction from a probability vector
//! - [`Predictor`]: single, batched and partial-batch prediction plus Grad-CAM
//!   explanation over a shared [`rxv_core::InferenceEngine`]
//! - [`PredictorConfig`]: JSON configuration that loads a model directory and
//!   class map into a ready predictor
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxv_infer::PredictorConfig;
//!
//! let predictor = PredictorConfig::load("predictor.json")?.build::<Autodiff<NdArray>>(device)?;
//! let results = predictor.predict_batch(vec![path_a, path_b], 3)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod format;
mod predictor;

pub use config::PredictorConfig;
pub use format::format_top_k;
pub use predictor::{
    BatchPredictionReport, Explanation, ExplanationReport, ModelInfo, PredictionReport, Predictor,
};
