//! # rxv_explain
//!
//! Explainability for rxvision predictions: activation/gradient capture and
//! gradient-weighted class activation maps (Grad-CAM).
//!
//! This crate provides:
//! - [`ActivationCapture`], a per-request forward pass with its own autodiff graph
//! - [`grad_cam`], the heatmap reduction over an activation and its gradient
//! - [`Explainer`], which picks the target class and ties the two together

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod activation;
mod attribution;
mod explainer;

pub use activation::{ActivationCapture, GradientCapture};
pub use attribution::{grad_cam, Heatmap};
pub use explainer::Explainer;
