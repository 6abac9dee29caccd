//! # rxv_transforms
//!
//! Image preprocessing for rxvision inference.
//!
//! This crate provides:
//! - [`ImageSource`]: paths, encoded bytes, pixel arrays, or decoded images
//! - [`ImageNormalizer`]: decode, resize, rescale and per-channel normalization
//!   into a [`rxv_core::CanonicalImage`]
//!
//! Preprocessing must match what the model saw during training. The resize
//! filter ([`RESAMPLE_FILTER`]) and the channel statistics are fixed for that
//! reason.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rxv_transforms::{ImageNormalizer, ImageSource};
//!
//! let normalizer = ImageNormalizer::for_shape(engine.input_shape())?;
//! let image = normalizer.normalize::<NdArray>(ImageSource::Bytes(upload), &device)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod normalize;
pub mod source;

pub use normalize::{ImageNormalizer, NormalizeConfig, IMAGENET_MEAN, IMAGENET_STD};
pub use source::{ImageSource, RawPixels, RESAMPLE_FILTER};
