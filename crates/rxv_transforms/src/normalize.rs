//! Canonical image normalization.
//!
//! Converts any [`ImageSource`] into the tensor an engine expects:
//! decode, check channels, resize with the fixed filter, rescale to `[0, 1]`,
//! apply per-channel mean/std, add a batch axis of one.

use burn::prelude::*;
use rxv_core::{CanonicalImage, CoreError, ImageShape, Result};
use serde::{Deserialize, Serialize};

use crate::source::{ImageSource, RawPixels};

/// Per-channel means of the ImageNet training set (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel standard deviations of the ImageNet training set (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration for [`ImageNormalizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Target height after resizing.
    pub target_height: usize,
    /// Target width after resizing.
    pub target_width: usize,
    /// Expected channel count of decoded images.
    pub channels: usize,
    /// Per-channel mean subtracted after rescaling to `[0, 1]`.
    pub mean: Vec<f32>,
    /// Per-channel standard deviation divided after mean subtraction.
    pub std: Vec<f32>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self::imagenet(ImageShape::new(224, 224, 3))
    }
}

impl NormalizeConfig {
    /// ImageNet statistics for an engine input shape.
    pub fn imagenet(shape: ImageShape) -> Self {
        Self {
            target_height: shape.height(),
            target_width: shape.width(),
            channels: shape.channels(),
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
        }
    }

    /// Set custom per-channel statistics.
    #[must_use]
    pub fn with_stats(mut self, mean: Vec<f32>, std: Vec<f32>) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    /// The output shape `(H, W, C)`.
    #[must_use]
    pub fn shape(&self) -> ImageShape {
        ImageShape::new(self.target_height, self.target_width, self.channels)
    }

    /// Check that the statistics match the channel count and are usable.
    pub fn validate(&self) -> Result<()> {
        if self.shape().is_empty() {
            return Err(CoreError::InvalidArgument(format!(
                "normalizer target shape {} has a zero dimension",
                self.shape()
            )));
        }
        if self.mean.len() != self.channels || self.std.len() != self.channels {
            return Err(CoreError::InvalidArgument(format!(
                "expected {} mean/std values, got {}/{}",
                self.channels,
                self.mean.len(),
                self.std.len()
            )));
        }
        let bad_std = self
            .std
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_nan() || **s <= 0.0);
        if let Some((i, s)) = bad_std {
            return Err(CoreError::InvalidArgument(format!(
                "standard deviation at index {i} must be greater than 0, got {s}"
            )));
        }
        Ok(())
    }
}

/// Produces canonical image tensors.
///
/// Pure and deterministic: the same pixels always yield bit-identical values,
/// whichever [`ImageSource`] variant carried them.
///
/// # Example
///
/// ```rust,ignore
/// use rxv_transforms::{ImageNormalizer, NormalizeConfig};
///
/// let normalizer = ImageNormalizer::new(NormalizeConfig::default())?;
/// let image = normalizer.normalize::<NdArray>(PathBuf::from("pill.jpg"), &device)?;
/// assert_eq!(image.inner().dims(), [1, 224, 224, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    config: NormalizeConfig,
}

impl ImageNormalizer {
    /// Create a normalizer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the config fails validation.
    pub fn new(config: NormalizeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Normalizer with ImageNet statistics for an engine input shape.
    pub fn for_shape(shape: ImageShape) -> Result<Self> {
        Self::new(NormalizeConfig::imagenet(shape))
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Output shape `(H, W, C)`.
    #[must_use]
    pub fn output_shape(&self) -> ImageShape {
        self.config.shape()
    }

    /// Normalize into a tensor of shape `(1, H, W, C)` on `device`.
    pub fn normalize<B: Backend>(
        &self,
        source: impl Into<ImageSource>,
        device: &B::Device,
    ) -> Result<CanonicalImage<B>> {
        let values = self.normalize_values(source)?;
        CanonicalImage::from_values(values, self.output_shape(), device)
    }

    /// Normalize into channels-last values without building a tensor.
    pub fn normalize_values(&self, source: impl Into<ImageSource>) -> Result<Vec<f32>> {
        let pixels = RawPixels::decode(source.into())?;
        if pixels.channels != self.config.channels {
            return Err(CoreError::shape(
                format!("{} channels", self.config.channels),
                format!("{} channels", pixels.channels),
            ));
        }

        let shape = self.output_shape();
        tracing::trace!(
            "Normalizing {}x{} image to {}",
            pixels.height,
            pixels.width,
            shape
        );
        let pixels = pixels.resize(to_u32(shape.height())?, to_u32(shape.width())?)?;

        let channels = self.config.channels;
        let values = pixels
            .data
            .iter()
            .enumerate()
            .map(|(i, &px)| {
                let c = i % channels;
                let x = f32::from(px) / 255.0;
                (x - self.config.mean[c]) / self.config.std[c]
            })
            .collect();
        Ok(values)
    }
}

fn to_u32(dim: usize) -> Result<u32> {
    u32::try_from(dim).map_err(|_| CoreError::shape("dimension within u32", dim))
}
