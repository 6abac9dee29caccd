//! MedNet: a compact convolutional classifier for medication images.
//!
//! Stacked `Conv2d -> ReLU` stages with valid padding, global average pooling
//! and a dense softmax head. The default configuration is a single 3x3 stage
//! with 16 filters, small enough to bootstrap a serving setup before a
//! trained checkpoint exists.
//!
//! The network has no dropout and no batch normalization, so evaluation on
//! an autodiff backend computes exactly what evaluation on the inner backend
//! computes.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};
use rxv_core::{ActivationPoint, ImageShape};
use serde::{Deserialize, Serialize};

/// Name of the global pooling stage.
pub const POOL_STAGE: &str = "gap";

/// Configuration for the MedNet model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedNetConfig {
    /// Input height.
    pub height: usize,
    /// Input width.
    pub width: usize,
    /// Input channels.
    pub channels: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Filters per convolutional stage, input side first.
    pub filters: Vec<usize>,
    /// Square kernel size shared by all stages.
    pub kernel_size: usize,
}

impl Default for MedNetConfig {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
            channels: 3,
            n_classes: 2,
            filters: vec![16],
            kernel_size: 3,
        }
    }
}

impl MedNetConfig {
    /// Create a new config with specified dimensions.
    pub fn new(input: ImageShape, n_classes: usize) -> Self {
        Self {
            height: input.height(),
            width: input.width(),
            channels: input.channels(),
            n_classes,
            ..Default::default()
        }
    }

    /// Set the filters of every stage.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<usize>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Input contract `(H, W, C)`.
    #[must_use]
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.height, self.width, self.channels)
    }

    /// Spatial extent `(h, w)` after the last convolutional stage.
    ///
    /// `None` if the stages shrink the input to nothing.
    #[must_use]
    pub fn output_spatial(&self) -> Option<(usize, usize)> {
        let shrink = self.filters.len() * self.kernel_size.saturating_sub(1);
        let h = self.height.checked_sub(shrink)?;
        let w = self.width.checked_sub(shrink)?;
        (h > 0 && w > 0).then_some((h, w))
    }

    /// Check that the configuration describes a buildable network.
    pub fn validate(&self) -> Result<(), String> {
        if self.input_shape().is_empty() {
            return Err(format!("input shape {} has a zero dimension", self.input_shape()));
        }
        if self.n_classes == 0 {
            return Err("n_classes must be at least 1".to_string());
        }
        if self.kernel_size == 0 || self.filters.iter().any(|&f| f == 0) {
            return Err("kernel size and filter counts must be positive".to_string());
        }
        if self.output_spatial().is_none() {
            return Err(format!(
                "{} stages of kernel {} leave no spatial extent for input {}",
                self.filters.len(),
                self.kernel_size,
                self.input_shape()
            ));
        }
        Ok(())
    }

    /// Stage names in forward order.
    pub fn activation_points(&self) -> Vec<ActivationPoint> {
        (1..=self.filters.len())
            .map(|i| ActivationPoint::spatial(format!("conv{i}")))
            .chain(std::iter::once(ActivationPoint::flat(POOL_STAGE)))
            .collect()
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MedNet<B> {
        MedNet::new(self, device)
    }
}

/// A single convolutional stage: Conv2d -> ReLU
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    /// Convolutional layer.
    conv: Conv2d<B>,
}

impl<B: Backend> ConvStage<B> {
    /// Create a new stage.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        Self { conv }
    }

    /// Forward pass on `(N, C, H, W)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }
}

/// Convolutional image classifier.
///
/// Architecture:
/// - `filters.len()` x (Conv2d(kernel, valid) -> ReLU), stages named `conv1..`
/// - Global average pooling (`gap`)
/// - Linear(filters.last(), n_classes) -> softmax
///
/// Public methods take channels-last `(N, H, W, C)` input; the stage-level
/// methods work on Burn's native `(N, C, H, W)`.
///
/// # Example
///
/// ```rust,ignore
/// use rxv_models::MedNetConfig;
///
/// let config = MedNetConfig::new(ImageShape::new(64, 64, 3), 5);
/// let model = config.init::<NdArray>(&device);
///
/// let x = Tensor::random([8, 64, 64, 3], Distribution::Normal(0.0, 1.0), &device);
/// let probs = model.forward_probs(x);
/// // probs shape: [8, 5]
/// ```
#[derive(Module, Debug)]
pub struct MedNet<B: Backend> {
    /// Convolutional stages.
    stages: Vec<ConvStage<B>>,
    /// Global average pooling.
    gap: AdaptiveAvgPool2d,
    /// Final linear classifier.
    fc: Linear<B>,
}

impl<B: Backend> MedNet<B> {
    /// Create a new model with freshly initialized weights.
    pub fn new(config: &MedNetConfig, device: &B::Device) -> Self {
        let mut in_channels = config.channels;
        let mut stages = Vec::with_capacity(config.filters.len());
        for &out_channels in &config.filters {
            stages.push(ConvStage::new(in_channels, out_channels, config.kernel_size, device));
            in_channels = out_channels;
        }

        let gap = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, config.n_classes).init(device);

        Self { stages, gap, fc }
    }

    /// Number of convolutional stages.
    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Forward pass returning logits.
    ///
    /// * `x` - Input tensor of shape (batch, height, width, channels)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = x.permute([0, 3, 1, 2]);
        match self.stages.len() {
            0 => self.forward_head(x),
            n => {
                let features = self.forward_features(x, n - 1);
                self.forward_from(features, n - 1)
            }
        }
    }

    /// Forward pass returning probabilities.
    pub fn forward_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Run stages `0..=stage` on `(N, C, H, W)` input.
    pub fn forward_features(&self, x: Tensor<B, 4>, stage: usize) -> Tensor<B, 4> {
        self.stages
            .iter()
            .take(stage + 1)
            .fold(x, |out, s| s.forward(out))
    }

    /// Continue from the output of `stage` to logits.
    pub fn forward_from(&self, features: Tensor<B, 4>, stage: usize) -> Tensor<B, 2> {
        let out = self
            .stages
            .iter()
            .skip(stage + 1)
            .fold(features, |out, s| s.forward(out));
        self.forward_head(out)
    }

    fn forward_head(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.gap.forward(x);
        let [batch, channels, _, _] = out.dims();
        self.fc.forward(out.reshape([batch, channels]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_mednet_config_default() {
        let config = MedNetConfig::default();
        assert_eq!(config.input_shape(), ImageShape::new(224, 224, 3));
        assert_eq!(config.filters, vec![16]);
        assert_eq!(config.kernel_size, 3);
        assert_eq!(config.output_spatial(), Some((222, 222)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mednet_config_builder() {
        let config = MedNetConfig::new(ImageShape::new(32, 32, 3), 5)
            .with_filters(vec![8, 16])
            .with_kernel_size(5);
        assert_eq!(config.n_classes, 5);
        assert_eq!(config.output_spatial(), Some((24, 24)));
    }

    #[test]
    fn test_mednet_config_invalid() {
        let too_deep = MedNetConfig::new(ImageShape::new(4, 4, 3), 2).with_filters(vec![4, 4]);
        assert!(too_deep.validate().is_err());

        let no_classes = MedNetConfig::new(ImageShape::new(16, 16, 3), 0);
        assert!(no_classes.validate().is_err());
    }

    #[test]
    fn test_activation_points() {
        let config = MedNetConfig::default().with_filters(vec![8, 8]);
        let points = config.activation_points();
        let names: Vec<_> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["conv1", "conv2", POOL_STAGE]);
        assert!(points[1].spatial);
        assert!(!points[2].spatial);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let config = MedNetConfig::new(ImageShape::new(12, 10, 3), 4).with_filters(vec![4, 6]);
        let model = config.init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::ones([2, 12, 10, 3], &device);
        let probs = model.forward_probs(x);
        assert_eq!(probs.dims(), [2, 4]);

        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_split_forward_matches_full() {
        let device = Default::default();
        let config = MedNetConfig::new(ImageShape::new(10, 10, 3), 3).with_filters(vec![4, 4]);
        let model = config.init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::random(
            [1, 10, 10, 3],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let full: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();

        let features = model.forward_features(x.permute([0, 3, 1, 2]), 0);
        assert_eq!(features.dims(), [1, 4, 8, 8]);
        let split: Vec<f32> = model.forward_from(features, 0).into_data().to_vec().unwrap();

        for (a, b) in full.iter().zip(split.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
