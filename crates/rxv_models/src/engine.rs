//! Burn-backed implementation of [`InferenceEngine`].

use std::path::Path;

use burn::module::AutodiffModule;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use parking_lot::Mutex;
use rxv_core::{
    Activation, ActivationPoint, CanonicalBatch, CanonicalImage, CoreError, ImageShape,
    InferenceEngine, Result,
};

use crate::checkpoint::{load_model_dir, CheckpointMetadata};
use crate::cnn::{MedNet, MedNetConfig};

/// Inference engine over a [`MedNet`] model.
///
/// Keeps two copies of the weights: the autodiff model used for explanations
/// and its inner-backend twin (`model.valid()`) used for plain forward passes.
/// Neither copy is mutated after construction.
///
/// Burn modules are `Send` but not `Sync`, so each copy sits behind a lock.
/// The engine is `Send + Sync` and can be shared through an `Arc` by worker
/// threads; forward passes on one engine run one at a time.
#[derive(Debug)]
pub struct BurnEngine<B: AutodiffBackend> {
    config: MedNetConfig,
    metadata: Option<CheckpointMetadata>,
    model: Mutex<MedNet<B>>,
    eval_model: Mutex<MedNet<B::InnerBackend>>,
    device: B::Device,
}

impl<B: AutodiffBackend> BurnEngine<B> {
    /// Wrap an initialized model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineLoad`] if the config is not buildable.
    pub fn new(model: MedNet<B>, config: MedNetConfig, device: B::Device) -> Result<Self> {
        config.validate().map_err(CoreError::EngineLoad)?;
        if model.n_stages() != config.filters.len() {
            return Err(CoreError::EngineLoad(format!(
                "model has {} stages but config lists {}",
                model.n_stages(),
                config.filters.len()
            )));
        }
        let n_stages = model.n_stages();
        let eval_model = model.clone().valid();
        tracing::debug!("Built engine with {} conv stages", n_stages);
        Ok(Self {
            config,
            metadata: None,
            model: Mutex::new(model),
            eval_model: Mutex::new(eval_model),
            device,
        })
    }

    /// Load a model directory written by [`crate::save_model_dir`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EngineLoad`] if the config or weights cannot be read.
    pub fn load(dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let dir = dir.as_ref();
        let (model, config, metadata) = load_model_dir::<B>(dir, &device)?;
        let mut engine = Self::new(model, config, device)?;
        engine.metadata = metadata;
        tracing::info!(
            "Loaded engine from {:?}: input {}, {} classes",
            dir,
            engine.config.input_shape(),
            engine.config.n_classes
        );
        Ok(engine)
    }

    /// Attach checkpoint metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Model configuration.
    #[must_use]
    pub const fn config(&self) -> &MedNetConfig {
        &self.config
    }

    /// Checkpoint metadata, when loaded from a model directory.
    #[must_use]
    pub const fn metadata(&self) -> Option<&CheckpointMetadata> {
        self.metadata.as_ref()
    }

    /// Version string recorded in the checkpoint metadata.
    #[must_use]
    pub fn model_version(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.version.as_str())
    }

    fn stage_index(&self, name: &str) -> Result<usize> {
        name.strip_prefix("conv")
            .and_then(|i| i.parse::<usize>().ok())
            .filter(|&i| i >= 1 && i <= self.config.filters.len())
            .map(|i| i - 1)
            .ok_or_else(|| CoreError::LayerNotFound(name.to_string()))
    }

    fn check_shape(&self, got: ImageShape) -> Result<()> {
        let expected = self.config.input_shape();
        if got != expected {
            return Err(CoreError::shape(expected, got));
        }
        Ok(())
    }
}

impl<B: AutodiffBackend> InferenceEngine<B> for BurnEngine<B> {
    fn input_shape(&self) -> ImageShape {
        self.config.input_shape()
    }

    fn n_classes(&self) -> usize {
        self.config.n_classes
    }

    fn device(&self) -> B::Device {
        self.device.clone()
    }

    fn activation_points(&self) -> Vec<ActivationPoint> {
        self.config.activation_points()
    }

    fn forward(&self, batch: CanonicalBatch<B::InnerBackend>) -> Result<Tensor<B::InnerBackend, 2>> {
        self.check_shape(batch.image_shape())?;
        tracing::debug!("Forward pass on batch of {}", batch.len());
        Ok(self.eval_model.lock().forward_probs(batch.into_inner()))
    }

    fn forward_with_activation(
        &self,
        image: CanonicalImage<B>,
        point: Option<&str>,
    ) -> Result<(Activation<B>, Tensor<B, 2>)> {
        self.check_shape(image.shape())?;
        let name = self.resolve_activation_point(point)?;
        let stage = self.stage_index(&name)?;

        let x = image.into_inner().permute([0, 3, 1, 2]);
        let model = self.model.lock();
        let features = model.forward_features(x, stage);

        // Cut the graph at the activation so it becomes a tracked leaf of
        // this pass, channels last.
        let leaf = features.permute([0, 2, 3, 1]).detach().require_grad();
        let logits = model.forward_from(leaf.clone().permute([0, 3, 1, 2]), stage);
        drop(model);

        tracing::debug!("Captured activation '{}' with dims {:?}", name, leaf.dims());
        Ok((Activation::new(name, leaf), softmax(logits, 1)))
    }
}
