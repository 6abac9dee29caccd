//! Predictor configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;
use rxv_core::{ClassIndexMap, CoreError, Result};
use rxv_explain::Explainer;
use rxv_models::BurnEngine;
use rxv_transforms::NormalizeConfig;
use serde::{Deserialize, Serialize};

use crate::predictor::Predictor;

/// Everything needed to stand up a [`Predictor`] over a saved model.
///
/// ```json
/// {
///   "model_dir": "models/best",
///   "class_map": "models/class_map.json",
///   "default_top_k": 3,
///   "activation_point": "conv1"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorConfig {
    /// Model directory (`config.json`, `model.mpk`, optional `metadata.json`).
    pub model_dir: PathBuf,
    /// Optional class map JSON.
    #[serde(default)]
    pub class_map: Option<PathBuf>,
    /// Number of predictions returned when the caller does not ask.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Activation point for explanations, `None` for the last conv stage.
    #[serde(default)]
    pub activation_point: Option<String>,
    /// Custom normalization; ImageNet statistics at the model input size when absent.
    #[serde(default)]
    pub normalize: Option<NormalizeConfig>,
}

fn default_top_k() -> usize {
    1
}

impl PredictorConfig {
    /// Config for a model directory with defaults elsewhere.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            class_map: None,
            default_top_k: default_top_k(),
            activation_point: None,
            normalize: None,
        }
    }

    /// Set the class map path.
    #[must_use]
    pub fn with_class_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.class_map = Some(path.into());
        self
    }

    /// Set the default top-k.
    #[must_use]
    pub fn with_default_top_k(mut self, top_k: usize) -> Self {
        self.default_top_k = top_k;
        self
    }

    /// Set the activation point.
    #[must_use]
    pub fn with_activation_point(mut self, name: impl Into<String>) -> Self {
        self.activation_point = Some(name.into());
        self
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            CoreError::InvalidArgument(format!("invalid predictor config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::InvalidArgument(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check values that do not depend on the model.
    pub fn validate(&self) -> Result<()> {
        if self.default_top_k == 0 {
            return Err(CoreError::InvalidArgument(
                "default_top_k must be at least 1".to_string(),
            ));
        }
        if let Some(normalize) = &self.normalize {
            normalize.validate()?;
        }
        Ok(())
    }

    /// Load the engine and class map and build a predictor.
    ///
    /// # Errors
    ///
    /// - [`CoreError::EngineLoad`] if the model directory cannot be loaded
    /// - [`CoreError::ClassMap`] if the class map cannot be read
    pub fn build<B: AutodiffBackend>(
        &self,
        device: B::Device,
    ) -> Result<Predictor<B, BurnEngine<B>>> {
        self.validate()?;
        let engine = BurnEngine::<B>::load(&self.model_dir, device)?;
        let version = engine.model_version().map(str::to_string);

        let mut predictor = Predictor::new(Arc::new(engine))?;
        if let Some(normalize) = &self.normalize {
            predictor = predictor.with_normalize_config(normalize.clone())?;
        }
        if let Some(path) = &self.class_map {
            predictor = predictor.with_class_map(Arc::new(ClassIndexMap::load(path)?));
        }
        if let Some(point) = &self.activation_point {
            predictor = predictor.with_explainer(Explainer::new().with_activation_point(point));
        }
        if let Some(version) = version {
            predictor = predictor.with_model_version(version);
        }
        Ok(predictor)
    }
}
