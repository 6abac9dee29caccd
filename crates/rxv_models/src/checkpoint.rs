//! Model checkpointing and serialization utilities.
//!
//! Weights are stored with Burn's named MessagePack recorder. A model
//! directory bundles everything needed to rebuild an engine:
//!
//! ```text
//! model_dir/
//! ├── config.json     # MedNetConfig
//! ├── model.mpk       # weights
//! └── metadata.json   # CheckpointMetadata (optional)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use rxv_models::{save_model_dir, load_model_dir, CheckpointMetadata, MedNetConfig};
//!
//! let config = MedNetConfig::default();
//! let model = config.init::<NdArray>(&device);
//! save_model_dir(&model, &config, &CheckpointMetadata::new("MedNet"), "models/best")?;
//!
//! let (model, config, metadata) = load_model_dir::<NdArray>("models/best", &device)?;
//! ```

use std::collections::HashMap;
use std::path::Path;

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use rxv_core::CoreError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::cnn::{MedNet, MedNetConfig};

/// Model weights file name.
pub const MODEL_WEIGHTS_FILE: &str = "model.mpk";
/// Model config file name.
pub const CONFIG_FILE: &str = "config.json";
/// Checkpoint metadata file name.
pub const METADATA_FILE: &str = "metadata.json";

/// Save a model's weights to a checkpoint file.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::record(&recorder, model.clone().into_record(), path.as_ref().to_path_buf())
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load a model record from a checkpoint file.
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(CheckpointError::Load(format!(
            "weights file not found: {}",
            path.display()
        )));
    }
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::load(&recorder, path.to_path_buf(), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Metadata stored next to a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Model version reported alongside predictions.
    pub version: String,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: u64,
    /// Validation accuracy (if known).
    pub val_acc: Option<f32>,
    /// Additional metadata.
    pub extra: HashMap<String, String>,
}

impl CheckpointMetadata {
    /// Create new metadata for an architecture, version `1.0.0`.
    pub fn new(arch: impl Into<String>) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            arch: arch.into(),
            version: "1.0.0".to_string(),
            created_at,
            val_acc: None,
            extra: HashMap::new(),
        }
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the validation accuracy.
    #[must_use]
    pub fn with_val_acc(mut self, acc: f32) -> Self {
        self.val_acc = Some(acc);
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(self, path.as_ref())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// Write a complete model directory.
pub fn save_model_dir<B: Backend>(
    model: &MedNet<B>,
    config: &MedNetConfig,
    metadata: &CheckpointMetadata,
    dir: impl AsRef<Path>,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| CheckpointError::Save(e.to_string()))?;

    write_json(config, &dir.join(CONFIG_FILE))?;
    metadata.save(dir.join(METADATA_FILE))?;
    save_model::<B, _>(model, dir.join(MODEL_WEIGHTS_FILE))?;

    tracing::info!("Saved {} model to {:?}", metadata.arch, dir);
    Ok(())
}

/// Read a model directory back into a model, its config and optional metadata.
pub fn load_model_dir<B: Backend>(
    dir: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(MedNet<B>, MedNetConfig, Option<CheckpointMetadata>)> {
    let dir = dir.as_ref();
    let config: MedNetConfig = read_json(&dir.join(CONFIG_FILE))?;
    config.validate().map_err(CheckpointError::InvalidFormat)?;

    let record = load_record::<B, MedNet<B>>(dir.join(MODEL_WEIGHTS_FILE), device)?;
    let model = config.init::<B>(device).load_record(record);

    let metadata_path = dir.join(METADATA_FILE);
    let metadata = if metadata_path.is_file() {
        Some(CheckpointMetadata::load(metadata_path)?)
    } else {
        None
    };

    Ok((model, config, metadata))
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| CheckpointError::Save(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| CheckpointError::Load(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&json).map_err(|e| CheckpointError::InvalidFormat(e.to_string()))
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Invalid format.
    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),
}

impl From<CheckpointError> for CoreError {
    fn from(err: CheckpointError) -> Self {
        CoreError::EngineLoad(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use rxv_core::ImageShape;

    type TestBackend = NdArray;

    #[test]
    fn test_checkpoint_metadata() {
        let meta = CheckpointMetadata::new("MedNet")
            .with_version("2.1.0")
            .with_val_acc(0.92)
            .with_extra("dataset", "pillbox");

        assert_eq!(meta.arch, "MedNet");
        assert_eq!(meta.version, "2.1.0");
        assert_eq!(meta.val_acc, Some(0.92));
        assert_eq!(meta.extra.get("dataset"), Some(&"pillbox".to_string()));
    }

    #[test]
    fn test_model_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = MedNetConfig::new(ImageShape::new(8, 8, 3), 2).with_filters(vec![3]);
        let model = config.init::<TestBackend>(&device);
        let meta = CheckpointMetadata::new("MedNet").with_version("0.3.0");

        save_model_dir(&model, &config, &meta, dir.path()).unwrap();
        let (loaded, loaded_config, loaded_meta) =
            load_model_dir::<TestBackend>(dir.path(), &device).unwrap();

        assert_eq!(loaded_config, config);
        assert_eq!(loaded_meta, Some(meta));

        let x = Tensor::<TestBackend, 4>::ones([1, 8, 8, 3], &device);
        let before: Vec<f32> = model.forward(x.clone()).into_data().to_vec().unwrap();
        let after: Vec<f32> = loaded.forward(x).into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_missing_dir() {
        let device = Default::default();
        let result = load_model_dir::<TestBackend>("/nonexistent/model", &device);
        assert!(matches!(result, Err(CheckpointError::Load(_))));
    }

    #[test]
    fn test_missing_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = MedNetConfig::default();
        write_json(&config, &dir.path().join(CONFIG_FILE)).unwrap();

        let device = Default::default();
        let result = load_model_dir::<TestBackend>(dir.path(), &device);
        assert!(matches!(result, Err(CheckpointError::Load(_))));
    }

    #[test]
    fn test_into_core_error() {
        let err: CoreError = CheckpointError::Load("boom".to_string()).into();
        assert!(matches!(err, CoreError::EngineLoad(_)));
    }
}
