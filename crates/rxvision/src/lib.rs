//! # rxvision
//!
//! Medication image classification in Rust, with gradient-weighted visual
//! explanations.
//!
//! rxvision turns a trained image classifier into a serving pipeline:
//!
//! - **Preprocessing**: decode, resize and normalize images exactly as in training
//! - **Models**: the MedNet convolutional classifier and model directory checkpoints
//! - **Prediction**: single, batched and partial-batch top-k classification
//! - **Explainability**: Grad-CAM heatmaps for the predicted or a chosen class
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rxvision::prelude::*;
//!
//! type B = Autodiff<NdArray>;
//!
//! let engine = Arc::new(BurnEngine::<B>::load("models/best", Default::default())?);
//! let class_map = Arc::new(ClassIndexMap::load("models/best/class_map.json")?);
//! let predictor = Predictor::new(engine)?.with_class_map(class_map);
//!
//! // Top-3 labels for one image
//! let ranked = predictor.predict_single(PathBuf::from("pill.jpg"), 3)?;
//!
//! // Heatmap for the predicted class
//! let explanation = predictor.explain(PathBuf::from("pill.jpg"), None)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray, with autodiff

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use rxv_core as core;
pub use rxv_explain as explain;
pub use rxv_infer as infer;
pub use rxv_models as models;
pub use rxv_transforms as transforms;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use rxvision::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use rxv_core::{
        CanonicalBatch, CanonicalImage, ClassIndexMap, CoreError, ImageShape, InferenceEngine,
        Prediction, ProbabilityVector, RankedPrediction, Result,
    };

    // Backends
    #[cfg(feature = "backend-ndarray")]
    pub use rxv_core::backend::{Autodiff, NdArray};

    // Preprocessing
    pub use rxv_transforms::{ImageNormalizer, ImageSource, NormalizeConfig};

    // Models
    pub use rxv_models::{load_model_dir, save_model_dir, BurnEngine, CheckpointMetadata, MedNetConfig};

    // Explain
    pub use rxv_explain::{Explainer, Heatmap};

    // Inference
    pub use rxv_infer::{format_top_k, Explanation, Predictor, PredictorConfig};
}
