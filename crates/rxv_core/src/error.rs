//! Error types for rxv_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the inference and explanation pipeline.
///
/// Every variant propagates to the immediate caller unmodified; nothing in
/// the pipeline retries or substitutes a fallback value.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The image source could not be read or decoded.
    #[error("Image decode error: {0}")]
    ImageDecode(String),

    /// Channel or dimension mismatch against the engine input contract.
    #[error("Shape error: expected {expected}, got {got}")]
    Shape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// The model artifact could not be loaded.
    #[error("Engine load error: {0}")]
    EngineLoad(String),

    /// No activation point matching the request exists in the engine.
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// A class index has no entry in the class index map.
    #[error("Unknown class index {0}: not present in class map")]
    UnknownClass(usize),

    /// A caller-supplied argument is outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The class index map file could not be parsed.
    #[error("Class map error: {0}")]
    ClassMap(String),

    /// Tensor data could not be extracted or converted.
    #[error("Tensor error: {0}")]
    Tensor(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Build a [`CoreError::Shape`] from anything displayable.
    pub fn shape(expected: impl ToString, got: impl ToString) -> Self {
        Self::Shape {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}
