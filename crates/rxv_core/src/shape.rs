//! Image shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Input contract of an inference engine.
///
/// Follows the channels-last convention `(H, W, C)`:
/// - `H`: Image height in pixels
/// - `W`: Image width in pixels
/// - `C`: Color channels
///
/// # Example
///
/// ```rust
/// use rxv_core::ImageShape;
///
/// let shape = ImageShape::new(224, 224, 3);
/// assert_eq!(shape.height(), 224);
/// assert_eq!(shape.channels(), 3);
/// assert_eq!(shape.batch_dims(4), [4, 224, 224, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageShape {
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Create a shape from a slice of exactly 3 dimensions `[H, W, C]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice doesn't contain exactly 3 elements.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() != 3 {
            return Err(CoreError::shape("3 dimensions (H, W, C)", format!("{dims:?}")));
        }
        Ok(Self::new(dims[0], dims[1], dims[2]))
    }

    /// Image height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Image width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of channels.
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Number of values in one image.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Check if any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0 || self.channels == 0
    }

    /// Tensor dimensions for a batch of `n` images: `[n, H, W, C]`.
    #[must_use]
    pub const fn batch_dims(&self, n: usize) -> [usize; 4] {
        [n, self.height, self.width, self.channels]
    }
}

impl std::fmt::Display for ImageShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.height, self.width, self.channels)
    }
}
