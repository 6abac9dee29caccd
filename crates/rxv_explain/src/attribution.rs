//! Gradient-weighted class activation maps.

use burn::prelude::*;
use ndarray::Array2;
use rxv_core::{tensor_to_vec, CoreError, Result};
use serde::{Deserialize, Serialize};

/// Spatial importance map over an activation.
///
/// Shape `(height, width)` equals the activation's spatial extent, not the
/// input image's. Values lie in `[0, 1]`; the maximum is 1 unless the map is
/// all zeros, which means no spatial position contributed positively to the
/// target class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    height: usize,
    width: usize,
    values: Vec<f32>,
    /// Class the map explains.
    pub target_class: usize,
    /// Activation point the map was computed on.
    pub activation_point: String,
}

impl Heatmap {
    /// Wrap row-major values.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if `values.len() != height * width`.
    pub fn new(
        height: usize,
        width: usize,
        values: Vec<f32>,
        target_class: usize,
        activation_point: impl Into<String>,
    ) -> Result<Self> {
        if values.len() != height * width {
            return Err(CoreError::shape(
                format!("{} values for {height}x{width}", height * width),
                values.len(),
            ));
        }
        Ok(Self {
            height,
            width,
            values,
            target_class,
            activation_point: activation_point.into(),
        })
    }

    /// Spatial dimensions `(height, width)`.
    #[must_use]
    pub const fn dims(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.values.get(row * self.width + col).copied()
    }

    /// Row-major values.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Largest value (0 for the degenerate all-zero map).
    #[must_use]
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Check if no position carries positive evidence.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Values as nested rows.
    #[must_use]
    pub fn rows(&self) -> Vec<Vec<f32>> {
        self.values.chunks(self.width.max(1)).map(<[f32]>::to_vec).collect()
    }

    /// Values as a 2-D array.
    #[must_use]
    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.height, self.width), |(r, c)| {
            self.values[r * self.width + c]
        })
    }
}

/// Compute a Grad-CAM heatmap.
///
/// # Arguments
///
/// * `activations` - Captured activation of shape (1, h, w, channels)
/// * `gradients` - Gradient of the target score w.r.t. the activation, same shape
/// * `target_class` - Class the gradient was taken for
/// * `activation_point` - Name of the captured stage
///
/// # Returns
///
/// Heatmap of shape (h, w): channel weights are the spatial mean of the
/// gradients, the map is the weighted channel sum with negatives clamped to
/// zero, divided by its maximum. A zero maximum yields an all-zero map.
pub fn grad_cam<B: Backend>(
    activations: Tensor<B, 4>,
    gradients: Tensor<B, 4>,
    target_class: usize,
    activation_point: &str,
) -> Result<Heatmap> {
    let dims = activations.dims();
    if gradients.dims() != dims {
        return Err(CoreError::shape(
            format!("gradient dims {dims:?}"),
            format!("{:?}", gradients.dims()),
        ));
    }
    let [batch, height, width, channels] = dims;
    if batch != 1 {
        return Err(CoreError::shape("batch axis of size 1", batch));
    }

    // Global average pool the gradients: (h*w, channels) -> (1, channels)
    let weights = gradients.reshape([height * width, channels]).mean_dim(0);

    // Weight the activations and sum across channels: (h*w, channels) -> (h*w, 1)
    let cam = (activations.reshape([height * width, channels]) * weights).sum_dim(1);

    // ReLU
    let cam = cam.clamp_min(0.0);

    let mut values = tensor_to_vec(cam)?;
    let max = values.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for v in &mut values {
            *v /= max;
        }
    } else {
        values.iter_mut().for_each(|v| *v = 0.0);
    }

    Heatmap::new(height, width, values, target_class, activation_point)
}
