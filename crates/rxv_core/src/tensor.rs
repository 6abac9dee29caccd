//! Canonical image tensors and captured activations.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;

/// Copy a float tensor into a flat `Vec<f32>` in row-major order.
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::Tensor(format!("{e:?}")))
}

/// A single preprocessed image ready for the inference engine.
///
/// Wraps a Burn tensor of shape `(1, H, W, C)`: a leading batch axis of one,
/// then height, width and channels. Values are normalized per channel.
///
/// # Example
///
/// ```rust,ignore
/// use rxv_core::CanonicalImage;
///
/// let tensor = Tensor::<NdArray, 4>::zeros([1, 224, 224, 3], &device);
/// let image = CanonicalImage::new(tensor)?;
/// assert_eq!(image.shape().channels(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct CanonicalImage<B: Backend> {
    inner: Tensor<B, 4>,
    shape: ImageShape,
}

impl<B: Backend> CanonicalImage<B> {
    /// Wrap a tensor of shape `(1, H, W, C)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if the batch axis is not of size one.
    pub fn new(tensor: Tensor<B, 4>) -> Result<Self> {
        let [batch, height, width, channels] = tensor.dims();
        if batch != 1 {
            return Err(CoreError::shape("batch axis of size 1", batch));
        }
        Ok(Self {
            inner: tensor,
            shape: ImageShape::new(height, width, channels),
        })
    }

    /// Build from channels-last values of one image.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if `values.len()` does not match `shape`.
    pub fn from_values(values: Vec<f32>, shape: ImageShape, device: &B::Device) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(CoreError::shape(
                format!("{} values for {shape}", shape.numel()),
                values.len(),
            ));
        }
        let data = TensorData::new(values, shape.batch_dims(1));
        Ok(Self {
            inner: Tensor::from_data(data, device),
            shape,
        })
    }

    /// Spatial and channel dimensions of the image.
    #[must_use]
    pub const fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Reference to the underlying tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 4> {
        &self.inner
    }

    /// Consume self and return the underlying tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 4> {
        self.inner
    }

    /// Device holding the tensor.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }

    /// Copy the values out in `(H, W, C)` order.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        tensor_to_vec(self.inner.clone())
    }
}

impl<B: AutodiffBackend> CanonicalImage<B> {
    /// Lift an image built on the inner backend into the autodiff backend.
    pub fn from_inner(image: CanonicalImage<B::InnerBackend>) -> Self {
        Self {
            inner: Tensor::from_inner(image.inner),
            shape: image.shape,
        }
    }
}

/// A stack of canonical images along the batch axis, shape `(N, H, W, C)`.
#[derive(Debug, Clone)]
pub struct CanonicalBatch<B: Backend> {
    inner: Tensor<B, 4>,
    shape: ImageShape,
    len: usize,
}

impl<B: Backend> CanonicalBatch<B> {
    /// Stack images in order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty input and
    /// [`CoreError::Shape`] if the images do not share one shape.
    pub fn stack(images: Vec<CanonicalImage<B>>) -> Result<Self> {
        let shape = match images.first() {
            Some(first) => first.shape(),
            None => {
                return Err(CoreError::InvalidArgument(
                    "cannot stack an empty batch".to_string(),
                ))
            }
        };

        if let Some(bad) = images.iter().find(|img| img.shape() != shape) {
            return Err(CoreError::shape(shape, bad.shape()));
        }

        let len = images.len();
        let tensors: Vec<_> = images.into_iter().map(CanonicalImage::into_inner).collect();
        Ok(Self {
            inner: Tensor::cat(tensors, 0),
            shape,
            len,
        })
    }

    /// Shape of each image in the batch.
    #[must_use]
    pub const fn image_shape(&self) -> ImageShape {
        self.shape
    }

    /// Number of images.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the batch holds no images.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reference to the underlying tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 4> {
        &self.inner
    }

    /// Consume self and return the underlying tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 4> {
        self.inner
    }
}

impl<B: Backend> From<CanonicalImage<B>> for CanonicalBatch<B> {
    fn from(image: CanonicalImage<B>) -> Self {
        Self {
            shape: image.shape,
            inner: image.inner,
            len: 1,
        }
    }
}

/// Intermediate tensor captured at a named activation point.
///
/// Shape `(1, h, w, c)`, channels last. The tensor is a tracked leaf of the
/// autodiff graph built by the forward pass that produced it, so gradients of
/// that pass's outputs can be taken with respect to it.
#[derive(Debug, Clone)]
pub struct Activation<B: AutodiffBackend> {
    name: String,
    tensor: Tensor<B, 4>,
}

impl<B: AutodiffBackend> Activation<B> {
    /// Wrap a captured activation.
    pub fn new(name: impl Into<String>, tensor: Tensor<B, 4>) -> Self {
        Self {
            name: name.into(),
            tensor,
        }
    }

    /// Name of the activation point.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The captured tensor.
    #[must_use]
    pub const fn tensor(&self) -> &Tensor<B, 4> {
        &self.tensor
    }

    /// Spatial extent `(h, w)`.
    pub fn spatial_dims(&self) -> (usize, usize) {
        let [_, h, w, _] = self.tensor.dims();
        (h, w)
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.tensor.dims()[3]
    }
}
