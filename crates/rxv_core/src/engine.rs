//! Inference engine capability trait.
//!
//! Any image classifier that can run a forward pass, expose a named
//! intermediate activation, and differentiate its output with respect to that
//! activation can serve the prediction and explanation pipeline.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::shape::ImageShape;
use crate::tensor::{Activation, CanonicalBatch, CanonicalImage};

/// A named stage inside an engine where an activation can be captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationPoint {
    /// Stage name, e.g. `"conv2"`.
    pub name: String,
    /// Whether the stage output keeps spatial axes (convolutional stages).
    pub spatial: bool,
}

impl ActivationPoint {
    /// A convolutional stage with spatial output.
    pub fn spatial(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spatial: true,
        }
    }

    /// A stage after pooling or flattening.
    pub fn flat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spatial: false,
        }
    }
}

/// Capability interface over a trained image classifier.
///
/// Implementations must evaluate in inference mode: no dropout, no batch
/// statistics updates, no weight mutation. A loaded engine is shared
/// read-only between requests, possibly on several threads.
pub trait InferenceEngine<B: AutodiffBackend>: Send + Sync {
    /// Input contract `(H, W, C)` expected by [`forward`](Self::forward).
    fn input_shape(&self) -> ImageShape;

    /// Number of output classes.
    fn n_classes(&self) -> usize;

    /// Device the engine evaluates on.
    fn device(&self) -> B::Device;

    /// Activation points in forward order, input side first.
    fn activation_points(&self) -> Vec<ActivationPoint>;

    /// Batched forward pass returning probabilities of shape `(N, n_classes)`.
    ///
    /// Runs on the inner (non-differentiable) backend.
    fn forward(&self, batch: CanonicalBatch<B::InnerBackend>) -> Result<Tensor<B::InnerBackend, 2>>;

    /// Forward pass for one image that also captures the activation at `point`.
    ///
    /// Returns the activation (shape `(1, h, w, c)`) and the probabilities
    /// `(1, n_classes)` of the same pass. `None` selects
    /// [`default_activation_point`](Self::default_activation_point).
    fn forward_with_activation(
        &self,
        image: CanonicalImage<B>,
        point: Option<&str>,
    ) -> Result<(Activation<B>, Tensor<B, 2>)>;

    /// Gradient of a scalar output with respect to a captured activation.
    ///
    /// `output` must derive from the forward pass that produced `activation`.
    /// Each call owns its gradient container, so concurrent explanations never
    /// observe each other's gradients. An activation the output does not
    /// depend on has an all-zero gradient.
    fn gradient(
        &self,
        output: Tensor<B, 1>,
        activation: &Activation<B>,
    ) -> Result<Tensor<B::InnerBackend, 4>> {
        let grads = output.backward();
        Ok(activation
            .tensor()
            .grad(&grads)
            .unwrap_or_else(|| activation.tensor().clone().inner().zeros_like()))
    }

    /// The last spatial stage before pooling.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayerNotFound`] if the engine has no spatial stage.
    fn default_activation_point(&self) -> Result<String> {
        self.activation_points()
            .into_iter()
            .rev()
            .find(|p| p.spatial)
            .map(|p| p.name)
            .ok_or_else(|| CoreError::LayerNotFound("no spatial activation point".to_string()))
    }

    /// Resolve an optional point name against [`activation_points`](Self::activation_points).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LayerNotFound`] for unknown names and for stages
    /// without spatial axes.
    fn resolve_activation_point(&self, point: Option<&str>) -> Result<String> {
        let Some(name) = point else {
            return self.default_activation_point();
        };
        match self.activation_points().into_iter().find(|p| p.name == name) {
            Some(p) if p.spatial => Ok(p.name),
            Some(_) => Err(CoreError::LayerNotFound(format!(
                "activation point '{name}' has no spatial axes"
            ))),
            None => Err(CoreError::LayerNotFound(name.to_string())),
        }
    }
}
