//! Activation and gradient capture for a single explanation request.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rxv_core::{
    tensor_to_vec, Activation, CanonicalImage, CoreError, InferenceEngine, ProbabilityVector,
    Result,
};

/// Activation and probabilities captured by one forward pass.
///
/// Owns the autodiff graph of that pass. Taking a gradient consumes the
/// capture, so each capture yields exactly one backward pass and no two
/// requests ever share a graph.
#[derive(Debug)]
pub struct ActivationCapture<B: AutodiffBackend> {
    activation: Activation<B>,
    probs: Tensor<B, 2>,
}

impl<B: AutodiffBackend> ActivationCapture<B> {
    /// Run the engine on `image` and capture the activation at `point`.
    ///
    /// `None` selects the engine's default activation point.
    pub fn capture<E>(engine: &E, image: CanonicalImage<B>, point: Option<&str>) -> Result<Self>
    where
        E: InferenceEngine<B> + ?Sized,
    {
        let (activation, probs) = engine.forward_with_activation(image, point)?;
        Ok(Self { activation, probs })
    }

    /// The captured activation.
    pub fn activation(&self) -> &Activation<B> {
        &self.activation
    }

    /// Name of the activation point.
    pub fn name(&self) -> &str {
        self.activation.name()
    }

    /// Number of classes of the captured output.
    pub fn n_classes(&self) -> usize {
        self.probs.dims()[1]
    }

    /// Probabilities of the captured pass.
    pub fn probabilities(&self) -> Result<ProbabilityVector> {
        let values = tensor_to_vec(self.probs.clone().inner())?;
        Ok(ProbabilityVector::new(values))
    }

    /// Differentiate the probability of `class` w.r.t. the activation.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `class` is out of range.
    pub fn gradient<E>(self, engine: &E, class: usize) -> Result<GradientCapture<B::InnerBackend>>
    where
        E: InferenceEngine<B> + ?Sized,
    {
        let n_classes = self.n_classes();
        if class >= n_classes {
            return Err(CoreError::InvalidArgument(format!(
                "target class {class} out of range for {n_classes} classes"
            )));
        }

        let score = self.probs.slice([0..1, class..class + 1]).sum();
        let gradient = engine.gradient(score, &self.activation)?;
        let activation = self.activation.tensor().clone().inner();

        Ok(GradientCapture {
            name: self.activation.name().to_string(),
            class,
            activation,
            gradient,
        })
    }
}

/// Activation and its gradient for one class, detached from any graph.
#[derive(Debug, Clone)]
pub struct GradientCapture<B: Backend> {
    name: String,
    class: usize,
    activation: Tensor<B, 4>,
    gradient: Tensor<B, 4>,
}

impl<B: Backend> GradientCapture<B> {
    /// Name of the activation point.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class the gradient was taken for.
    pub const fn class(&self) -> usize {
        self.class
    }

    /// Activation values `(1, h, w, c)`.
    pub const fn activation(&self) -> &Tensor<B, 4> {
        &self.activation
    }

    /// Gradient values `(1, h, w, c)`.
    pub const fn gradient(&self) -> &Tensor<B, 4> {
        &self.gradient
    }

    /// Split into `(activation, gradient)`.
    pub fn into_parts(self) -> (Tensor<B, 4>, Tensor<B, 4>) {
        (self.activation, self.gradient)
    }
}
