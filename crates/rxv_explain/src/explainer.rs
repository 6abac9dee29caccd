//! Grad-CAM explainer over any [`InferenceEngine`].

use burn::tensor::backend::AutodiffBackend;
use rxv_core::{CanonicalImage, CoreError, InferenceEngine, ProbabilityVector, Result};
use serde::{Deserialize, Serialize};

use crate::activation::ActivationCapture;
use crate::attribution::{grad_cam, Heatmap};

/// Computes gradient-weighted class activation maps.
///
/// Stateless apart from the chosen activation point; one explainer can serve
/// any number of concurrent requests.
///
/// # Example
///
/// ```rust,ignore
/// use rxv_explain::Explainer;
///
/// let explainer = Explainer::new().with_activation_point("conv1");
/// let (heatmap, probs) = explainer.explain(&engine, image, None)?;
/// assert_eq!(heatmap.target_class, probs.argmax().unwrap());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explainer {
    /// Activation point to explain, `None` for the engine default.
    pub activation_point: Option<String>,
}

impl Explainer {
    /// Explainer using the engine's default activation point.
    pub fn new() -> Self {
        Self::default()
    }

    /// Explain at a named activation point.
    #[must_use]
    pub fn with_activation_point(mut self, name: impl Into<String>) -> Self {
        self.activation_point = Some(name.into());
        self
    }

    /// Compute the heatmap for `target_class`, or for the predicted class.
    ///
    /// Returns the heatmap together with the probabilities of the same
    /// forward pass.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] if `target_class >= n_classes`
    /// - [`CoreError::LayerNotFound`] if the activation point is unknown
    /// - [`CoreError::Shape`] if the image does not match the engine input
    pub fn explain<B, E>(
        &self,
        engine: &E,
        image: CanonicalImage<B>,
        target_class: Option<usize>,
    ) -> Result<(Heatmap, ProbabilityVector)>
    where
        B: AutodiffBackend,
        E: InferenceEngine<B> + ?Sized,
    {
        let n_classes = engine.n_classes();
        if let Some(target) = target_class {
            if target >= n_classes {
                return Err(CoreError::InvalidArgument(format!(
                    "target class {target} out of range for {n_classes} classes"
                )));
            }
        }

        let capture = ActivationCapture::capture(engine, image, self.activation_point.as_deref())?;
        let probs = capture.probabilities()?;
        let target = match target_class {
            Some(target) => target,
            None => probs
                .argmax()
                .ok_or_else(|| CoreError::InvalidArgument("engine produced no classes".to_string()))?,
        };

        tracing::debug!(
            "Explaining class {} at activation point '{}'",
            target,
            capture.name()
        );

        let gradients = capture.gradient(engine, target)?;
        let name = gradients.name().to_string();
        let (activation, gradient) = gradients.into_parts();
        let heatmap = grad_cam(activation, gradient, target, &name)?;

        if heatmap.is_zero() {
            tracing::debug!("No positive evidence for class {} at '{}'", target, name);
        }
        Ok((heatmap, probs))
    }
}
