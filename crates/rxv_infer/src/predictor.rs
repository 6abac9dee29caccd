//! Request-scoped prediction and explanation over a shared engine.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rxv_core::{
    tensor_to_vec, ActivationPoint, CanonicalBatch, CanonicalImage, ClassIndexMap, CoreError,
    ImageShape, InferenceEngine, Prediction, ProbabilityVector, RankedPrediction, Result,
};
use rxv_explain::{Explainer, Heatmap};
use rxv_transforms::{ImageNormalizer, ImageSource, NormalizeConfig};
use serde::{Deserialize, Serialize};

use crate::format::format_top_k;

/// Heatmap plus the top-1 prediction of the same forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Grad-CAM heatmap over the activation's spatial extent.
    pub heatmap: Heatmap,
    /// Most probable class of the explained pass.
    pub prediction: Prediction,
}

/// Ranked predictions for one image with timing and model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    /// Ranked predictions.
    pub predictions: RankedPrediction,
    /// Wall time of preprocessing and inference in seconds.
    pub inference_time: f64,
    /// Version of the serving model, if known.
    pub model_version: Option<String>,
}

/// Ranked predictions for a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionReport {
    /// One ranked list per input image.
    pub results: Vec<RankedPrediction>,
    /// Wall time of the whole batch in seconds.
    pub inference_time: f64,
    /// Version of the serving model, if known.
    pub model_version: Option<String>,
}

/// Explanation flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationReport {
    /// Heatmap rows.
    pub heatmap: Vec<Vec<f32>>,
    /// Class the heatmap explains.
    pub target_class: usize,
    /// Activation point the heatmap was computed on.
    pub activation_point: String,
    /// Label of the predicted class.
    pub class_predicted: String,
    /// Probability of the predicted class.
    pub confidence: f32,
}

impl From<&Explanation> for ExplanationReport {
    fn from(explanation: &Explanation) -> Self {
        Self {
            heatmap: explanation.heatmap.rows(),
            target_class: explanation.heatmap.target_class,
            activation_point: explanation.heatmap.activation_point.clone(),
            class_predicted: explanation.prediction.label.clone(),
            confidence: explanation.prediction.probability,
        }
    }
}

/// Static description of the serving model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model version, if known.
    pub version: Option<String>,
    /// Framework evaluating the model.
    pub framework: String,
    /// Input contract `(H, W, C)`.
    pub input_shape: ImageShape,
    /// Number of output classes.
    pub num_classes: usize,
    /// Labels in class index order, when a class map is loaded.
    pub class_labels: Option<Vec<String>>,
    /// Activation points available for explanations.
    pub activation_points: Vec<ActivationPoint>,
    /// Preprocessing applied before the forward pass.
    pub normalize: NormalizeConfig,
}

/// Prediction and explanation context.
///
/// Holds the loaded engine and optional class map behind `Arc`s; both are
/// immutable after construction. Engines are `Send + Sync`, so clones of a
/// predictor can move into worker threads and serve requests concurrently.
/// Every call normalizes its own input and runs its own forward pass.
///
/// # Example
///
/// ```rust,ignore
/// use rxv_infer::Predictor;
///
/// let engine = Arc::new(BurnEngine::<Autodiff<NdArray>>::load("models/best", device)?);
/// let predictor = Predictor::new(engine)?.with_class_map(Arc::new(class_map));
///
/// let ranked = predictor.predict_single(PathBuf::from("pill.jpg"), 3)?;
/// let explanation = predictor.explain(PathBuf::from("pill.jpg"), None)?;
/// ```
#[derive(Debug)]
pub struct Predictor<B, E>
where
    B: AutodiffBackend,
    E: InferenceEngine<B>,
{
    engine: Arc<E>,
    class_map: Option<Arc<ClassIndexMap>>,
    normalizer: ImageNormalizer,
    explainer: Explainer,
    model_version: Option<String>,
    _backend: PhantomData<fn() -> B>,
}

impl<B, E> Clone for Predictor<B, E>
where
    B: AutodiffBackend,
    E: InferenceEngine<B>,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            class_map: self.class_map.clone(),
            normalizer: self.normalizer.clone(),
            explainer: self.explainer.clone(),
            model_version: self.model_version.clone(),
            _backend: PhantomData,
        }
    }
}

impl<B, E> Predictor<B, E>
where
    B: AutodiffBackend,
    E: InferenceEngine<B>,
{
    /// Create a predictor with ImageNet normalization for the engine's input.
    pub fn new(engine: Arc<E>) -> Result<Self> {
        let normalizer = ImageNormalizer::for_shape(engine.input_shape())?;
        Ok(Self {
            engine,
            class_map: None,
            normalizer,
            explainer: Explainer::new(),
            model_version: None,
            _backend: PhantomData,
        })
    }

    /// Label predictions through a class map.
    #[must_use]
    pub fn with_class_map(mut self, class_map: Arc<ClassIndexMap>) -> Self {
        let n_classes = self.engine.n_classes();
        if class_map.len() != n_classes {
            tracing::warn!(
                "Class map has {} labels but the engine has {} classes",
                class_map.len(),
                n_classes
            );
        }
        self.class_map = Some(class_map);
        self
    }

    /// Replace the normalization statistics.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Shape`] if the config's output shape differs from
    /// the engine input.
    pub fn with_normalize_config(mut self, config: NormalizeConfig) -> Result<Self> {
        let expected = self.engine.input_shape();
        if config.shape() != expected {
            return Err(CoreError::shape(expected, config.shape()));
        }
        self.normalizer = ImageNormalizer::new(config)?;
        Ok(self)
    }

    /// Set the explainer (activation point selection).
    #[must_use]
    pub fn with_explainer(mut self, explainer: Explainer) -> Self {
        self.explainer = explainer;
        self
    }

    /// Set the model version reported alongside predictions.
    #[must_use]
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = Some(version.into());
        self
    }

    /// The shared engine.
    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// The class map, if any.
    pub fn class_map(&self) -> Option<&ClassIndexMap> {
        self.class_map.as_deref()
    }

    /// The normalizer.
    pub const fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    /// The model version, if known.
    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    /// Normalize and run one image, returning its probabilities.
    pub fn probabilities(&self, source: impl Into<ImageSource>) -> Result<ProbabilityVector> {
        let image = self.normalize(source)?;
        let probs = self.engine.forward(image.into())?;
        let mut rows = split_rows(probs)?;
        rows.pop()
            .ok_or_else(|| CoreError::shape("one probability row", "none"))
    }

    /// Classify one image.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] if `top_k == 0`
    /// - [`CoreError::ImageDecode`] / [`CoreError::Shape`] from normalization
    /// - [`CoreError::UnknownClass`] if a selected class has no label
    pub fn predict_single(
        &self,
        source: impl Into<ImageSource>,
        top_k: usize,
    ) -> Result<RankedPrediction> {
        check_top_k(top_k)?;
        let probs = self.probabilities(source)?;
        format_top_k(&probs, top_k, self.class_map())
    }

    /// Classify a batch with one forward pass.
    ///
    /// Images are normalized in order; any failure aborts the whole batch.
    /// An empty input returns an empty output without running the engine.
    pub fn predict_batch<I, S>(&self, sources: I, top_k: usize) -> Result<Vec<RankedPrediction>>
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        check_top_k(top_k)?;
        let images = sources
            .into_iter()
            .map(|source| self.normalize(source))
            .collect::<Result<Vec<_>>>()?;
        if images.is_empty() {
            return Ok(Vec::new());
        }

        self.forward_batch(images)?
            .iter()
            .map(|probs| format_top_k(probs, top_k, self.class_map()))
            .collect()
    }

    /// Classify a batch, isolating per-image failures.
    ///
    /// Returns one result per input, in input order. Images that fail to
    /// normalize or label report their error at their position; the rest
    /// still share one forward pass. The outer error covers failures that
    /// affect every image (`top_k == 0`, engine errors).
    pub fn predict_batch_partial<I, S>(
        &self,
        sources: I,
        top_k: usize,
    ) -> Result<Vec<Result<RankedPrediction>>>
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        check_top_k(top_k)?;
        let normalized: Vec<Result<CanonicalImage<B::InnerBackend>>> = sources
            .into_iter()
            .map(|source| self.normalize(source))
            .collect();

        let mut images = Vec::new();
        let mut results: Vec<Option<Result<RankedPrediction>>> = Vec::with_capacity(normalized.len());
        for (i, item) in normalized.into_iter().enumerate() {
            match item {
                Ok(image) => {
                    images.push(image);
                    results.push(None);
                }
                Err(err) => {
                    tracing::warn!("Skipping batch item {}: {}", i, err);
                    results.push(Some(Err(err)));
                }
            }
        }

        let rows = if images.is_empty() {
            Vec::new()
        } else {
            self.forward_batch(images)?
        };
        let mut rows = rows.into_iter();

        results
            .into_iter()
            .map(|slot| match slot {
                Some(err) => Ok(err),
                None => {
                    let probs = rows
                        .next()
                        .ok_or_else(|| CoreError::shape("one row per image", "fewer rows"))?;
                    Ok(format_top_k(&probs, top_k, self.class_map()))
                }
            })
            .collect()
    }

    /// Explain the prediction for one image.
    ///
    /// Uses `target_class` when given, otherwise the predicted class. The
    /// returned prediction is the top-1 entry of the same forward pass that
    /// produced the heatmap.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidArgument`] if `target_class >= n_classes`
    /// - [`CoreError::LayerNotFound`] if the configured activation point is unknown
    /// - [`CoreError::ImageDecode`] / [`CoreError::Shape`] from normalization
    pub fn explain(
        &self,
        source: impl Into<ImageSource>,
        target_class: Option<usize>,
    ) -> Result<Explanation> {
        let image = self
            .normalizer
            .normalize::<B>(source, &self.engine.device())?;
        let (heatmap, probs) = self.explainer.explain(&*self.engine, image, target_class)?;
        let prediction = format_top_k(&probs, 1, self.class_map())?
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::InvalidArgument("engine produced no classes".to_string()))?;
        Ok(Explanation {
            heatmap,
            prediction,
        })
    }

    /// Classify one image and record timing.
    pub fn predict_report(
        &self,
        source: impl Into<ImageSource>,
        top_k: usize,
    ) -> Result<PredictionReport> {
        let start = Instant::now();
        let predictions = self.predict_single(source, top_k)?;
        let inference_time = start.elapsed().as_secs_f64();
        tracing::debug!("Single prediction took {:.4}s", inference_time);
        Ok(PredictionReport {
            predictions,
            inference_time,
            model_version: self.model_version.clone(),
        })
    }

    /// Classify a batch and record timing.
    pub fn predict_batch_report<I, S>(&self, sources: I, top_k: usize) -> Result<BatchPredictionReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<ImageSource>,
    {
        let start = Instant::now();
        let results = self.predict_batch(sources, top_k)?;
        let inference_time = start.elapsed().as_secs_f64();
        tracing::debug!(
            "Batch of {} predictions took {:.4}s",
            results.len(),
            inference_time
        );
        Ok(BatchPredictionReport {
            results,
            inference_time,
            model_version: self.model_version.clone(),
        })
    }

    /// Describe the serving model.
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            version: self.model_version.clone(),
            framework: "burn".to_string(),
            input_shape: self.engine.input_shape(),
            num_classes: self.engine.n_classes(),
            class_labels: self.class_map().map(|map| {
                map.labels()
                    .into_iter()
                    .map(|(_, label)| label.to_string())
                    .collect()
            }),
            activation_points: self.engine.activation_points(),
            normalize: self.normalizer().config().clone(),
        }
    }

    fn normalize(&self, source: impl Into<ImageSource>) -> Result<CanonicalImage<B::InnerBackend>> {
        self.normalizer
            .normalize::<B::InnerBackend>(source, &self.engine.device())
    }

    fn forward_batch(
        &self,
        images: Vec<CanonicalImage<B::InnerBackend>>,
    ) -> Result<Vec<ProbabilityVector>> {
        let batch = CanonicalBatch::stack(images)?;
        let expected = batch.len();
        let rows = split_rows(self.engine.forward(batch)?)?;
        if rows.len() != expected {
            return Err(CoreError::shape(
                format!("{expected} probability rows"),
                rows.len(),
            ));
        }
        Ok(rows)
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(CoreError::InvalidArgument("top_k must be at least 1".to_string()));
    }
    Ok(())
}

fn split_rows<B: Backend>(probs: Tensor<B, 2>) -> Result<Vec<ProbabilityVector>> {
    let [n, n_classes] = probs.dims();
    if n_classes == 0 {
        return Ok(vec![ProbabilityVector::new(Vec::new()); n]);
    }
    let values = tensor_to_vec(probs)?;
    Ok(values
        .chunks(n_classes)
        .map(|row| ProbabilityVector::new(row.to_vec()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;
    use rxv_models::{BurnEngine, MedNetConfig};

    type TestBackend = Autodiff<NdArray>;
    type TestPredictor = Predictor<TestBackend, BurnEngine<TestBackend>>;

    fn predictor(n_classes: usize) -> TestPredictor {
        let device = Default::default();
        let config = MedNetConfig::new(ImageShape::new(16, 16, 3), n_classes).with_filters(vec![4, 6]);
        let model = config.init::<TestBackend>(&device);
        let engine = BurnEngine::new(model, config, device).unwrap();
        Predictor::new(Arc::new(engine)).unwrap()
    }

    fn random_image(seed: u64) -> DynamicImage {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        DynamicImage::ImageRgb8(RgbImage::from_fn(20, 18, |_, _| {
            Rgb([rng.gen(), rng.gen(), rng.gen()])
        }))
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_predict_single() {
        let predictor = predictor(4);
        let ranked = predictor.predict_single(random_image(1), 3).unwrap();
        assert_eq!(ranked.len(), 3);

        let scores: Vec<f32> = ranked.iter().map(|p| p.probability).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_predict_single_top_k_exceeds_classes() {
        let predictor = predictor(2);
        let ranked = predictor.predict_single(random_image(2), 5).unwrap();
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_predict_single_top_k_zero() {
        let predictor = predictor(2);
        assert!(matches!(
            predictor.predict_single(random_image(3), 0),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_predict_batch_matches_single() {
        let predictor = predictor(3);
        let images: Vec<_> = (10..13).map(random_image).collect();

        let batch = predictor.predict_batch(images.clone(), 3).unwrap();
        assert_eq!(batch.len(), 3);

        for (image, ranked) in images.into_iter().zip(batch.iter()) {
            let single = predictor.predict_single(image, 3).unwrap();
            for (a, b) in single.iter().zip(ranked.iter()) {
                assert_eq!(a.label, b.label);
                assert!((a.probability - b.probability).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_predict_batch_empty() {
        let predictor = predictor(2);
        let empty: Vec<DynamicImage> = Vec::new();
        assert!(predictor.predict_batch(empty, 1).unwrap().is_empty());
    }

    #[test]
    fn test_predict_batch_aborts_on_bad_item() {
        let predictor = predictor(2);
        let sources: Vec<ImageSource> = vec![
            random_image(4).into(),
            b"definitely not an image".to_vec().into(),
        ];
        assert!(matches!(
            predictor.predict_batch(sources, 1),
            Err(CoreError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_predict_batch_partial() {
        let predictor = predictor(2);
        let good = random_image(5);
        let sources: Vec<ImageSource> = vec![
            good.clone().into(),
            b"garbage".to_vec().into(),
            png_bytes(&good).into(),
        ];

        let results = predictor.predict_batch_partial(sources, 2).unwrap();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[1], Err(CoreError::ImageDecode(_))));

        let first = results[0].as_ref().unwrap();
        let third = results[2].as_ref().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn test_zero_size_image_rejected() {
        let predictor = predictor(2);
        for (width, height) in [(0, 0), (0, 5)] {
            assert!(matches!(
                predictor.predict_single(DynamicImage::new_rgb8(width, height), 1),
                Err(CoreError::Shape { .. })
            ));
        }
        assert!(matches!(
            predictor.explain(DynamicImage::new_rgb8(5, 0), None),
            Err(CoreError::Shape { .. })
        ));
    }

    #[test]
    fn test_predict_batch_partial_all_failed() {
        let predictor = predictor(2);
        let sources = vec![b"bad".to_vec(), b"worse".to_vec()];
        let results = predictor.predict_batch_partial(sources, 1).unwrap();
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[test]
    fn test_class_map_labels() {
        let map = ClassIndexMap::from_labels(["aspirin", "ibuprofen"]);
        let predictor = predictor(2).with_class_map(Arc::new(map));
        let ranked = predictor.predict_single(random_image(6), 2).unwrap();

        let mut labels: Vec<_> = ranked.iter().map(|p| p.label.as_str()).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec!["aspirin", "ibuprofen"]);
    }

    #[test]
    fn test_class_map_missing_entry() {
        let map = ClassIndexMap::from_labels(["aspirin"]);
        let predictor = predictor(3).with_class_map(Arc::new(map));
        assert!(matches!(
            predictor.predict_single(random_image(7), 3),
            Err(CoreError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_explain_matches_prediction() {
        let predictor = predictor(3);
        let image = random_image(8);

        let explanation = predictor.explain(image.clone(), None).unwrap();
        let ranked = predictor.predict_single(image, 1).unwrap();
        let top = ranked.top().unwrap();

        assert_eq!(explanation.prediction.class_index, top.class_index);
        assert_eq!(explanation.heatmap.target_class, top.class_index);
        assert!((explanation.prediction.probability - top.probability).abs() < 1e-6);
        assert!(explanation
            .heatmap
            .values()
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_explain_explicit_target() {
        let predictor = predictor(3).with_explainer(Explainer::new().with_activation_point("conv1"));
        let explanation = predictor.explain(random_image(9), Some(0)).unwrap();
        assert_eq!(explanation.heatmap.target_class, 0);
        assert_eq!(explanation.heatmap.dims(), (14, 14));

        let report = ExplanationReport::from(&explanation);
        assert_eq!(report.heatmap.len(), 14);
        assert_eq!(report.confidence, explanation.prediction.probability);
    }

    #[test]
    fn test_explain_target_out_of_range() {
        let predictor = predictor(3);
        assert!(matches!(
            predictor.explain(random_image(9), Some(7)),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reports() {
        let predictor = predictor(2).with_model_version("1.0.0");
        let report = predictor.predict_report(random_image(11), 1).unwrap();
        assert_eq!(report.predictions.len(), 1);
        assert_eq!(report.model_version.as_deref(), Some("1.0.0"));
        assert!(report.inference_time >= 0.0);

        let batch = predictor
            .predict_batch_report(vec![random_image(12), random_image(13)], 1)
            .unwrap();
        assert_eq!(batch.results.len(), 2);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["predictions"][0]["class"].is_string());
    }

    #[test]
    fn test_model_info() {
        let map = ClassIndexMap::from_labels(["aspirin", "ibuprofen"]);
        let predictor = predictor(2).with_class_map(Arc::new(map));
        let info = predictor.model_info();

        assert_eq!(info.input_shape, ImageShape::new(16, 16, 3));
        assert_eq!(info.num_classes, 2);
        assert_eq!(
            info.class_labels,
            Some(vec!["aspirin".to_string(), "ibuprofen".to_string()])
        );
        assert_eq!(info.activation_points.len(), 3);
        assert_eq!(info.normalize, NormalizeConfig::imagenet(ImageShape::new(16, 16, 3)));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_predictor_is_send_sync() {
        assert_send_sync::<TestPredictor>();
    }

    #[test]
    fn test_concurrent_explanations() {
        let predictor = predictor(3);
        let image = random_image(14);
        let expected = predictor.explain(image.clone(), None).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let predictor = predictor.clone();
                let image = image.clone();
                std::thread::spawn(move || predictor.explain(image, None).unwrap())
            })
            .collect();
        for handle in handles {
            let explanation = handle.join().unwrap();
            assert_eq!(explanation.prediction, expected.prediction);
            assert_eq!(explanation.heatmap, expected.heatmap);
        }
    }

    #[test]
    fn test_normalize_config_must_match_engine() {
        let predictor = predictor(2);
        let wrong = NormalizeConfig::imagenet(ImageShape::new(32, 32, 3));
        assert!(matches!(
            predictor.with_normalize_config(wrong),
            Err(CoreError::Shape { .. })
        ));
    }
}
