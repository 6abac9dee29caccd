//! Integration tests for the prediction and explanation pipeline.
//!
//! These tests save a freshly initialized model to disk, load it back the way
//! a serving process would, and exercise it with synthetic images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use rxvision::prelude::*;

type InferBackend = Autodiff<NdArray>;

const LABELS: [&str; 3] = ["amoxicillin", "ibuprofen", "metformin"];

/// Create a synthetic pill photo: a bright disc on a noisy background.
fn create_pill_image(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 3.0;
    let tint: [u8; 3] = [rng.gen(), rng.gen(), rng.gen()];

    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        if d < radius {
            Rgb(tint)
        } else {
            let n: u8 = rng.gen_range(0..40);
            Rgb([n, n, n])
        }
    }))
}

/// Save a model directory and class map, returning the predictor config.
fn create_model_dir(dir: &Path) -> PredictorConfig {
    let device = Default::default();
    let config = MedNetConfig::new(ImageShape::new(32, 32, 3), LABELS.len()).with_filters(vec![4, 8]);
    let model = config.init::<InferBackend>(&device);
    let metadata = CheckpointMetadata::new("MedNet").with_version("1.0.0");

    let model_dir = dir.join("model");
    save_model_dir(&model, &config, &metadata, &model_dir).expect("Failed to save model");

    let class_map = dir.join("class_map.json");
    let json = serde_json::to_string(&ClassIndexMap::from_labels(LABELS)).unwrap();
    std::fs::write(&class_map, json).expect("Failed to write class map");

    PredictorConfig::new(model_dir).with_class_map(class_map)
}

fn write_png(image: &DynamicImage, path: &Path) -> PathBuf {
    image
        .save_with_format(path, ImageFormat::Png)
        .expect("Failed to write image");
    path.to_path_buf()
}

#[test]
fn test_batch_matches_single() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .build::<InferBackend>(Default::default())
        .expect("Failed to build predictor");

    let images: Vec<DynamicImage> = (0..3).map(|i| create_pill_image(48, 40, i)).collect();
    let batch = predictor.predict_batch(images.clone(), 3).unwrap();
    assert_eq!(batch.len(), images.len());

    for (image, batched) in images.into_iter().zip(batch.iter()) {
        let single = predictor.predict_single(image, 3).unwrap();
        assert_eq!(single.len(), batched.len());
        for (a, b) in single.iter().zip(batched.iter()) {
            assert_eq!(a.label, b.label);
            assert_eq!(a.class_index, b.class_index);
            assert!((a.probability - b.probability).abs() < 1e-6);
        }
    }
}

#[test]
fn test_predictions_are_labeled_and_ranked() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .build::<InferBackend>(Default::default())
        .unwrap();

    let ranked = predictor.predict_single(create_pill_image(32, 32, 7), 5).unwrap();
    assert_eq!(ranked.len(), LABELS.len());

    let total: f32 = ranked.iter().map(|p| p.probability).sum();
    assert!((total - 1.0).abs() < 1e-5);

    let scores: Vec<f32> = ranked.iter().map(|p| p.probability).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    for prediction in &ranked {
        assert_eq!(prediction.label, LABELS[prediction.class_index]);
    }
}

#[test]
fn test_sources_agree_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .build::<InferBackend>(Default::default())
        .unwrap();

    let image = create_pill_image(40, 40, 3);
    let path = write_png(&image, &dir.path().join("pill.png"));
    let bytes = std::fs::read(&path).unwrap();

    let from_image = predictor.predict_single(image, 3).unwrap();
    let from_path = predictor.predict_single(path, 3).unwrap();
    let from_bytes = predictor.predict_single(bytes, 3).unwrap();

    assert_eq!(from_image, from_path);
    assert_eq!(from_image, from_bytes);
}

#[test]
fn test_explain_consistent_with_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .build::<InferBackend>(Default::default())
        .unwrap();

    for seed in 0..3 {
        let image = create_pill_image(36, 36, seed);
        let explanation = predictor.explain(image.clone(), None).unwrap();
        let top = predictor.predict_single(image, 1).unwrap();
        let top = top.top().unwrap();

        assert_eq!(explanation.heatmap.target_class, top.class_index);
        assert_eq!(explanation.prediction.label, top.label);
        assert_eq!(explanation.heatmap.activation_point, "conv2");
        assert_eq!(explanation.heatmap.dims(), (28, 28));

        let heatmap = &explanation.heatmap;
        assert!(heatmap.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(heatmap.is_zero() || (heatmap.max() - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_explain_every_class() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .with_activation_point("conv1")
        .build::<InferBackend>(Default::default())
        .unwrap();

    let image = create_pill_image(32, 32, 11);
    for class in 0..LABELS.len() {
        let explanation = predictor.explain(image.clone(), Some(class)).unwrap();
        assert_eq!(explanation.heatmap.target_class, class);
        assert_eq!(explanation.heatmap.dims(), (30, 30));
    }
    assert!(matches!(
        predictor.explain(image, Some(LABELS.len())),
        Err(CoreError::InvalidArgument(_))
    ));
}

#[test]
fn test_partial_batch_reports_failures_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = create_model_dir(dir.path())
        .build::<InferBackend>(Default::default())
        .unwrap();

    let good = write_png(&create_pill_image(32, 32, 1), &dir.path().join("good.png"));
    let missing = dir.path().join("missing.png");
    let sources = vec![good.clone(), missing, good];

    assert!(predictor.predict_batch(sources.clone(), 1).is_err());

    let results = predictor.predict_batch_partial(sources, 1).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(CoreError::ImageDecode(_))));
    assert_eq!(results[0].as_ref().unwrap(), results[2].as_ref().unwrap());
}

#[test]
fn test_engine_reload_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_model_dir(dir.path());

    let first = config.build::<InferBackend>(Default::default()).unwrap();
    let second = config.build::<InferBackend>(Default::default()).unwrap();

    let image = create_pill_image(32, 32, 21);
    let a = first.probabilities(image.clone()).unwrap();
    let b = second.probabilities(image).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.model_version(), Some("1.0.0"));
}

#[test]
fn test_shared_engine_across_predictors() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_model_dir(dir.path());
    let engine = Arc::new(BurnEngine::<InferBackend>::load(&config.model_dir, Default::default()).unwrap());

    let plain = Predictor::new(Arc::clone(&engine)).unwrap();
    let labeled = Predictor::new(engine)
        .unwrap()
        .with_class_map(Arc::new(ClassIndexMap::from_labels(LABELS)));

    let image = create_pill_image(32, 32, 5);
    let a = plain.predict_single(image.clone(), 1).unwrap();
    let b = labeled.predict_single(image, 1).unwrap();

    let (a, b) = (a.top().unwrap(), b.top().unwrap());
    assert_eq!(a.class_index, b.class_index);
    assert_eq!(a.label, a.class_index.to_string());
    assert_eq!(b.label, LABELS[b.class_index]);
}
