//! Benchmarks for preprocessing and inference.
//!
//! Run with: cargo bench --bench inference_bench

use std::sync::Arc;

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use rxvision::prelude::*;

type InferBackend = Autodiff<NdArray>;

/// Create a random RGB image for benchmarking.
fn create_image(width: u32, height: u32, seed: u64) -> DynamicImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.gen(), rng.gen(), rng.gen()])
    }))
}

fn create_predictor() -> Predictor<InferBackend, BurnEngine<InferBackend>> {
    let device = Default::default();
    let config = MedNetConfig::default();
    let model = config.init::<InferBackend>(&device);
    let engine = BurnEngine::new(model, config, device).expect("Failed to build engine");
    Predictor::new(Arc::new(engine)).expect("Failed to build predictor")
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");
    let normalizer = ImageNormalizer::new(NormalizeConfig::default()).unwrap();

    for size in [224u32, 512, 1024].iter() {
        let image = create_image(*size, *size, 42);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let values = normalizer.normalize_values(black_box(image.clone())).unwrap();
                black_box(values)
            })
        });
    }

    group.finish();
}

fn bench_predict_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict_batch");
    group.sample_size(10);
    let predictor = create_predictor();

    for batch_size in [1usize, 4, 16].iter() {
        let images: Vec<DynamicImage> = (0..*batch_size as u64)
            .map(|i| create_image(224, 224, i))
            .collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, _| {
                b.iter(|| {
                    let results = predictor.predict_batch(black_box(images.clone()), 3).unwrap();
                    black_box(results)
                })
            },
        );
    }

    group.finish();
}

fn bench_explain(c: &mut Criterion) {
    let mut group = c.benchmark_group("explain");
    group.sample_size(10);
    let predictor = create_predictor();
    let image = create_image(224, 224, 7);

    group.bench_function("grad_cam_default_layer", |b| {
        b.iter(|| {
            let explanation = predictor.explain(black_box(image.clone()), None).unwrap();
            black_box(explanation)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_predict_batch, bench_explain);
criterion_main!(benches);
