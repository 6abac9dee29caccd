//! rxvision CLI for model bootstrapping, prediction, and explanation.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use rxv_core::{ClassIndexMap, ImageShape, RankedPrediction};
use rxv_infer::{ExplanationReport, ModelInfo, Predictor, PredictorConfig};
use rxv_models::{save_model_dir, BurnEngine, CheckpointMetadata, MedNetConfig};

/// Backend type for inference and explanations.
type InferBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "rxv")]
#[command(author, version)]
#[command(about = "Medication image classification with Grad-CAM explanations")]
#[command(long_about = "rxv: classify medication images and explain the predictions.

EXAMPLES:
  # Create a placeholder model to bootstrap a serving setup
  rxv init --output models/best --labels aspirin,ibuprofen

  # Top-3 predictions for one image
  rxv predict --model models/best --class-map models/best/class_map.json --top-k 3 pill.jpg

  # One batched forward pass over several images
  rxv predict --model models/best a.jpg b.jpg c.jpg

  # Grad-CAM heatmap for the predicted class
  rxv explain --model models/best pill.jpg --output heatmap.json

  # Model summary
  rxv info --model models/best")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a randomly initialized model directory
    Init {
        /// Output model directory
        #[arg(long, value_name = "DIR")]
        output: PathBuf,

        /// Number of classes (ignored when --labels is given)
        #[arg(long, default_value = "2", value_name = "N")]
        classes: usize,

        /// Comma-separated class labels; also writes class_map.json
        #[arg(long, value_delimiter = ',', value_name = "LABELS")]
        labels: Vec<String>,

        /// Input height and width
        #[arg(long, default_value = "224", value_name = "PIXELS")]
        size: usize,

        /// Filters per convolutional stage
        #[arg(long, value_delimiter = ',', default_value = "16", value_name = "FILTERS")]
        filters: Vec<usize>,

        /// Model version written to metadata.json
        #[arg(long, default_value = "1.0.0", value_name = "VERSION")]
        model_version: String,

        /// Random seed for weight initialization
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,
    },
    /// Classify one or more images
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        /// Number of predictions per image
        #[arg(long, value_name = "K")]
        top_k: Option<usize>,

        /// Report failed images individually instead of aborting the batch
        #[arg(long)]
        partial: bool,

        /// Images to classify
        #[arg(required = true, value_name = "IMAGES")]
        images: Vec<PathBuf>,
    },
    /// Compute a Grad-CAM heatmap for one image
    Explain {
        #[command(flatten)]
        model: ModelArgs,

        /// Image to explain
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Class to explain (defaults to the predicted class)
        #[arg(long, value_name = "CLASS")]
        target: Option<usize>,

        /// Activation point (defaults to the last convolutional stage)
        #[arg(long, value_name = "NAME")]
        layer: Option<String>,

        /// Write the report to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Show model information
    Info {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Model directory written by `rxv init` or a training run
    #[arg(long, value_name = "DIR", required_unless_present = "config")]
    model: Option<PathBuf>,

    /// Class map JSON (`{"0": "label", ...}`)
    #[arg(long, value_name = "FILE")]
    class_map: Option<PathBuf>,

    /// Predictor config JSON; command line flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl ModelArgs {
    fn predictor_config(&self) -> Result<PredictorConfig> {
        let mut config = match (&self.config, &self.model) {
            (Some(path), _) => PredictorConfig::load(path)
                .with_context(|| format!("Failed to read predictor config {}", path.display()))?,
            (None, Some(dir)) => PredictorConfig::new(dir),
            (None, None) => bail!("Either --model or --config is required"),
        };
        if let (Some(_), Some(dir)) = (&self.config, &self.model) {
            config.model_dir = dir.clone();
        }
        if let Some(path) = &self.class_map {
            config.class_map = Some(path.clone());
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Init {
            output,
            classes,
            labels,
            size,
            filters,
            model_version,
            seed,
        } => handle_init(&output, classes, &labels, size, filters, &model_version, seed),
        Commands::Predict {
            model,
            top_k,
            partial,
            images,
        } => handle_predict(&model, top_k, partial, &images),
        Commands::Explain {
            model,
            image,
            target,
            layer,
            output,
        } => handle_explain(&model, &image, target, layer, output.as_deref()),
        Commands::Info { model } => handle_info(&model),
    }
}

fn handle_init(
    output: &Path,
    classes: usize,
    labels: &[String],
    size: usize,
    filters: Vec<usize>,
    model_version: &str,
    seed: u64,
) -> Result<()> {
    let n_classes = if labels.is_empty() { classes } else { labels.len() };
    if n_classes == 0 {
        bail!("A model needs at least one class");
    }

    let config = MedNetConfig::new(ImageShape::new(size, size, 3), n_classes).with_filters(filters);
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid model configuration")?;

    InferBackend::seed(seed);
    let device = NdArrayDevice::Cpu;
    let model = config.init::<InferBackend>(&device);

    let metadata = CheckpointMetadata::new("MedNet")
        .with_version(model_version)
        .with_extra("seed", seed.to_string())
        .with_extra("kind", "placeholder");
    save_model_dir(&model, &config, &metadata, output)
        .with_context(|| format!("Failed to write model to {}", output.display()))?;

    if !labels.is_empty() {
        let class_map = ClassIndexMap::from_labels(labels.iter().cloned());
        let path = output.join("class_map.json");
        let json = serde_json::to_string_pretty(&class_map)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write class map to {}", path.display()))?;
    }

    println!("Saved placeholder model to {}", output.display());
    println!("  Input:   {}", config.input_shape());
    println!("  Classes: {}", n_classes);
    println!("  Filters: {:?}", config.filters);
    println!("  Version: {}", model_version);
    Ok(())
}

fn build_predictor(
    args: &ModelArgs,
    layer: Option<String>,
) -> Result<(Predictor<InferBackend, BurnEngine<InferBackend>>, PredictorConfig)> {
    let mut config = args.predictor_config()?;
    if layer.is_some() {
        config.activation_point = layer;
    }
    let predictor = config
        .build::<InferBackend>(NdArrayDevice::Cpu)
        .with_context(|| format!("Failed to load model from {}", config.model_dir.display()))?;
    Ok((predictor, config))
}

/// One entry of a partial batch.
#[derive(Serialize)]
struct PartialItem {
    image: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    predictions: Option<RankedPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn handle_predict(
    args: &ModelArgs,
    top_k: Option<usize>,
    partial: bool,
    images: &[PathBuf],
) -> Result<()> {
    let (predictor, config) = build_predictor(args, None)?;
    let top_k = top_k.unwrap_or(config.default_top_k);

    if partial {
        let results = predictor
            .predict_batch_partial(images.iter().cloned(), top_k)
            .context("Batch prediction failed")?;
        let items: Vec<PartialItem> = images
            .iter()
            .zip(results)
            .map(|(image, result)| match result {
                Ok(predictions) => PartialItem {
                    image: image.clone(),
                    predictions: Some(predictions),
                    error: None,
                },
                Err(err) => PartialItem {
                    image: image.clone(),
                    predictions: None,
                    error: Some(err.to_string()),
                },
            })
            .collect();
        return print_json(&items);
    }

    match images {
        [image] => {
            let report = predictor
                .predict_report(image.clone(), top_k)
                .with_context(|| format!("Failed to classify {}", image.display()))?;
            print_json(&report)
        }
        _ => {
            let report = predictor
                .predict_batch_report(images.iter().cloned(), top_k)
                .context("Batch prediction failed")?;
            print_json(&report)
        }
    }
}

fn handle_explain(
    args: &ModelArgs,
    image: &Path,
    target: Option<usize>,
    layer: Option<String>,
    output: Option<&Path>,
) -> Result<()> {
    let (predictor, _) = build_predictor(args, layer)?;
    let explanation = predictor
        .explain(image.to_path_buf(), target)
        .with_context(|| format!("Failed to explain {}", image.display()))?;

    if explanation.heatmap.is_zero() {
        tracing::warn!(
            "Heatmap for class {} is all zeros: no positive evidence at '{}'",
            explanation.heatmap.target_class,
            explanation.heatmap.activation_point
        );
    }

    let report = ExplanationReport::from(&explanation);
    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Explained class {} ({}) at '{}': {}x{} heatmap written to {}",
                report.target_class,
                report.class_predicted,
                report.activation_point,
                explanation.heatmap.dims().0,
                explanation.heatmap.dims().1,
                path.display()
            );
            Ok(())
        }
        None => print_json(&report),
    }
}

/// `rxv info` output.
#[derive(Serialize)]
struct InfoOutput<'a> {
    #[serde(flatten)]
    info: ModelInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a CheckpointMetadata>,
}

fn handle_info(args: &ModelArgs) -> Result<()> {
    let (predictor, _) = build_predictor(args, None)?;
    let output = InfoOutput {
        info: predictor.model_info(),
        metadata: predictor.engine().metadata(),
    };
    print_json(&output)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
