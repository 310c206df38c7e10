//! Landsage CLI - train graph encoders and extract retrieval embeddings.
//!
//! # Usage
//!
//! ```bash
//! # Print the default configuration
//! landsage config > run.json
//!
//! # Train on a labeled graph
//! landsage train --data data/train --config run.json --output runs/model.safetensors
//!
//! # Embed an inference graph with the trained encoders
//! landsage embed --data data/index --checkpoint runs/model.safetensors \
//!     --output index.npy --keys encoder_1.weight,encoder_2.weight
//!
//! # Summarize a dataset directory
//! landsage stats --data data/train
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `landsage=info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use landsage::checkpoint::{read_meta, save_checkpoint, CheckpointMeta};
use landsage::dataset::GraphData;
use landsage::embed::{extract_embeddings, mean_aggregate_features};
use landsage::train::{EpochMetrics, Trainer};
use landsage::{ExperimentConfig, ParameterStore, SupervisedGraphSage};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "landsage")]
#[command(about = "Supervised GraphSAGE for landmark retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default configuration as JSON
    Config,

    /// Train a model on a labeled dataset directory
    Train {
        /// Dataset directory (features.npy, adjacency.csv, labels.csv)
        #[arg(long)]
        data: PathBuf,

        /// JSON config (defaults are used for missing fields)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Checkpoint file (.safetensors); metadata goes next to it as .json
        #[arg(short, long)]
        output: PathBuf,

        /// Write the training report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Extract L2-normalized embeddings for every node
    Embed {
        /// Dataset directory (features.npy, adjacency.csv)
        #[arg(long)]
        data: PathBuf,

        /// Checkpoint written by `train`
        #[arg(long)]
        checkpoint: PathBuf,

        /// Output .npy file
        #[arg(short, long)]
        output: PathBuf,

        /// Load only these parameter keys (comma separated)
        #[arg(long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Also write the parameter-free mean-aggregation baseline
        #[arg(long)]
        mean_baseline: Option<PathBuf>,

        /// Nodes per forward pass
        #[arg(long, default_value = "128")]
        batch_size: usize,
    },

    /// Show statistics about a dataset directory
    Stats {
        /// Dataset directory
        #[arg(long)]
        data: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("landsage=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config => cmd_config(),
        Commands::Train {
            data,
            config,
            output,
            report,
        } => cmd_train(&data, config.as_deref(), &output, report.as_deref()),
        Commands::Embed {
            data,
            checkpoint,
            output,
            keys,
            mean_baseline,
            batch_size,
        } => cmd_embed(
            &data,
            &checkpoint,
            &output,
            keys,
            mean_baseline.as_deref(),
            batch_size,
        ),
        Commands::Stats { data } => cmd_stats(&data),
    }
}

fn load_data(dir: &Path, config: &ExperimentConfig) -> Result<GraphData> {
    let start = Instant::now();
    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Loading {}...", dir.display()));

    let device = config.device()?;
    let data = GraphData::load(dir, &device)
        .with_context(|| format!("Failed to load dataset {}", dir.display()))?;

    pb.finish_with_message(format!("Loaded in {:.2?}", start.elapsed()));
    Ok(data)
}

fn progress_bar(len: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!("{{bar:40}} {{pos}}/{{len}} {unit} {{msg}}");
    if let Ok(style) = ProgressStyle::with_template(&template) {
        pb.set_style(style);
    }
    pb
}

fn cmd_config() -> Result<()> {
    println!("{}", ExperimentConfig::default().to_json()?);
    Ok(())
}

fn cmd_train(
    data_dir: &Path,
    config_path: Option<&Path>,
    output: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ExperimentConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    let data = load_data(data_dir, &config)?;
    let Some(labels) = data.labels() else {
        bail!("{} has no labels.csv; training needs labels", data_dir.display());
    };
    let class_count = data.class_count().unwrap_or(0);
    if config.model.feat_dim != data.feat_dim() {
        warn!(
            configured = config.model.feat_dim,
            found = data.feat_dim(),
            "feature dimension taken from the dataset"
        );
        config.model.feat_dim = data.feat_dim();
    }

    let store = ParameterStore::new(&config.device()?);
    let model = SupervisedGraphSage::new(
        &config.model,
        data.features().clone(),
        data.adjacency().clone(),
        class_count,
        config.seed,
        store.var_builder(),
    )?;
    store.initialize(config.seed)?;

    let start = Instant::now();
    let pb = progress_bar(config.training.epochs as u64, "epochs");
    let trainer = Trainer::new(&model, &store, &config.training, config.seed);
    let report = trainer.train_with_callback(
        labels,
        Box::new(|metrics: &EpochMetrics| {
            pb.set_message(format!("loss {:.4}", metrics.loss));
            pb.inc(1);
        }),
    )?;
    pb.finish_with_message(format!("Trained in {:.2?}", start.elapsed()));

    let meta = CheckpointMeta {
        config,
        class_count,
        node_count: data.node_count(),
        parameter_keys: model.parameter_keys(),
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    save_checkpoint(&store, &meta, output)?;

    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    match report.final_accuracy() {
        Some(acc) => println!("Validation accuracy: {acc:.4}"),
        None => println!("Validation accuracy: n/a (no held-out nodes)"),
    }
    println!("Saved {}", output.display());
    Ok(())
}

fn cmd_embed(
    data_dir: &Path,
    checkpoint: &Path,
    output: &Path,
    keys: Option<Vec<String>>,
    mean_baseline: Option<&Path>,
    batch_size: usize,
) -> Result<()> {
    let meta = read_meta(checkpoint)
        .with_context(|| format!("Failed to read metadata for {}", checkpoint.display()))?;
    let config = meta.config;
    let data = load_data(data_dir, &config)?;

    let store = ParameterStore::new(&config.device()?);
    let model = SupervisedGraphSage::new(
        &config.model,
        data.features().clone(),
        data.adjacency().clone(),
        meta.class_count,
        config.seed,
        store.var_builder(),
    )?;
    store.initialize(config.seed)?;
    match &keys {
        Some(keys) => store.load_partial(checkpoint, keys.as_slice())?,
        None => store.load(checkpoint)?,
    }
    info!(
        checkpoint = %checkpoint.display(),
        keys = keys.as_ref().map_or(meta.parameter_keys.len(), Vec::len),
        "parameters loaded"
    );

    let node_count = data.node_count() as u64;
    let start = Instant::now();
    let pb = progress_bar(node_count, "nodes");
    let embeddings = extract_embeddings(&model, batch_size, |done| pb.set_position(done as u64))?;
    pb.finish_with_message(format!("Embedded in {:.2?}", start.elapsed()));
    embeddings
        .write_npy(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {:?} embeddings to {}", embeddings.dims(), output.display());

    if let Some(path) = mean_baseline {
        let pb = progress_bar(node_count, "nodes");
        let baseline =
            mean_aggregate_features(&model, batch_size, |done| pb.set_position(done as u64))?;
        pb.finish_and_clear();
        baseline
            .write_npy(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {:?} baseline features to {}", baseline.dims(), path.display());
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    let data = load_data(data_dir, &ExperimentConfig::default())?;
    let stats = data.adjacency().degree_stats();

    println!("Graph Statistics");
    println!("================");
    println!("Nodes:          {}", stats.node_count);
    println!("Feature dim:    {}", data.feat_dim());
    match data.class_count() {
        Some(classes) => println!("Classes:        {classes}"),
        None => println!("Classes:        unlabeled"),
    }
    println!("Edges:          {}", stats.edge_count);
    println!("Min degree:     {}", stats.min_degree);
    println!("Max degree:     {}", stats.max_degree);
    println!("Avg degree:     {:.2}", stats.avg_degree);
    println!("Self-loop only: {}", stats.self_loop_only);

    Ok(())
}
