use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use imgrank::evaluation::{Evaluation, export_top_k, plot_score_distribution};
use imgrank::io::{read_ranking_csv, scan_directory, write_ranking_csv};
use imgrank::{
    Annotations, CompositeExtractor, Config, Deduplicator, Evaluator, FeatureRecord, FusionScorer,
    PerceptualHasher, ProxyEvaluator, ProxyMetric, SearchOutcome, WeightSearch, extract_batch, rank,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "imgrank", version, about = "Rank photos by blended quality score")]
struct Cli {
    /// JSON config file (weights, dedup threshold, search grid, output dirs)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score every image in a folder and write the ranking CSV
    RunRanking {
        /// Folder of images to rank
        #[arg(long, value_name = "DIR")]
        input_dir: PathBuf,
        /// Ranking CSV to write (default: `<csv_dir>/<folder>.csv`)
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// How many of the best images to print
        #[arg(long, default_value_t = 50)]
        topk: usize,
        /// Device the aesthetic model ran on
        #[arg(long, default_value = "cpu")]
        device: String,
        /// JSON file with externally computed aesthetic scores and face counts
        #[arg(long, value_name = "FILE")]
        annotations: Option<PathBuf>,
        /// Drop near-duplicate images before ranking
        #[arg(long)]
        dedup: bool,
        /// Hamming distance for --dedup (default: config `dedup_threshold`)
        #[arg(long, requires = "dedup")]
        threshold: Option<u32>,
    },

    /// Compute proxy metrics for a ranking CSV and export a histogram and the top images
    Evaluate {
        /// Ranking CSV produced by run-ranking
        #[arg(long, value_name = "FILE")]
        input_csv: PathBuf,
        /// How many of the best images to export
        #[arg(long, default_value_t = 10)]
        topk: usize,
    },

    /// Search the configured weight grid for the weights maximizing a proxy metric
    SearchWeights {
        /// Folder of images to tune on
        #[arg(long, value_name = "DIR")]
        input_dir: PathBuf,
        /// score_std, sharpness_corr or duplicate_fraction (default: config `metric`)
        #[arg(long)]
        metric: Option<ProxyMetric>,
        /// JSON file with externally computed aesthetic scores and face counts
        #[arg(long, value_name = "FILE")]
        annotations: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct SearchReport<'a> {
    generated_at: DateTime<Utc>,
    input_dir: &'a Path,
    images: usize,
    #[serde(flatten)]
    outcome: SearchOutcome,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::RunRanking {
            input_dir,
            output,
            topk,
            device,
            annotations,
            dedup,
            threshold,
        } => {
            println!("▶ Ranking images in: {}", input_dir.display());
            info!(device = %device, "Aesthetic scores are read from annotations; device is informational");

            let images = benchmark("scanning", || scan_directory(&input_dir, &config.extensions))
                .with_context(|| format!("Failed to scan {:?}", input_dir))?;
            let extractor = CompositeExtractor::standard(load_annotations(annotations.as_deref())?);

            let mut records = benchmark("extracting features", || extract_batch(&images, &extractor));
            if records.is_empty() {
                bail!("No images could be processed in {}", input_dir.display());
            }

            FusionScorer::new(config.weights)
                .fuse(&mut records)
                .context("Feature fusion failed")?;

            if dedup {
                let deduplicator = Deduplicator::new(threshold.unwrap_or(config.dedup_threshold));
                let before = records.len();
                records = benchmark("deduplicating", || {
                    deduplicator.dedup(records, &PerceptualHasher::new())
                });
                println!(
                    "▶ Dropped {} near-duplicate(s) at threshold {}",
                    before - records.len(),
                    deduplicator.threshold()
                );
            }

            let ranked = rank(records);

            let output = output.unwrap_or_else(|| {
                let folder = input_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "ranking".to_string());
                config.csv_dir.join(format!("{}.csv", folder))
            });
            write_ranking_csv(&output, &ranked)
                .with_context(|| format!("Failed to write ranking CSV {:?}", output))?;
            println!("✅ Saved ranking CSV to {}", output.display());

            println!("\nTop {} images:", topk);
            for (i, record) in ranked.iter().take(topk).enumerate() {
                println!("{:03}. {}", i + 1, describe(record));
            }
        }

        Commands::Evaluate { input_csv, topk } => {
            let ranked = read_ranking_csv(&input_csv)
                .with_context(|| format!("Could not read ranking CSV {:?}", input_csv))?;
            println!("▶ Evaluating {} ranked images from {}", ranked.len(), input_csv.display());

            match ProxyEvaluator::new().evaluate(&ranked) {
                evaluation @ Evaluation::Metrics(_) => {
                    println!("Proxy metrics: {}", serde_json::to_string(&evaluation.to_map())?);
                }
                Evaluation::Unavailable(reason) => {
                    println!("⚠️  Proxy metrics unavailable: {}", reason);
                }
            }

            let name = input_csv
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "ranking".to_string());

            let plot_path = config.plot_dir.join(format!("{}.png", name));
            match plot_score_distribution(&ranked, &plot_path) {
                Ok(()) => println!("📊 Score distribution → {}", plot_path.display()),
                Err(e) => warn!("Failed to plot score distribution: {}", e),
            }

            let topk_dir = config.topk_dir.join(&name);
            match export_top_k(&ranked, topk, &topk_dir) {
                Ok(written) => println!("🏆 Saved top-{} images → {}", written, topk_dir.display()),
                Err(e) => warn!("Failed to save top-K images: {}", e),
            }
        }

        Commands::SearchWeights {
            input_dir,
            metric,
            annotations,
        } => {
            let metric = metric.unwrap_or(config.metric);
            let images = benchmark("scanning", || scan_directory(&input_dir, &config.extensions))
                .with_context(|| format!("Failed to scan {:?}", input_dir))?;
            if images.is_empty() {
                bail!("No images found in {}", input_dir.display());
            }
            let extractor = CompositeExtractor::standard(load_annotations(annotations.as_deref())?);

            let evaluator = ProxyEvaluator::new();
            let search = WeightSearch::new(&config.search_grid, metric, &evaluator);
            let outcome = benchmark("weight search", || search.search(&images, &extractor));

            if outcome.best_weights.is_none() {
                warn!("No weight combination produced a usable {}", metric);
            }

            let report = SearchReport {
                generated_at: Utc::now(),
                input_dir: &input_dir,
                images: images.len(),
                outcome,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to install tracing subscriber")
}

fn load_annotations(path: Option<&Path>) -> Result<Annotations> {
    match path {
        Some(path) => Annotations::load(path)
            .with_context(|| format!("Failed to load annotations {:?}", path)),
        None => {
            warn!("No annotations given; aesthetic scores contribute nothing");
            Ok(Annotations::empty())
        }
    }
}

/// One line of the top-K listing.
fn describe(record: &FeatureRecord) -> String {
    let f = |v: Option<f64>, precision: usize| match v {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    };
    let faces = record
        .face_present
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  score={} aest={} sharp={} exp={} ctr={} faces={}",
        record.file,
        f(record.final_score, 4),
        f(record.aesthetic, 3),
        f(record.sharpness_norm, 3),
        f(record.exposure_norm, 3),
        f(record.contrast_norm, 3),
        faces
    )
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
