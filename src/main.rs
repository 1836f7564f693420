#![forbid(unsafe_code)]
//! # review_pulse CLI
//!
//! Runs the review pipeline over a CSV file (or a directory of CSV files) with
//! the columns `restaurant_name, review_date, rating, review_text` and writes
//! the enriched review table, the monthly problem and sentiment timelines and
//! the per-restaurant insight summary.
//!
//! ## Example
//! ```bash
//! cargo run --release -- reviews.csv --output-dir out --export-format csv
//! cargo run --release -- reviews/ --backend remote --model-url http://localhost:8000
//! ```
//!
//! Set `RUST_LOG=info` (or `debug`) for progress logging. See `--help` for all options.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::error;
use review_pulse::{
    Backend, ExportFormat, Pipeline, PipelineConfig, PipelineError, ReviewFailure,
    TaggingStrategy, engines_for, read_reviews, render_summary, write_report,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// CSV file or directory of CSV files to analyze
    path: String,

    /// Directory the output tables are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Output format for export (csv, tsv, json)
    #[arg(long, default_value = "csv")]
    export_format: ExportFormat,

    /// Scoring backend: built-in lexicon or a remote model server
    #[arg(long, default_value = "lexicon")]
    backend: Backend,

    /// Base URL of the model server (remote backend)
    #[arg(long)]
    model_url: Option<String>,

    /// TOML file with thresholds, weights and an optional custom taxonomy
    #[arg(long)]
    config: Option<PathBuf>,

    /// Category tagging strategy (overrides the config file)
    #[arg(long)]
    strategy: Option<TaggingStrategy>,

    /// Minimum reviews for a restaurant-month to enter the timeline (default: 10)
    #[arg(long)]
    min_reviews: Option<usize>,

    /// Number of ranked categories in the insight summary (default: 5)
    #[arg(long)]
    top_n: Option<usize>,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(min_reviews) = cli.min_reviews {
        config.min_reviews = min_reviews;
    }
    if let Some(top_n) = cli.top_n {
        config.top_n = top_n;
    }
    config.validate()?;
    Ok(config)
}

fn print_failures(header: &str, failures: &[ReviewFailure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("{header} {} review(s):", failures.len());
    for f in failures {
        eprintln!("  #{} {}: {}", f.review_id, f.restaurant, f.error);
    }
}

fn run(cli: &Cli) -> Result<(), PipelineError> {
    let config = load_config(cli)?;
    let engines = engines_for(cli.backend, cli.model_url.as_deref())?;
    let ingest = read_reviews(Path::new(&cli.path))?;
    let pipeline = Pipeline::new(&engines, config)?;
    let report = pipeline.run(&ingest.reviews)?;
    let written = write_report(&report, &cli.output_dir, cli.export_format)?;

    println!("{}", render_summary(&report));
    for path in written {
        println!("Wrote {}", path.display());
    }
    print_failures("Skipped", &ingest.rejected);
    print_failures("Skipped", &report.failures);
    print_failures("Untagged", &report.untagged);
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("Error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
