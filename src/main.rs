//! CLI for building and comparing image similarity indexes

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use similarity_index::benchmark::{self, IndexKind};
use similarity_index::{dataset, logging, FeatureVector, IndexSuiteConfig};

#[derive(Parser)]
#[command(name = "simindex")]
#[command(about = "Nearest-neighbor indexes over image feature vectors", long_about = None)]
struct Cli {
    /// JSON file with index parameters. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build indexes over a record file and compare them with leave-one-out queries
    Compare {
        /// Record file: JSON array of {key, features, extraction_time_ms}
        #[arg(long)]
        records: String,
        /// Index types to compare (repeatable). All when omitted.
        #[arg(long, value_enum)]
        index: Vec<IndexKind>,
        /// Only query the first N records
        #[arg(long)]
        queries: Option<usize>,
    },
    /// Find the nearest record to a vector
    Query {
        /// Record file: JSON array of {key, features, extraction_time_ms}
        #[arg(long)]
        records: String,
        /// Query vector as comma-separated values (e.g., "0.1,0.2,0.3")
        #[arg(short, long)]
        vector: String,
        /// Index type to search with
        #[arg(long, value_enum, default_value = "mtree")]
        index: IndexKind,
        /// Record id to exclude from the search
        #[arg(long)]
        ignore: Option<usize>,
    },
}

fn load_config(path: Option<&str>) -> Result<IndexSuiteConfig> {
    match path {
        Some(path) => IndexSuiteConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path)),
        None => Ok(IndexSuiteConfig::default()),
    }
}

fn run_compare(
    config: &IndexSuiteConfig,
    records_path: &str,
    index: Vec<IndexKind>,
    queries: Option<usize>,
) -> Result<()> {
    let records = dataset::load_records(records_path)
        .with_context(|| format!("failed to load records from {}", records_path))?;
    info!(records = records.len(), path = records_path, "loaded records");

    let kinds: Vec<IndexKind> = if index.is_empty() {
        IndexKind::ALL.to_vec()
    } else {
        index
    };

    let reports = benchmark::compare(&records, &kinds, config, queries)?;

    println!(
        "{:<8} {:<6} {:>8} {:>10} {:>10} {:>10} {:>12} {:>10} {:>9}",
        "index", "mode", "records", "build ms", "avg us", "p99 us", "avg cmp", "not found", "agree"
    );
    for report in &reports {
        let m = &report.metrics;
        println!(
            "{:<8} {:<6} {:>8} {:>10.2} {:>10.2} {:>10.2} {:>12.1} {:>10} {:>8.1}%",
            report.kind.as_str(),
            if report.kind.is_exact() { "exact" } else { "approx" },
            report.indexed,
            report.build_time.as_secs_f64() * 1e3,
            m.avg_query_latency_us(),
            m.percentile_query_latency_us(99.0),
            m.avg_comparisons(),
            m.not_found(),
            report.agreement() * 100.0
        );
    }
    Ok(())
}

fn run_query(
    config: &IndexSuiteConfig,
    records_path: &str,
    vector: &str,
    index: IndexKind,
    ignore: Option<usize>,
) -> Result<()> {
    let records = dataset::load_records(records_path)
        .with_context(|| format!("failed to load records from {}", records_path))?;
    let query: FeatureVector = vector.parse()?;

    let mut idx = benchmark::build_index(index, config, query.dimension())?;
    for record in records {
        idx.insert(record)?;
    }

    let mut comparisons = 0;
    match idx.find_nearest_counted(&query, ignore, &mut comparisons)? {
        Some(neighbor) => {
            let record = idx.get(neighbor.id)?;
            println!(
                "{} (id: {}, distance: {:.4}, comparisons: {})",
                record.key, neighbor.id, neighbor.distance, comparisons
            );
        }
        None => println!("No match found ({} comparisons)", comparisons),
    }
    Ok(())
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compare {
            records,
            index,
            queries,
        } => run_compare(&config, &records, index, queries),
        Commands::Query {
            records,
            vector,
            index,
            ignore,
        } => run_query(&config, &records, &vector, index, ignore),
    }
}
