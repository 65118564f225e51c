//! CLI command definitions for dedup-forge.
//!
//! `dedup` runs the full choice-type and policy deduplication over a JSONL
//! file; `cache stats` inspects the persistent result cache.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cache::{CacheStore, SqliteCacheStore};
use crate::dedup::{
    default_output_path, DedupConfig, DedupPipeline, DedupSummary, NoiseStrategy,
};
use crate::embeddings::OpenAiEmbeddingClient;
use crate::llm::LiteLlmClient;

/// Default input file.
const DEFAULT_INPUT: &str = "input.jsonl";

/// Choice-type and policy deduplication for synthetic dialogue data.
#[derive(Parser)]
#[command(name = "dedup-forge")]
#[command(about = "Deduplicate choice types and their policies with embeddings and an LLM judge")]
#[command(version)]
#[command(
    long_about = "dedup-forge collapses near-duplicate choice types into synonym groups and clusters the policy lists under each group.\n\nEvery model and embedding call is cached in a local SQLite file, so re-runs over the same data are free.\n\nExample usage:\n  dedup-forge dedup -i choices.jsonl -n 500 -o outputs/deduped.jsonl"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Deduplicate choice types and policies from a JSONL file.
    #[command(alias = "dd")]
    Dedup(DedupArgs),

    /// Inspect the result cache.
    Cache(CacheArgs),
}

/// Arguments for `dedup-forge dedup`.
///
/// Unset options fall back to the `DEDUP_*` environment variables, then to
/// built-in defaults.
#[derive(Parser, Debug)]
pub struct DedupArgs {
    /// Input JSONL file, one {"choice_type", "policies"} object per line.
    #[arg(short = 'i', long = "input", default_value = DEFAULT_INPUT)]
    pub input: PathBuf,

    /// Only process the first N valid records.
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Output JSONL file (default: outputs/deduplication-<timestamp>.jsonl).
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// DBSCAN neighbourhood radius in cosine distance.
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// DBSCAN minimum neighbourhood size.
    #[arg(long)]
    pub min_points: Option<usize>,

    /// Handling of unclustered choice types: "pooled" or "singletons".
    #[arg(long)]
    pub noise_strategy: Option<NoiseStrategy>,

    /// LLM model for synonym merging and policy clustering.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Sampling temperature. Results are cached even when nonzero.
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Embedding model.
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// SQLite cache database for model and embedding results.
    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    /// Number of clusters processed concurrently. Output order is unaffected.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl DedupArgs {
    fn apply(&self, mut config: DedupConfig) -> DedupConfig {
        if let Some(epsilon) = self.epsilon {
            config = config.with_epsilon(epsilon);
        }
        if let Some(min_points) = self.min_points {
            config = config.with_min_points(min_points);
        }
        if let Some(strategy) = self.noise_strategy {
            config = config.with_noise_strategy(strategy);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(model) = &self.embedding_model {
            config = config.with_embedding_model(model.clone());
        }
        if let Some(path) = &self.cache_db {
            config = config.with_cache_path(path.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        config
    }
}

/// Arguments for `dedup-forge cache`.
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

/// Cache subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum CacheSubcommand {
    /// Print the number of cached results.
    Stats(CacheStatsArgs),
}

/// Arguments for `dedup-forge cache stats`.
#[derive(Parser, Debug)]
pub struct CacheStatsArgs {
    /// SQLite cache database (default: DEDUP_CACHE_PATH or cache.sqlite).
    #[arg(long)]
    pub cache_db: Option<PathBuf>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Dedup(args) => run_dedup_command(args).await,
        Commands::Cache(args) => match args.command {
            CacheSubcommand::Stats(args) => run_cache_stats_command(args).await,
        },
    }
}

#[derive(Debug, Serialize)]
struct DedupReport<'a> {
    input: String,
    output: String,
    #[serde(flatten)]
    summary: &'a DedupSummary,
}

async fn run_dedup_command(args: DedupArgs) -> anyhow::Result<()> {
    let config = args.apply(DedupConfig::from_env().context("Invalid DEDUP_* environment")?);
    config.validate().context("Invalid deduplication options")?;

    let cache_path = config.cache_path.to_string_lossy().to_string();
    let cache = Arc::new(
        SqliteCacheStore::open(&cache_path)
            .await
            .with_context(|| format!("Failed to open cache database {}", cache_path))?,
    );
    let llm = Arc::new(LiteLlmClient::from_env().context("Failed to configure LLM client")?);
    let embeddings = Arc::new(
        OpenAiEmbeddingClient::from_env(config.embedding_model.clone(), config.embedding_dimensions)
            .context("Failed to configure embedding client")?,
    );

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(chrono::Utc::now()));

    info!(
        input = %args.input.display(),
        output = %output.display(),
        model = %config.model,
        epsilon = config.epsilon,
        min_points = config.min_points,
        noise_strategy = %config.noise_strategy,
        concurrency = config.concurrency,
        llm_api = llm.api_base(),
        embedding_api = embeddings.api_base(),
        "Starting deduplication"
    );

    let pipeline = DedupPipeline::new(&config, llm, embeddings, cache);
    let summary = pipeline
        .run(&args.input, args.limit, &output)
        .await
        .with_context(|| format!("Deduplication of {} failed", args.input.display()))?;

    if args.json {
        let report = DedupReport {
            input: args.input.display().to_string(),
            output: output.display().to_string(),
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n=== Deduplication Results ===");
        println!("Input records:       {}", summary.records_in);
        println!("Unique choice types: {}", summary.unique_choice_types);
        println!("Density clusters:    {}", summary.density_clusters);
        println!("Synonym groups:      {}", summary.synonym_groups);
        println!("Output records:      {}", summary.records_out);
        println!("Policy fallbacks:    {}", summary.policy_fallbacks);
        println!("Written to:          {}", output.display());
    }
    Ok(())
}

async fn run_cache_stats_command(args: CacheStatsArgs) -> anyhow::Result<()> {
    let cache_path = match args.cache_db {
        Some(path) => path,
        None => DedupConfig::from_env()
            .context("Invalid DEDUP_* environment")?
            .cache_path,
    };
    let cache_path = cache_path.to_string_lossy().to_string();
    let store = SqliteCacheStore::open(&cache_path)
        .await
        .with_context(|| format!("Failed to open cache database {}", cache_path))?;
    let entries = store.len().await?;

    if args.json {
        let json = serde_json::json!({"path": cache_path, "entries": entries});
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Cache:   {}", cache_path);
        println!("Entries: {}", entries);
    }
    Ok(())
}
