//! postcode-sweep: enumerate physician registry results by postal code.
//!
//! The registry caps every search at a fixed number of results. This tool
//! searches by postal-code prefix and, wherever a result is capped, refines
//! the prefix one character at a time until each result is complete.
//!
//! Usage examples
//! --------------
//!
//! - Refine from a list of FSAs all the way down
//!   $ postcode-sweep refine --seeds fsa.txt
//!
//! - Generate the rank-2 key set from a rank-1 summary
//!   $ postcode-sweep permute 2 --input results/summary.csv
//!
//! - Fetch one key set
//!   $ postcode-sweep scrape --input-file data/search-criteria/FSA_LDU2.json
//!
//! - Build the CSV outputs
//!   $ postcode-sweep aggregate
mod args;

use crate::args::{CliArgs, Commands};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sweep_core::{AppConfig, KeyGenerator, Rank, SearchKey, SearchParams};
use sweep_scanner::{HttpSession, RateLimitedFetcher, RefinementLoop, RunReport};
use sweep_store::{
    aggregate, load_keys, write_key_set, write_outputs, AggregateOptions, KeyFilter, RawStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initialize tracing subscriber for logging
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,sweep=debug")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?
            .with_env_overrides()?,
        None => AppConfig::load_with_env().context("failed to load config")?,
    };
    Ok(config)
}

/// Cancel `token` on Ctrl-C. Records already written stay valid.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight keys");
            token.cancel();
        }
    });
}

fn build_loop(
    config: &AppConfig,
    data_dir: &Path,
    token: CancellationToken,
) -> anyhow::Result<RefinementLoop<HttpSession>> {
    let session = HttpSession::new(&config.registry, &config.scanning)?;
    let store = Arc::new(RawStore::new(data_dir));
    let fetcher = Arc::new(RateLimitedFetcher::new(session, store, config));
    Ok(RefinementLoop::new(fetcher)
        .with_criteria_dir(&config.storage.criteria_dir)
        .with_max_concurrent_fetches(config.scanning.max_concurrent_fetches)
        .with_cancellation(token))
}

fn load_key_file(path: &Path, filter: KeyFilter) -> anyhow::Result<Vec<SearchKey>> {
    let loaded =
        load_keys(path, filter).with_context(|| format!("failed to read {}", path.display()))?;
    if !loaded.rejected.is_empty() {
        warn!(
            path = %path.display(),
            rejected = loaded.rejected.len(),
            "some keys could not be parsed"
        );
    }
    Ok(loaded.keys)
}

fn permute(
    config: &AppConfig,
    level: u8,
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let rank = Rank::from_number(level)?;
    let criteria_dir = &config.storage.criteria_dir;
    let input = input.unwrap_or_else(|| default_permute_input(config, rank));
    let output_dir = output_dir.unwrap_or_else(|| criteria_dir.clone());

    let parents = load_key_file(&input, KeyFilter::CappedOnly)?;
    let expansion = KeyGenerator::default().expand_all(&parents, rank);
    let path = write_key_set(&output_dir, &rank.key_set_name(), &expansion.children)?;

    info!(
        parents = parents.len(),
        dropped = expansion.dropped.len(),
        generated = expansion.children.len(),
        path = %path.display(),
        "wrote key set"
    );
    Ok(())
}

/// Rank 1 expands the seed FSAs; deeper ranks expand the capped rows of the
/// last aggregated summary.
fn default_permute_input(config: &AppConfig, rank: Rank) -> PathBuf {
    match rank {
        Rank::One => config.storage.criteria_dir.join("FSA_LDU0.json"),
        Rank::Two | Rank::Three => config.storage.results_dir.join(aggregate::SUMMARY_FILE),
    }
}

async fn scrape(
    config: &AppConfig,
    input_file: &Path,
    data_dir: &Path,
    params: &SearchParams,
) -> anyhow::Result<()> {
    let partition = input_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .context("input file has no usable name")?;
    let keys = load_key_file(input_file, KeyFilter::All)?;

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let round = build_loop(config, data_dir, token)?
        .scan(partition, &keys, params)
        .await?;

    for failed in &round.failed {
        error!(key = %failed.key, error = %failed.error, "key failed");
    }
    info!(
        partition,
        fetched = round.fetched,
        cached = round.cached,
        capped = round.capped.len(),
        failed = round.failed.len(),
        skipped = round.skipped,
        "scrape finished"
    );
    Ok(())
}

async fn refine(
    config: &AppConfig,
    seeds: &Path,
    max_rank: u8,
    report_path: Option<&Path>,
    params: &SearchParams,
) -> anyhow::Result<()> {
    let seeds = load_key_file(seeds, KeyFilter::CappedOnly)?;
    if seeds.is_empty() {
        bail!("no usable seed keys");
    }

    let token = CancellationToken::new();
    cancel_on_ctrl_c(token.clone());
    let report = build_loop(config, &config.storage.data_dir, token)?
        .with_max_rank(Rank::from_number(max_rank)?)
        .run(&seeds, params)
        .await?;

    log_report(&report);
    if let Some(path) = report_path {
        let json = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!(path = %path.display(), "wrote run report");
    }
    Ok(())
}

fn log_report(report: &RunReport) {
    for failed in report.failed() {
        error!(key = %failed.key, error = %failed.error, "key failed");
    }
    for dropped in &report.dropped {
        warn!(key = %dropped.key, reason = %dropped.reason, "key dropped");
    }
    for key in &report.saturated {
        warn!(key = %key, "still capped at full postal code");
    }
    if report.cancelled {
        warn!("run was cancelled; rerun to resume");
    }
}

fn aggregate_outputs(
    config: &AppConfig,
    data_dir: &Path,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let store = RawStore::new(data_dir);
    let tables = aggregate::aggregate(&store, &AggregateOptions::from(&config.storage))?;
    let paths = write_outputs(output_dir, &tables)?;

    info!(
        summary = %paths.summary.display(),
        keys = tables.summary.len(),
        details = tables.details.rows.len(),
        skipped_files = tables.skipped_files.len(),
        "aggregated raw store"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?;
    info!("Starting postcode-sweep v{}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Permute {
            level,
            input,
            output_dir,
        } => permute(&config, level, input, output_dir)?,

        Commands::Scrape {
            input_file,
            output_dir,
            search,
        } => {
            let data_dir = output_dir.unwrap_or_else(|| config.storage.data_dir.clone());
            scrape(&config, &input_file, &data_dir, &search.params()).await?;
        }

        Commands::Refine {
            seeds,
            max_rank,
            report,
            search,
        } => refine(&config, &seeds, max_rank, report.as_deref(), &search.params()).await?,

        Commands::Aggregate {
            data_dir,
            output_dir,
        } => {
            let data_dir = data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
            let output_dir = output_dir.unwrap_or_else(|| config.storage.results_dir.clone());
            aggregate_outputs(&config, &data_dir, &output_dir)?;
        }
    }

    Ok(())
}
