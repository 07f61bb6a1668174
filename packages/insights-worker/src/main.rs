//! Insights Worker
//!
//! Command-line front end for bulk insight extraction: one-shot runs,
//! pollable jobs, resumable index ticks and cache maintenance.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use insights::fetchers::{HttpInsightSource, NseIndexSource};
use insights::{
    maintenance, BatchOrchestrator, CacheStore, IndexSource, JobMode, JobTracker, MemoryStore,
    Namespace, ResumableRunner, TickOutcome, TrackerConfig,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{CacheBackend, Config};

#[derive(Parser)]
#[command(name = "insights-worker", about = "Bulk insight extraction worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once and print the outcome
    Run {
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Ignore fresh cached results
        #[arg(long)]
        invalidate: bool,
    },

    /// Submit a job and poll it until it settles
    Submit {
        #[arg(required = true)]
        symbols: Vec<String>,

        /// One symbol per chunk, chunks as wide as metadata concurrency
        #[arg(long)]
        per_symbol: bool,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// List the members of an index
    Index { name: String },

    /// Advance the resumable batch for an index by one chunk
    Tick { name: String },

    /// Refetch every member of an index
    Rebuild {
        name: String,

        /// Keep existing results and jobs
        #[arg(long)]
        no_clear: bool,
    },

    /// Show live entry counts per namespace
    CacheStats,

    /// Clear one namespace
    CacheClear { namespace: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,insights=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    let cache = connect_cache(&config).await?;
    let source = Arc::new(
        HttpInsightSource::new()
            .and_then(|s| s.with_timeout(config.request_timeout))
            .context("Failed to build HTTP client")?
            .with_user_agent(config.user_agent.clone()),
    );
    let index_source: Arc<dyn IndexSource> = Arc::new(
        NseIndexSource::with_timeout(config.request_timeout)
            .context("Failed to build index client")?
            .with_user_agent(config.user_agent.clone()),
    );
    let orchestrator = Arc::new(BatchOrchestrator::new(
        cache.clone(),
        source.clone(),
        source,
    ));

    match cli.command {
        Command::Run {
            symbols,
            invalidate,
        } => {
            let options = config.bulk.clone().with_invalidate_cache(invalidate);
            let outcome = orchestrator.run(&symbols, &options).await?;
            tracing::info!(
                fetched = outcome.fetched_count,
                cached = outcome.cached_count,
                failed = outcome.metadata_errors.len(),
                "Run finished"
            );
            print_json(&outcome)?;
        }
        Command::Submit {
            symbols,
            per_symbol,
            poll_ms,
        } => {
            let tracker = JobTracker::new(orchestrator, TrackerConfig::default())?
                .with_options(config.bulk.clone())?;
            let mode = if per_symbol {
                JobMode::PerSymbol
            } else {
                JobMode::Batched
            };
            let handle = tracker.submit(&symbols, mode).await?;
            tracing::info!(job_id = %handle.id, "Job submitted");

            loop {
                let record = tracker.status(handle.id).await?;
                if record.status.is_terminal() {
                    print_json(&record)?;
                    break;
                }
                tracing::info!(
                    completed = record.completed_stocks,
                    total = record.total_stocks,
                    "Job pending"
                );
                tokio::time::sleep(Duration::from_millis(poll_ms)).await;
            }
        }
        Command::Index { name } => {
            let members = index_source.members(&name).await.context("Index lookup failed")?;
            print_json(&members)?;
        }
        Command::Tick { name } => {
            let runner = ResumableRunner::new(orchestrator, config.resumable.clone())?
                .with_index_source(index_source);
            let outcome = runner.tick_index(&name).await?;
            let summary = match &outcome {
                TickOutcome::Skipped { state } => json!({ "action": "skipped", "state": state }),
                TickOutcome::Processed {
                    state,
                    chunk,
                    outcome,
                } => json!({
                    "action": "processed",
                    "state": state,
                    "chunk": chunk,
                    "outcome": outcome,
                }),
                TickOutcome::Failed { state, error } => {
                    json!({ "action": "failed", "state": state, "error": error })
                }
            };
            print_json(&summary)?;
        }
        Command::Rebuild { name, no_clear } => {
            let report = maintenance::rebuild_index(
                &orchestrator,
                index_source.as_ref(),
                &name,
                !no_clear,
                &config.bulk,
            )
            .await?;
            print_json(&report)?;
        }
        Command::CacheStats => {
            let sizes = maintenance::cache_sizes(cache.as_ref()).await?;
            print_json(&sizes)?;
        }
        Command::CacheClear { namespace } => {
            let Some(ns) = Namespace::parse(&namespace) else {
                bail!(
                    "unknown namespace '{}' (expected one of: {})",
                    namespace,
                    Namespace::ALL.map(|n| n.as_str()).join(", ")
                );
            };
            let cleared = cache.clear(ns).await?;
            tracing::info!(namespace = %ns, cleared, "Namespace cleared");
        }
    }

    Ok(())
}

async fn connect_cache(config: &Config) -> Result<Arc<dyn CacheStore>> {
    match config.cache_backend {
        CacheBackend::Memory => {
            tracing::info!("Using in-memory cache");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            tracing::info!(prefix = %config.redis_prefix, "Connecting to Redis cache");
            let store = insights::RedisStore::connect(&config.redis_url, config.redis_prefix.clone())
                .await
                .context("Failed to connect to Redis")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            bail!("CACHE_BACKEND=redis requires building with the 'redis' feature")
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
