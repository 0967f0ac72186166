//! muninn: query broker CLI
//!
//! Runs queries against the providers declared in the config file and
//! persists what the broker learns between invocations.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use muninn::{Broker, Config, JsonFileStore, MemoryStore, Store};

/// Muninn query broker CLI
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version = muninn::PKG_VERSION)]
#[command(about = "Federated query broker for launcher search providers")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "MUNINN_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the state file (overrides the config's `[state] path`).
    #[arg(short, long, env = "MUNINN_STATE")]
    state: Option<PathBuf>,

    /// Keep state in memory only.
    #[arg(long)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a query (or omit the text to read it from stdin)
    Query {
        text: Option<String>,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List registered providers
    Providers,

    /// Show predicted hot queries
    Predict {
        /// Only predict for this provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Warm the cache with predicted hot queries
    Warmup {
        /// Only warm this provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Show usage and cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let build = muninn::BuildInfo::current();
    info!(version = %build, built_at = build.built_at, "muninn starting");
    let config = Config::load_or_default(args.config.as_deref())?;
    let store = open_store(&args, &config);

    let broker = config.builder().store(store).build()?;
    for provider in config.static_providers() {
        broker.register(Arc::new(provider)).await?;
    }
    match broker.restore_state().await {
        Ok(true) => info!("restored learned model"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "failed to restore learned model"),
    }

    run(&broker, args.command).await?;

    broker.save_state().await?;
    Ok(())
}

fn open_store(args: &Args, config: &Config) -> Arc<dyn Store> {
    if args.ephemeral {
        return Arc::new(MemoryStore::new());
    }
    let path = args
        .state
        .clone()
        .or_else(|| config.state.path.clone())
        .or_else(JsonFileStore::default_path);
    match path {
        Some(path) => Arc::new(JsonFileStore::new(path)),
        None => {
            warn!("no state directory available; state will not persist");
            Arc::new(MemoryStore::new())
        }
    }
}

async fn run(broker: &Broker, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Query { text, limit } => {
            let query = resolve_text(text, "query")?;
            let results = match limit {
                Some(limit) => broker.search_with_limit(&query, limit).await,
                None => broker.search(&query).await,
            };
            if results.is_empty() {
                println!("no results");
            }
            for item in results {
                if item.description.is_empty() {
                    println!("{:>6.2}  {}  [{}]", item.priority, item.title, item.provider_id);
                } else {
                    println!(
                        "{:>6.2}  {} - {}  [{}]",
                        item.priority, item.title, item.description, item.provider_id
                    );
                }
            }
        }

        Command::Providers => {
            let providers = broker.providers();
            if providers.is_empty() {
                println!("no providers configured");
            }
            for provider in providers {
                let prefixes = provider.provider().search_prefixes().join(", ");
                println!(
                    "{} ({}): priority {}, {}{}",
                    provider.id(),
                    provider.name(),
                    provider.priority(),
                    if provider.is_enabled() { "enabled" } else { "disabled" },
                    if prefixes.is_empty() {
                        String::new()
                    } else {
                        format!(", prefixes: {prefixes}")
                    }
                );
            }
        }

        Command::Predict { provider } => {
            let predictions = broker.predict_hot_queries(provider.as_deref());
            if predictions.is_empty() {
                println!("no usage recorded yet");
            }
            for prediction in predictions {
                println!(
                    "{:>8.3}  {}: {} (used {}x)",
                    prediction.score, prediction.provider_id, prediction.query, prediction.frequency
                );
            }
        }

        Command::Warmup { provider } => {
            let report = broker.intelligent_warmup(provider.as_deref()).await;
            println!(
                "attempted: {}, cached: {}, skipped: {}, failed: {}",
                report.attempted, report.cached, report.skipped, report.failed
            );
        }

        Command::Stats => {
            for provider in broker.providers() {
                let usage = broker.state().usage(provider.id()).await?.unwrap_or_default();
                let health = provider.health().snapshot();
                println!(
                    "{}: {} searches, {} failures, {} results, avg {}, errors {}, timeouts {}",
                    provider.id(),
                    usage.searches,
                    usage.failures,
                    usage.results,
                    usage
                        .average_elapsed()
                        .map(|d| format!("{d:?}"))
                        .unwrap_or_else(|| "-".to_string()),
                    health.errors,
                    health.timeouts,
                );
            }
            let stats = broker.cache_stats();
            println!(
                "cache: {} entries, {} bytes, hit rate {:.1}%",
                stats.entries,
                stats.memory_bytes,
                stats.hit_rate * 100.0
            );
        }
    }
    Ok(())
}

/// Resolve query text from a positional arg and/or stdin.
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err(format!("{command}: no input provided (pass text as argument or via stdin)").into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}
