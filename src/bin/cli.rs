//! Orchestrator CLI
//!
//! Validates configuration and runs synthetic batches against the configured
//! rate limits, which is handy for tuning worker counts before pointing the
//! pipelines at a real API.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use orchestrator::{
    batch::{BatchProcessor, CancellationToken, LogSink, RateLimiterRegistry},
    error::{AppError, Result},
    models::Config,
    utils::parse_keywords,
};

/// Bounded-concurrency batch orchestrator
#[derive(Parser, Debug)]
#[command(name = "orchestrator", version, about = "Bounded-concurrency batch orchestrator")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration file
    Validate,

    /// Run a synthetic batch through the worker pool
    Simulate {
        /// Keywords file (comma or newline separated)
        #[arg(short, long, conflicts_with = "items")]
        input: Option<PathBuf>,

        /// Number of generated items when no input file is given
        #[arg(short = 'n', long, default_value_t = 20)]
        items: usize,

        /// Simulated handler latency in milliseconds
        #[arg(long, default_value_t = 100)]
        latency_ms: u64,

        /// Fail every Nth item (0 disables)
        #[arg(long, default_value_t = 0)]
        fail_every: usize,

        /// Rate limiter resource name
        #[arg(short, long, default_value = "keyword-volume-api")]
        resource: String,

        /// Worker count (default: pool.max_workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print the summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env_overrides();
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!(
                "✓ Config OK ({} rate limits, {} workers by default)",
                config.rate_limits.len(),
                config.pool.max_workers
            );
        }

        Command::Simulate {
            input,
            items,
            latency_ms,
            fail_every,
            resource,
            workers,
            json,
        } => {
            config.validate()?;

            let labels = match input {
                Some(path) => parse_keywords(&std::fs::read_to_string(&path)?),
                None => (1..=items).map(|i| format!("item-{i}")).collect(),
            };
            if labels.is_empty() {
                return Err(AppError::validation("no items to process"));
            }

            let token = CancellationToken::new();
            let stopper = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received, finishing in-flight items...");
                    stopper.request_stop();
                }
            });

            let limiter = RateLimiterRegistry::global().for_resource(&resource, &config)?;
            let processor = BatchProcessor::new(workers.unwrap_or(config.pool.max_workers))?
                .with_limiter(limiter)
                .with_token(token)
                .with_label(resource.as_str())
                .with_labeler(|(_, label): &(usize, String)| label.clone());

            let latency = Duration::from_millis(latency_ms);
            let handler = move |(n, label): (usize, String)| async move {
                tokio::time::sleep(latency).await;
                if fail_every > 0 && (n + 1) % fail_every == 0 {
                    return Err(AppError::api(503, format!("simulated failure for {label}")));
                }
                Ok(label.len())
            };

            let mut sink = LogSink::new(resource.as_str()).every(10);
            let result = processor
                .run(labels.into_iter().enumerate().collect(), handler, &mut sink)
                .await;

            let summary = &result.summary;
            if json {
                println!("{}", serde_json::to_string_pretty(summary)?);
            } else {
                log::info!(
                    "{} succeeded, {} failed, {} skipped in {:?} ({:.1}% success)",
                    summary.succeeded,
                    summary.failed,
                    summary.skipped,
                    summary.duration,
                    summary.success_rate() * 100.0
                );
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
