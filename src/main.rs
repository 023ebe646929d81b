//! # NewsNudge
//!
//! A daily news pipeline that crawls the top Korean headline of every section,
//! translates and summarizes it into English, grows a persistent dataset, and
//! mails a per-category digest picked by a click-prediction model.
//!
//! ## Usage
//!
//! ```sh
//! newsnudge ingest
//! newsnudge recommend --dry-run
//! ```
//!
//! ## Architecture
//!
//! Two independent runs share one storage area:
//! 1. **Ingest**: select, fetch, translate and summarize, then merge into the dataset
//! 2. **Recommend**: score each session's candidates, keep the best per
//!    category, and send the digest

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod dataset;
mod email;
mod error;
mod ingest;
mod models;
mod recommend;
mod scrapers;
mod storage;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use email::{LogMailer, SmtpMailer};
use error::NewsError;
use storage::LocalStore;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsnudge starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.data_dir, "Parsed CLI arguments");

    if let Err(e) = run(&args).await {
        error!(error = %e, elapsed_ms = start_time.elapsed().as_millis(), "Run failed");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Load settings and dispatch the selected pipeline.
#[instrument(level = "info", skip_all)]
async fn run(args: &Cli) -> Result<(), NewsError> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    info!(root = %settings.storage.root.display(), "Loaded configuration");

    let store = LocalStore::open(&settings.storage.root).await?;

    match &args.command {
        Command::Ingest(_) => {
            let client = api::build_client(&settings.http)?;
            let report = ingest::run(&settings, &client, &store).await?;
            info!(kept = report.kept, total_rows = report.total_rows, "Dataset updated");
        }
        Command::Recommend(rec) => {
            let report = if rec.dry_run {
                recommend::run(&settings, &store, &LogMailer).await?
            } else {
                let mailer = SmtpMailer::from_settings(&settings.email)?;
                recommend::run(&settings, &store, &mailer).await?
            };
            info!(
                sessions = report.sessions,
                categories = report.winners.len(),
                sent = report.digest.is_some(),
                "Recommendation finished"
            );
        }
    }

    Ok(())
}
