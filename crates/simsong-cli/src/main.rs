//! Command-line driver for the prediction service.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use simsong_client::{ImageSource, PredictConfig, PredictionClient, PredictionOutcome};

/// Guess which character is in a picture.
#[derive(Debug, Parser)]
#[command(name = "simsong", version, about)]
struct Cli {
    /// Image to submit
    image: PathBuf,

    /// Prediction endpoint (overrides SIMSONG_API_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Bound for each of the connect, write and read phases, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Directory for the temporary upload copy (overrides SIMSONG_STAGING_DIR)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    info!(
        "Prediction config: endpoint={}, connect={:?}, write={:?}, read={:?}",
        config.endpoint,
        config.connect_timeout,
        config.write_timeout,
        config.read_timeout
    );

    let client = PredictionClient::new(config).context("Failed to create prediction client")?;

    let spinner = in_flight_spinner(cli.json);
    let outcome = client.submit(Some(ImageSource::Path(cli.image))).await;
    spinner.finish_and_clear();

    if cli.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        println!("{}", outcome.display_text());
    }

    if let PredictionOutcome::Failure { kind, .. } = &outcome {
        error!(kind = kind.as_str(), "Prediction did not succeed");
        std::process::exit(1);
    }

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<PredictConfig> {
    let mut config = PredictConfig::from_env()?;

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = PredictConfig::new(endpoint)?.endpoint;
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    if let Some(dir) = &cli.staging_dir {
        config = config.with_staging_dir(dir);
    }

    Ok(config)
}

/// Logs go to stderr so stdout carries only the outcome.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive("simsong_client=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}

fn in_flight_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Asking the oracle...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
