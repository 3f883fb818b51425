// Customizer - prepare the current cart for checkout

use tracing::{error, info, warn};

use customizer_app::{log_filter, Pipeline};
use customizer_common::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config))
        .with_writer(std::io::stderr)
        .json()
        .init();

    info!("Starting checkout preparation");

    let pipeline = Pipeline::from_env_with(config).map_err(|e| {
        error!("Failed to assemble pipeline: {}", e);
        e
    })?;

    let report = pipeline.prepare_checkout().await.map_err(|e| {
        error!(code = e.error_code(), "Checkout preparation failed: {}", e);
        anyhow::Error::from(e)
    })?;

    if let Some(partial) = report.partial_error() {
        warn!(code = partial.error_code(), "{}", partial);
    }
    if !report.unprepared_lines().is_empty() {
        warn!(lines = ?report.unprepared_lines(), "Some cart lines could not be prepared");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(uploads = report.uploads, "Checkout preparation complete");
    Ok(())
}
