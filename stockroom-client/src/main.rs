//! Stockroom CLI entry point.

use clap::Parser;
use std::sync::Arc;
use stockroom_client::cli::{self, Cli};
use stockroom_client::telemetry::init_logging;
use stockroom_client::{ApiClient, ClientError, Dashboard, DashboardConfig};

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let args = Cli::parse();
    let config = DashboardConfig::load(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let api = Arc::new(ApiClient::new(&config)?);
    tracing::info!(endpoint = api.endpoint(), "Starting stockroom");
    let dashboard = Dashboard::new(api, config.date_range()?);

    let output = cli::run(&dashboard, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
