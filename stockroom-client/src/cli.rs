//! Headless command line front end.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use stockroom_core::{DateRange, InventoryService, MutationIntent, ProductFilters};

use crate::error::ClientError;
use crate::state::Dashboard;

#[derive(Parser, Debug)]
#[command(name = "stockroom")]
#[command(about = "Inventory dashboard client with optimistic updates")]
#[command(version)]
pub struct Cli {
    /// Configuration file (falls back to STOCKROOM_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List products matching the filters
    Products {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long, default_value = "all")]
        status: String,
        #[arg(long, default_value = "")]
        warehouse: String,
    },
    /// Stock and demand trend (7d, 14d or 30d)
    Kpis { range: Option<DateRange> },
    /// Set the demand of a product
    Demand { id: String, demand: u64 },
    /// Move stock of a product to another warehouse
    Transfer {
        id: String,
        from: String,
        to: String,
        #[arg(allow_negative_numbers = true)]
        qty: i64,
    },
}

/// Run `command` against `dashboard` and build its JSON output.
///
/// Mutations load the unfiltered list first so the projection has an entry
/// to land in, then drain the refetches settlement scheduled. A failed
/// mutation still drains before its error is returned.
pub async fn run<S: InventoryService>(
    dashboard: &Dashboard<S>,
    command: Command,
) -> Result<Value, ClientError> {
    match command {
        Command::Products {
            search,
            status,
            warehouse,
        } => {
            dashboard.set_filters(ProductFilters {
                search,
                status,
                warehouse,
            });
            let entry = dashboard.load_products().await?;
            Ok(json!({
                "key": dashboard.query_key().to_string(),
                "summary": entry.summary(),
                "products": entry.to_records(),
            }))
        }
        Command::Kpis { range } => {
            if let Some(range) = range {
                dashboard.set_date_range(range);
            }
            let kpis = dashboard.load_kpis().await?;
            Ok(json!({
                "range": dashboard.date_range(),
                "kpis": kpis,
            }))
        }
        Command::Demand { id, demand } => {
            mutate(dashboard, MutationIntent::update_demand(id, demand)).await
        }
        Command::Transfer { id, from, to, qty } => {
            mutate(dashboard, MutationIntent::transfer_stock(id, from, to, qty)).await
        }
    }
}

async fn mutate<S: InventoryService>(
    dashboard: &Dashboard<S>,
    intent: MutationIntent,
) -> Result<Value, ClientError> {
    dashboard.clear_filters();
    dashboard.load_products().await?;
    let result = dashboard.mutate(intent).await;
    for (key, outcome) in dashboard.sync().await {
        if let Err(err) = outcome {
            tracing::warn!(key = %key, error = %err, "Refetch after mutation failed");
        }
    }
    let record = result?;
    let stats = dashboard.cache_stats();
    Ok(json!({
        "record": record,
        "products": dashboard.products().map(|entry| entry.to_records()),
        "cache": {
            "projections": stats.projections,
            "rollbacks": stats.rollbacks,
            "fetches_applied": stats.fetches_applied,
            "fetches_discarded": stats.fetches_discarded,
        },
    }))
}
