//! Stockroom client: the view-facing side of the inventory dashboard.
//!
//! Wires the consistency core in `stockroom-cache` to a GraphQL service,
//! a TOML configuration and a tracing subscriber, and exposes the
//! [`Dashboard`](state::Dashboard) state the view layer reads from.

pub mod api_client;
pub mod cli;
pub mod config;
pub mod error;
pub mod notifications;
pub mod state;
pub mod telemetry;

pub use api_client::{ApiClient, ApiClientError};
pub use config::{ConfigError, DashboardConfig};
pub use error::ClientError;
pub use state::Dashboard;
