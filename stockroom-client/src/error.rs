//! Error types for the client.

use crate::api_client::ApiClientError;
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use stockroom_core::{RemoteError, StockroomError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Stockroom(#[from] StockroomError),
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        Self::Stockroom(err.into())
    }
}
