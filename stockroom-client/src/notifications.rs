//! Banners surfaced to the view layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use stockroom_core::{RemoteError, StockroomError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    Retry,
    Dismiss,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Banner for a failed operation. Only transport failures offer a retry.
    pub fn from_error(err: &StockroomError) -> Self {
        match err {
            StockroomError::Validation(inner) => {
                Self::new(NotificationLevel::Warning, inner.to_string())
            }
            StockroomError::Remote(RemoteError::Network { reason }) => Self::new(
                NotificationLevel::Error,
                format!("Connection problem: {}", reason),
            )
            .with_action(NotificationAction::Retry),
            StockroomError::Remote(RemoteError::Server { message, .. }) => {
                Self::new(NotificationLevel::Error, message.clone())
                    .with_action(NotificationAction::Dismiss)
            }
        }
    }
}
