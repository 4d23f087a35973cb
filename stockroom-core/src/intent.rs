//! Mutation intents submitted by the view layer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::product::ProductId;

/// A user-requested change to one product record.
///
/// Intents are immutable once submitted; the executor only ever reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationIntent {
    UpdateDemand {
        id: ProductId,
        demand: u64,
    },
    TransferStock {
        id: ProductId,
        from: String,
        to: String,
        qty: i64,
    },
}

impl MutationIntent {
    pub fn update_demand(id: impl Into<ProductId>, demand: u64) -> Self {
        Self::UpdateDemand {
            id: id.into(),
            demand,
        }
    }

    pub fn transfer_stock(
        id: impl Into<ProductId>,
        from: impl Into<String>,
        to: impl Into<String>,
        qty: i64,
    ) -> Self {
        Self::TransferStock {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            qty,
        }
    }

    /// The record this intent affects.
    pub fn target(&self) -> &ProductId {
        match self {
            Self::UpdateDemand { id, .. } | Self::TransferStock { id, .. } => id,
        }
    }

    /// Remote operation name, used in logs and server error messages.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::UpdateDemand { .. } => "updateDemand",
            Self::TransferStock { .. } => "transferStock",
        }
    }

    /// Reject intents that must never reach the cache or the wire.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target().is_blank() {
            return Err(ValidationError::RequiredFieldMissing { field: "id" });
        }
        if let Self::TransferStock { from, to, qty, .. } = self {
            if from.trim().is_empty() {
                return Err(ValidationError::RequiredFieldMissing { field: "from" });
            }
            if to.trim().is_empty() {
                return Err(ValidationError::RequiredFieldMissing { field: "to" });
            }
            if from == to {
                return Err(ValidationError::InvalidValue {
                    field: "to",
                    reason: format!("source and destination are both '{}'", from),
                });
            }
            if *qty <= 0 {
                return Err(ValidationError::InvalidValue {
                    field: "qty",
                    reason: format!("must be > 0, got {}", qty),
                });
            }
        }
        Ok(())
    }
}
