//! Stockroom Core - Inventory Types
//!
//! Pure data structures shared by every Stockroom crate: product records,
//! KPI points, mutation intents and the query keys that address cached
//! product lists. The only behavior here is validation, classification and
//! key derivation; caching and reconciliation live in `stockroom-cache`.

pub mod error;
pub mod intent;
pub mod product;
pub mod query;
pub mod service;

pub use error::{RemoteError, StockroomError, StockroomResult, ValidationError};
pub use intent::MutationIntent;
pub use product::{DateRange, InventorySummary, Kpi, ProductId, ProductRecord, ProductStatus};
pub use query::{ProductFilters, QueryKey, ALL_SENTINEL};
pub use service::{InventoryService, RemoteResult};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
