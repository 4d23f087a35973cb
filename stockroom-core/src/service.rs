//! Remote data service boundary.

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::product::{DateRange, Kpi, ProductId, ProductRecord};
use crate::query::QueryKey;

/// Result type for calls to the remote data service.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// The remote inventory service consumed via request/response.
///
/// Each call eventually resolves to a payload or a [`RemoteError`]. No
/// ordering is guaranteed between concurrent calls, so callers must not
/// assume responses arrive in issuance order.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// List products matching the filters the key encodes.
    async fn list_products(&self, key: &QueryKey) -> RemoteResult<Vec<ProductRecord>>;

    /// Stock and demand trend for the given window.
    async fn list_kpis(&self, range: DateRange) -> RemoteResult<Vec<Kpi>>;

    async fn update_demand(&self, id: &ProductId, demand: u64) -> RemoteResult<ProductRecord>;

    async fn transfer_stock(
        &self,
        id: &ProductId,
        from: &str,
        to: &str,
        qty: i64,
    ) -> RemoteResult<ProductRecord>;
}
