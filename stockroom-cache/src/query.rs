//! Sequenced product list fetches.

use std::sync::Arc;
use stockroom_core::{InventoryService, QueryKey, RemoteResult};

use crate::store::{CacheEntry, FetchApply, RecordCache};

/// What happened to a completed refetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefetchOutcome {
    /// The response was written to the cache.
    Applied(CacheEntry),
    /// A newer fetch or a mutation superseded this one; the cache was left as is.
    Discarded { seq: u64, entry: CacheEntry },
}

impl RefetchOutcome {
    pub fn entry(&self) -> &CacheEntry {
        match self {
            Self::Applied(entry) | Self::Discarded { entry, .. } => entry,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Reads product lists through the [`RecordCache`].
pub struct ProductQueries<S> {
    service: Arc<S>,
    cache: Arc<RecordCache>,
}

impl<S: InventoryService> ProductQueries<S> {
    pub fn new(service: Arc<S>, cache: Arc<RecordCache>) -> Self {
        Self { service, cache }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    /// Cached entry for `key`, fetching it on a miss.
    pub async fn fetch(&self, key: &QueryKey) -> RemoteResult<CacheEntry> {
        if let Some(entry) = self.cache.lookup(key) {
            return Ok(entry);
        }
        Ok(self.refetch(key).await?.entry().clone())
    }

    /// Fetch `key` from the service. Only the latest fetch issued for a key
    /// may write to the cache.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn refetch(&self, key: &QueryKey) -> RemoteResult<RefetchOutcome> {
        let ticket = self.cache.issue_fetch(key);
        let records = self.service.list_products(key).await?;
        let entry = CacheEntry::new(records);
        match self.cache.apply_fetch(&ticket, entry.clone()) {
            FetchApply::Applied => {
                tracing::trace!(seq = ticket.seq(), count = entry.len(), "Refetch applied");
                Ok(RefetchOutcome::Applied(entry))
            }
            FetchApply::Stale { seq } => {
                tracing::debug!(seq, "Discarding stale refetch");
                Ok(RefetchOutcome::Discarded { seq, entry })
            }
        }
    }

    /// Run every scheduled refetch, in scheduling order.
    ///
    /// A failed refetch leaves the current entry in place and is reported
    /// alongside its key; it is not rescheduled.
    pub async fn run_scheduled(&self) -> Vec<(QueryKey, RemoteResult<RefetchOutcome>)> {
        let mut results = Vec::new();
        for key in self.cache.take_scheduled() {
            let outcome = self.refetch(&key).await;
            if let Err(err) = &outcome {
                tracing::warn!(key = %key, error = %err, "Scheduled refetch failed");
            }
            results.push((key, outcome));
        }
        results
    }

    /// Evict `key` so the next read fetches it again.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.cache.invalidate(key)
    }
}
