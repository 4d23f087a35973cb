//! Snapshot and rollback of cache entries.

use std::sync::Arc;
use stockroom_core::{ProductId, QueryKey};
use tracing::trace;

use crate::store::{CacheEntry, RecordCache};

/// Captured value of one cache entry taken before a projection.
///
/// Entries hold records behind `Arc` and records are never edited in place,
/// so the captured value cannot be changed through the live cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Present(CacheEntry),
    /// The key had no entry. Restoring this removes the entry instead of
    /// writing an empty list, keeping the "not yet fetched" state.
    Absent,
}

impl Snapshot {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Present(entry) => Some(entry),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Takes and restores [`Snapshot`]s against a shared [`RecordCache`].
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    cache: Arc<RecordCache>,
}

impl SnapshotManager {
    pub fn new(cache: Arc<RecordCache>) -> Self {
        Self { cache }
    }

    /// Capture the current entry for `key`.
    pub fn begin_mutation(&self, key: &QueryKey) -> Snapshot {
        match self.cache.get(key) {
            Some(entry) => Snapshot::Present(entry),
            None => Snapshot::Absent,
        }
    }

    /// Unconditionally overwrite the live entry for `key` with `snapshot`.
    pub fn rollback(&self, key: &QueryKey, snapshot: &Snapshot) {
        trace!(key = %key, absent = snapshot.is_absent(), "Restoring snapshot");
        match snapshot {
            Snapshot::Present(entry) => self.cache.put(key.clone(), entry.clone()),
            Snapshot::Absent => {
                self.cache.remove(key);
            }
        }
        self.cache.record(|stats| stats.rollbacks += 1);
    }

    /// Restore only record `id` from `snapshot`, keeping every other record
    /// of the live entry as it is now.
    ///
    /// Other records may carry projections of mutations still in flight, or
    /// fresher data from a refetch. Returns whether the live entry changed.
    pub fn rollback_record(&self, key: &QueryKey, snapshot: &Snapshot, id: &ProductId) -> bool {
        let Some(saved_entry) = snapshot.entry() else {
            self.rollback(key, snapshot);
            return true;
        };
        let Some(saved) = saved_entry.get(id) else {
            return false;
        };
        if !self.cache.replace_record(key, saved) {
            return false;
        }
        trace!(key = %key, id = %id, "Restored record from snapshot");
        self.cache.record(|stats| stats.rollbacks += 1);
        true
    }

    /// Release `snapshot`. The cache already holds the desired state.
    pub fn commit(&self, key: &QueryKey, snapshot: Snapshot) {
        trace!(key = %key, "Releasing snapshot");
        drop(snapshot);
    }
}
