//! Keyed store of product lists.
//!
//! The [`RecordCache`] is the single shared mutable resource of the
//! protocol. It is constructed explicitly (empty) and handed by `Arc` to
//! the components that need it; dropping the last handle or calling
//! [`RecordCache::clear`] discards all cached state.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stockroom_core::{InventorySummary, ProductId, ProductRecord, QueryKey, Timestamp};

/// Ordered product list cached under one query key.
///
/// Records are shared behind `Arc` and never edited in place. Replacing a
/// record allocates a new `Arc`, so views can detect changed rows with
/// [`Arc::ptr_eq`] and snapshots can never be mutated through the live cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    records: Vec<Arc<ProductRecord>>,
    /// When the authoritative data behind this entry was fetched.
    fetched_at: Timestamp,
}

impl CacheEntry {
    /// Wrap a freshly fetched list.
    pub fn new(records: Vec<ProductRecord>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
            fetched_at: Utc::now(),
        }
    }

    pub fn from_shared(records: Vec<Arc<ProductRecord>>, fetched_at: Timestamp) -> Self {
        Self {
            records,
            fetched_at,
        }
    }

    pub fn records(&self) -> &[Arc<ProductRecord>] {
        &self.records
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &ProductId) -> Option<&Arc<ProductRecord>> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &ProductId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductRecord> {
        self.records.iter().map(Arc::as_ref)
    }

    pub fn summary(&self) -> InventorySummary {
        InventorySummary::from_records(self.iter())
    }

    pub fn to_records(&self) -> Vec<ProductRecord> {
        self.iter().cloned().collect()
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub projections: u64,
    pub rollbacks: u64,
    pub suppressed_rollbacks: u64,
    pub fetches_applied: u64,
    pub fetches_discarded: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Proof that a fetch for `key` was issued, tagged with its sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: QueryKey,
    seq: u64,
}

impl FetchTicket {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What happened to a fetch response handed to [`RecordCache::apply_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchApply {
    Applied,
    /// A newer fetch was issued, or the key was cancelled or invalidated.
    Stale { seq: u64 },
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    /// Only the ticket holding this sequence number may land for the key.
    live_fetch: HashMap<QueryKey, u64>,
    next_seq: u64,
    /// Keys awaiting a refetch, in scheduling order, without duplicates.
    scheduled: Vec<QueryKey>,
    stats: CacheStats,
}

impl CacheState {
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Process-wide product list cache.
#[derive(Debug, Default)]
pub struct RecordCache {
    state: RwLock<CacheState>,
    /// Held across multi-step sections such as snapshot-then-project so
    /// they stay atomic on a multi-threaded runtime.
    section: Mutex<()>,
}

impl RecordCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a complete point update, so a poisoned lock still
    // guards a consistent state.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive section for protocol steps spanning several cache calls.
    /// Never hold the guard across an `.await`.
    pub(crate) fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.section.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current entry for `key`, without touching statistics.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.read().entries.get(key).cloned()
    }

    /// Current entry for `key`, counted as a hit or miss.
    pub fn lookup(&self, key: &QueryKey) -> Option<CacheEntry> {
        let mut state = self.write();
        let entry = state.entries.get(key).cloned();
        if entry.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        entry
    }

    pub fn contains_key(&self, key: &QueryKey) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Overwrite the entry for `key`.
    pub fn put(&self, key: QueryKey, entry: CacheEntry) {
        self.write().entries.insert(key, entry);
    }

    /// Swap `record` into the live entry for `key` in place of the record with
    /// the same id, under one write lock. Returns false, writing nothing, when
    /// the entry is missing or no longer holds that id.
    pub fn replace_record(&self, key: &QueryKey, record: &Arc<ProductRecord>) -> bool {
        let mut state = self.write();
        let Some(live) = state.entries.get_mut(key) else {
            return false;
        };
        match live.records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = Arc::clone(record);
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `key`, returning it to the "not yet fetched" state.
    pub fn remove(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.write().entries.remove(key)
    }

    /// Every cached key, sorted.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keys whose entry currently holds a record with `id`, sorted.
    pub fn keys_containing(&self, id: &ProductId) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self
            .read()
            .entries
            .iter()
            .filter(|(_, entry)| entry.contains(id))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Evict `key`, cancel its in-flight fetch and drop any scheduled refetch.
    ///
    /// Returns whether an entry was evicted.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let mut state = self.write();
        let seq = state.bump_seq();
        state.live_fetch.insert(key.clone(), seq);
        state.scheduled.retain(|k| k != key);
        state.entries.remove(key).is_some()
    }

    /// Discard all cached state.
    pub fn clear(&self) {
        let mut state = self.write();
        let stats = std::mem::take(&mut state.stats);
        let next_seq = state.next_seq;
        *state = CacheState {
            next_seq,
            stats,
            ..CacheState::default()
        };
    }

    // ------------------------------------------------------------------------
    // Fetch sequencing
    // ------------------------------------------------------------------------

    /// Start a fetch for `key`, superseding any fetch already in flight.
    pub fn issue_fetch(&self, key: &QueryKey) -> FetchTicket {
        let mut state = self.write();
        let seq = state.bump_seq();
        state.live_fetch.insert(key.clone(), seq);
        FetchTicket {
            key: key.clone(),
            seq,
        }
    }

    /// Make every outstanding fetch for `key` stale.
    pub fn cancel_fetches(&self, key: &QueryKey) {
        let mut state = self.write();
        if state.live_fetch.contains_key(key) {
            let seq = state.bump_seq();
            state.live_fetch.insert(key.clone(), seq);
        }
    }

    /// Land a fetch response if its ticket is still the live one for its key.
    pub fn apply_fetch(&self, ticket: &FetchTicket, entry: CacheEntry) -> FetchApply {
        let mut state = self.write();
        if state.live_fetch.get(&ticket.key) != Some(&ticket.seq) {
            state.stats.fetches_discarded += 1;
            return FetchApply::Stale { seq: ticket.seq };
        }
        state.live_fetch.remove(&ticket.key);
        state.entries.insert(ticket.key.clone(), entry);
        state.stats.fetches_applied += 1;
        FetchApply::Applied
    }

    /// Queue a refetch of `key`. Scheduling an already queued key is a no-op.
    pub fn schedule_refetch(&self, key: &QueryKey) {
        let mut state = self.write();
        if !state.scheduled.contains(key) {
            state.scheduled.push(key.clone());
        }
    }

    pub fn scheduled_refetches(&self) -> Vec<QueryKey> {
        self.read().scheduled.clone()
    }

    /// Drain the refetch queue.
    pub fn take_scheduled(&self) -> Vec<QueryKey> {
        std::mem::take(&mut self.write().scheduled)
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let state = self.read();
        CacheStats {
            entry_count: state.entries.len() as u64,
            ..state.stats.clone()
        }
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut self.write().stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockroom_test_utils::{fixtures, generators};

    fn seeded() -> RecordCache {
        let cache = RecordCache::new();
        cache.put(QueryKey::all(), CacheEntry::new(fixtures::catalog()));
        cache.put(
            QueryKey::derive("", "all", "WH1"),
            CacheEntry::new(vec![fixtures::catalog()[0].clone()]),
        );
        cache
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = RecordCache::new();
        assert!(cache.is_empty());
        assert!(cache.get(&QueryKey::all()).is_none());
        assert!(cache.scheduled_refetches().is_empty());
    }

    #[test]
    fn test_keys_containing_spans_filter_views() {
        let cache = seeded();
        let keys = cache.keys_containing(&ProductId::new("p1"));
        assert_eq!(keys.len(), 2);
        let keys = cache.keys_containing(&ProductId::new("p2"));
        assert_eq!(keys, vec![QueryKey::all()]);
        assert!(cache.keys_containing(&ProductId::new("nope")).is_empty());
    }

    #[test]
    fn test_lookup_counts_hits_and_misses() {
        let cache = seeded();
        assert!(cache.lookup(&QueryKey::all()).is_some());
        assert!(cache.lookup(&QueryKey::derive("x", "", "")).is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 0.001);
        assert_eq!(stats.entry_count, 2);
    }

    #[test]
    fn test_newer_fetch_supersedes_older() {
        let cache = RecordCache::new();
        let key = QueryKey::all();
        let older = cache.issue_fetch(&key);
        let newer = cache.issue_fetch(&key);
        assert!(newer.seq() > older.seq());

        let fresh = CacheEntry::new(vec![fixtures::product("p1", "WH1", 1, 1)]);
        assert_eq!(cache.apply_fetch(&newer, fresh.clone()), FetchApply::Applied);

        let stale = CacheEntry::new(vec![fixtures::product("p1", "WH1", 99, 99)]);
        assert_eq!(
            cache.apply_fetch(&older, stale),
            FetchApply::Stale { seq: older.seq() }
        );
        assert_eq!(cache.get(&key), Some(fresh));
        assert_eq!(cache.stats().fetches_discarded, 1);
    }

    #[test]
    fn test_ticket_lands_once() {
        let cache = RecordCache::new();
        let key = QueryKey::all();
        let ticket = cache.issue_fetch(&key);
        let entry = CacheEntry::new(fixtures::catalog());
        assert_eq!(cache.apply_fetch(&ticket, entry.clone()), FetchApply::Applied);
        assert!(matches!(
            cache.apply_fetch(&ticket, entry),
            FetchApply::Stale { .. }
        ));
    }

    #[test]
    fn test_cancel_makes_outstanding_fetch_stale() {
        let cache = RecordCache::new();
        let key = QueryKey::all();
        let ticket = cache.issue_fetch(&key);
        cache.cancel_fetches(&key);
        assert!(matches!(
            cache.apply_fetch(&ticket, CacheEntry::new(vec![])),
            FetchApply::Stale { .. }
        ));
        assert!(!cache.contains_key(&key));
    }

    #[test]
    fn test_invalidate_evicts_and_unschedules() {
        let cache = seeded();
        let key = QueryKey::all();
        cache.schedule_refetch(&key);
        let ticket = cache.issue_fetch(&key);

        assert!(cache.invalidate(&key));
        assert!(!cache.contains_key(&key));
        assert!(cache.scheduled_refetches().is_empty());
        assert!(matches!(
            cache.apply_fetch(&ticket, CacheEntry::new(vec![])),
            FetchApply::Stale { .. }
        ));
        assert!(!cache.invalidate(&key));
    }

    #[test]
    fn test_schedule_is_deduplicated_and_drained() {
        let cache = RecordCache::new();
        let a = QueryKey::all();
        let b = QueryKey::derive("bolt", "", "");
        cache.schedule_refetch(&a);
        cache.schedule_refetch(&b);
        cache.schedule_refetch(&a);
        assert_eq!(cache.take_scheduled(), vec![a, b]);
        assert!(cache.take_scheduled().is_empty());
    }

    #[test]
    fn test_clear_discards_entries() {
        let cache = seeded();
        assert_eq!(cache.keys()[0], QueryKey::all());
        cache.schedule_refetch(&QueryKey::all());
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        assert!(cache.scheduled_refetches().is_empty());
    }

    #[test]
    fn test_entry_accessors() {
        let entry = CacheEntry::new(fixtures::catalog());
        assert_eq!(entry.len(), 4);
        assert!(entry.contains(&ProductId::new("p3")));
        assert_eq!(entry.get(&ProductId::new("p2")).map(|r| r.stock), Some(20));
        assert_eq!(entry.summary().total_demand, 120);
        assert_eq!(entry.to_records(), fixtures::catalog());
    }

    #[test]
    fn test_replace_record_swaps_only_matching_id() {
        let cache = seeded();
        let key = QueryKey::all();
        let before = cache.get(&key).unwrap();
        let restored = Arc::new(fixtures::product("p2", "WH2", 5, 5));

        assert!(cache.replace_record(&key, &restored));
        let live = cache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&live.records()[1], &restored));
        for i in [0, 2, 3] {
            assert!(Arc::ptr_eq(&live.records()[i], &before.records()[i]));
        }
        // The entry handed out earlier is a separate value.
        assert_eq!(before.records()[1].stock, 20);
    }

    #[test]
    fn test_replace_record_skips_missing_entry_or_id() {
        let cache = seeded();
        let stranger = Arc::new(fixtures::product("p9", "WH1", 1, 1));
        assert!(!cache.replace_record(&QueryKey::all(), &stranger));
        let p1 = Arc::new(fixtures::p1());
        assert!(!cache.replace_record(&QueryKey::derive("x", "", ""), &p1));
        assert_eq!(cache.get(&QueryKey::all()).unwrap().len(), 4);
    }

    proptest! {
        #[test]
        fn invalidate_makes_any_outstanding_ticket_stale(key in generators::arb_query_key()) {
            let cache = RecordCache::new();
            let ticket = cache.issue_fetch(&key);
            prop_assert_eq!(ticket.key(), &key);
            cache.invalidate(&key);
            let result = cache.apply_fetch(&ticket, CacheEntry::new(fixtures::catalog()));
            prop_assert_eq!(result, FetchApply::Stale { seq: ticket.seq() });
            prop_assert!(!cache.contains_key(&key));
        }
    }
}
