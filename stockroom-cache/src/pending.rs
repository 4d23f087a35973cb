//! Registry of in-flight mutations.
//!
//! Several intents for the same record may be in flight at once. Each one
//! holds only the snapshots taken at its own start; the registry answers
//! whether a newer one exists so a late failure does not clobber a newer
//! projection.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use stockroom_core::{MutationIntent, ProductId, QueryKey, Timestamp};

use crate::reconciler::{MutationPhase, PhaseEvent};
use crate::snapshot::Snapshot;

/// Issuance-ordered mutation identifier. Larger means newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(u64);

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// One cache entry touched by a mutation, with its own phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedEntry {
    pub key: QueryKey,
    pub snapshot: Snapshot,
    pub phase: MutationPhase,
}

impl AffectedEntry {
    pub fn new(key: QueryKey, snapshot: Snapshot) -> Self {
        Self {
            key,
            snapshot,
            phase: MutationPhase::Idle,
        }
    }

    /// Apply `event`. Returns false and leaves the phase as is when the
    /// transition is not allowed.
    pub fn advance(&mut self, event: PhaseEvent) -> bool {
        match self.phase.next(event) {
            Some(next) => {
                self.phase = next;
                true
            }
            None => false,
        }
    }
}

/// An intent in flight together with the entries it projected onto.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub mutation_id: MutationId,
    pub intent: MutationIntent,
    pub affected: Vec<AffectedEntry>,
    pub started_at: Timestamp,
}

impl PendingMutation {
    pub fn target(&self) -> &ProductId {
        self.intent.target()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    in_flight: HashMap<ProductId, BTreeSet<MutationId>>,
}

/// Tracks which mutations are in flight, per record id.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    state: Mutex<RegistryState>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id for a new mutation on `target` and mark it in flight.
    pub fn register(&self, target: &ProductId) -> MutationId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = MutationId(state.next_id);
        state.in_flight.entry(target.clone()).or_default().insert(id);
        id
    }

    /// Mark `id` settled. Releasing an unknown id is a no-op.
    pub fn release(&self, target: &ProductId, id: MutationId) {
        let mut state = self.lock();
        if let Some(ids) = state.in_flight.get_mut(target) {
            ids.remove(&id);
            if ids.is_empty() {
                state.in_flight.remove(target);
            }
        }
    }

    /// Whether a mutation on `target` issued after `id` is still in flight.
    pub fn has_newer(&self, target: &ProductId, id: MutationId) -> bool {
        self.lock()
            .in_flight
            .get(target)
            .and_then(|ids| ids.last())
            .is_some_and(|latest| *latest > id)
    }

    pub fn is_pending(&self, target: &ProductId) -> bool {
        self.lock().in_flight.contains_key(target)
    }

    pub fn in_flight(&self, target: &ProductId) -> Vec<MutationId> {
        self.lock()
            .in_flight
            .get(target)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of mutations in flight across all records.
    pub fn total(&self) -> usize {
        self.lock().in_flight.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let registry = PendingRegistry::new();
        let a = registry.register(&ProductId::new("p1"));
        let b = registry.register(&ProductId::new("p2"));
        assert!(b > a);
        assert_eq!(registry.total(), 2);
    }

    #[test]
    fn test_has_newer_is_per_record() {
        let registry = PendingRegistry::new();
        let p1 = ProductId::new("p1");
        let p2 = ProductId::new("p2");
        let a = registry.register(&p1);
        let _other = registry.register(&p2);
        assert!(!registry.has_newer(&p1, a));

        let b = registry.register(&p1);
        assert!(registry.has_newer(&p1, a));
        assert!(!registry.has_newer(&p1, b));

        registry.release(&p1, b);
        assert!(!registry.has_newer(&p1, a));
    }

    #[test]
    fn test_release_clears_pending_flag() {
        let registry = PendingRegistry::new();
        let p1 = ProductId::new("p1");
        let a = registry.register(&p1);
        assert!(registry.is_pending(&p1));
        registry.release(&p1, a);
        registry.release(&p1, a);
        assert!(!registry.is_pending(&p1));
        assert!(registry.in_flight(&p1).is_empty());
    }

    #[test]
    fn test_affected_entry_rejects_invalid_transition() {
        let mut entry = AffectedEntry::new(QueryKey::all(), Snapshot::Absent);
        assert!(!entry.advance(PhaseEvent::Succeeded));
        assert_eq!(entry.phase, MutationPhase::Idle);
        assert!(entry.advance(PhaseEvent::Projected));
        assert!(entry.advance(PhaseEvent::Failed));
        assert_eq!(entry.phase, MutationPhase::RolledBack);
        assert!(!entry.advance(PhaseEvent::Succeeded));
    }
}
