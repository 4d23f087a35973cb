//! Settlement of optimistic mutations.

use std::sync::Arc;
use stockroom_core::{ProductRecord, QueryKey, RemoteError};
use tracing::{debug, warn};

use crate::pending::{AffectedEntry, MutationId, PendingMutation, PendingRegistry};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::store::RecordCache;

/// Phase of one mutation on one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationPhase {
    Idle,
    /// Projection written, remote call outstanding.
    Optimistic,
    Reconciled,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Projected,
    Succeeded,
    Failed,
}

impl MutationPhase {
    /// The phase after `event`, or `None` if the transition is not allowed.
    pub fn next(self, event: PhaseEvent) -> Option<Self> {
        match (self, event) {
            (Self::Idle, PhaseEvent::Projected) => Some(Self::Optimistic),
            (Self::Optimistic, PhaseEvent::Succeeded) => Some(Self::Reconciled),
            (Self::Optimistic, PhaseEvent::Failed) => Some(Self::RolledBack),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Reconciled | Self::RolledBack)
    }
}

/// What settlement did to one affected entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub mutation_id: MutationId,
    pub key: QueryKey,
    pub phase: MutationPhase,
    /// The failure left a newer projection in place instead of restoring.
    pub rollback_suppressed: bool,
    pub refetch_scheduled: bool,
}

/// Decides, per affected entry, whether to keep or undo a projection.
///
/// Every settled entry gets a refetch scheduled so the cache converges on
/// server state; the projection stays visible until that refetch lands.
#[derive(Debug, Clone)]
pub struct Reconciler {
    cache: Arc<RecordCache>,
    snapshots: SnapshotManager,
    pending: Arc<PendingRegistry>,
}

impl Reconciler {
    pub fn new(cache: Arc<RecordCache>, pending: Arc<PendingRegistry>) -> Self {
        Self {
            snapshots: SnapshotManager::new(Arc::clone(&cache)),
            cache,
            pending,
        }
    }

    pub fn on_success(&self, mutation_id: MutationId, entry: &mut AffectedEntry) -> Settlement {
        let advanced = entry.advance(PhaseEvent::Succeeded);
        if advanced {
            let snapshot = std::mem::replace(&mut entry.snapshot, Snapshot::Absent);
            self.snapshots.commit(&entry.key, snapshot);
            self.cache.schedule_refetch(&entry.key);
        }
        Settlement {
            mutation_id,
            key: entry.key.clone(),
            phase: entry.phase,
            rollback_suppressed: false,
            refetch_scheduled: advanced,
        }
    }

    pub fn on_failure(
        &self,
        mutation: &PendingMutation,
        entry: &mut AffectedEntry,
    ) -> Settlement {
        let mutation_id = mutation.mutation_id;
        let advanced = entry.advance(PhaseEvent::Failed);
        let mut suppressed = false;
        if advanced {
            if self.pending.has_newer(mutation.target(), mutation_id) {
                debug!(
                    mutation_id = %mutation_id,
                    product = %mutation.target(),
                    key = %entry.key,
                    "Newer mutation in flight, relying on refetch"
                );
                self.cache.record(|stats| stats.suppressed_rollbacks += 1);
                suppressed = true;
            } else {
                warn!(
                    mutation_id = %mutation_id,
                    product = %mutation.target(),
                    key = %entry.key,
                    "Rolling back projection"
                );
                self.snapshots
                    .rollback_record(&entry.key, &entry.snapshot, mutation.target());
            }
            self.cache.schedule_refetch(&entry.key);
        }
        Settlement {
            mutation_id,
            key: entry.key.clone(),
            phase: entry.phase,
            rollback_suppressed: suppressed,
            refetch_scheduled: advanced,
        }
    }

    /// Settle every entry `mutation` projected onto, then mark it no longer
    /// in flight.
    pub fn settle(
        &self,
        mut mutation: PendingMutation,
        result: Result<&ProductRecord, &RemoteError>,
    ) -> Vec<Settlement> {
        let _section = self.cache.exclusive();
        let mut affected = std::mem::take(&mut mutation.affected);
        let settlements: Vec<Settlement> = match result {
            Ok(_) => affected
                .iter_mut()
                .map(|entry| self.on_success(mutation.mutation_id, entry))
                .collect(),
            Err(err) => {
                warn!(
                    mutation_id = %mutation.mutation_id,
                    operation = mutation.intent.operation(),
                    product = %mutation.target(),
                    error = %err,
                    "Mutation failed"
                );
                affected
                    .iter_mut()
                    .map(|entry| self.on_failure(&mutation, entry))
                    .collect()
            }
        };
        self.pending.release(mutation.target(), mutation.mutation_id);
        settlements
    }
}
