//! Mutation executor.
//!
//! Runs one intent through the protocol: validate, project onto every
//! cached entry holding the target record, call the remote service once,
//! then settle each projected entry exactly once. No retries.

use chrono::Utc;
use std::sync::Arc;
use stockroom_core::{
    InventoryService, MutationIntent, ProductId, ProductRecord, RemoteError, RemoteResult,
    StockroomError, StockroomResult,
};
use tracing::Instrument;

use crate::pending::{AffectedEntry, MutationId, PendingMutation, PendingRegistry};
use crate::projector::project;
use crate::reconciler::{PhaseEvent, Reconciler, Settlement};
use crate::snapshot::SnapshotManager;
use crate::store::RecordCache;

/// Result of [`MutationExecutor::submit`].
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    /// `None` when the intent was rejected before touching the cache.
    pub mutation_id: Option<MutationId>,
    pub result: StockroomResult<ProductRecord>,
    pub settlements: Vec<Settlement>,
}

impl MutationOutcome {
    pub fn into_result(self) -> StockroomResult<ProductRecord> {
        self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Submits mutation intents against a remote [`InventoryService`].
///
/// Intents on different records never wait on each other. Intents on the
/// same record project in submission order and may settle in any order.
pub struct MutationExecutor<S> {
    service: Arc<S>,
    cache: Arc<RecordCache>,
    snapshots: SnapshotManager,
    pending: Arc<PendingRegistry>,
    reconciler: Reconciler,
}

impl<S: InventoryService> MutationExecutor<S> {
    pub fn new(service: Arc<S>, cache: Arc<RecordCache>) -> Self {
        let pending = Arc::new(PendingRegistry::new());
        Self {
            service,
            snapshots: SnapshotManager::new(Arc::clone(&cache)),
            reconciler: Reconciler::new(Arc::clone(&cache), Arc::clone(&pending)),
            cache,
            pending,
        }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.pending
    }

    /// Whether any mutation on `id` is in flight.
    pub fn is_pending(&self, id: &ProductId) -> bool {
        self.pending.is_pending(id)
    }

    /// Run `intent` and return the server's record or the error.
    #[tracing::instrument(
        skip_all,
        fields(operation = intent.operation(), product = %intent.target())
    )]
    pub async fn execute(&self, intent: MutationIntent) -> StockroomResult<ProductRecord> {
        self.submit(intent).await.into_result()
    }

    /// Run `intent` and report what happened to every affected entry.
    pub async fn submit(&self, intent: MutationIntent) -> MutationOutcome {
        if let Err(err) = intent.validate() {
            tracing::debug!(
                operation = intent.operation(),
                error = %err,
                "Rejected invalid mutation"
            );
            return MutationOutcome {
                mutation_id: None,
                result: Err(StockroomError::Validation(err)),
                settlements: Vec::new(),
            };
        }

        let mutation = self.begin(intent);
        let mutation_id = mutation.mutation_id;
        let span = tracing::debug_span!(
            "mutation",
            mutation_id = %mutation_id,
            operation = mutation.intent.operation(),
            product = %mutation.target(),
            entries = mutation.affected.len(),
        );

        async move {
            let intent = mutation.intent.clone();
            let guard = InFlight {
                reconciler: &self.reconciler,
                mutation: Some(mutation),
            };
            let response = self.dispatch(&intent).await;
            let settlements = guard.finish(response.as_ref());
            tracing::info!(ok = response.is_ok(), "Mutation settled");
            MutationOutcome {
                mutation_id: Some(mutation_id),
                result: response.map_err(StockroomError::from),
                settlements,
            }
        }
        .instrument(span)
        .await
    }

    /// Snapshot and project every cached entry holding the target record.
    fn begin(&self, intent: MutationIntent) -> PendingMutation {
        let _section = self.cache.exclusive();
        let mutation_id = self.pending.register(intent.target());
        let affected = self
            .cache
            .keys_containing(intent.target())
            .into_iter()
            .map(|key| {
                // A refetch issued before this projection would land stale data.
                self.cache.cancel_fetches(&key);
                let snapshot = self.snapshots.begin_mutation(&key);
                if let Some(current) = snapshot.entry() {
                    self.cache.put(key.clone(), project(current, &intent));
                    self.cache.record(|stats| stats.projections += 1);
                    tracing::debug!(
                        mutation_id = %mutation_id,
                        product = %intent.target(),
                        key = %key,
                        "Projected"
                    );
                }
                let mut entry = AffectedEntry::new(key, snapshot);
                entry.advance(PhaseEvent::Projected);
                entry
            })
            .collect();
        PendingMutation {
            mutation_id,
            intent,
            affected,
            started_at: Utc::now(),
        }
    }

    async fn dispatch(&self, intent: &MutationIntent) -> RemoteResult<ProductRecord> {
        match intent {
            MutationIntent::UpdateDemand { id, demand } => {
                self.service.update_demand(id, *demand).await
            }
            MutationIntent::TransferStock { id, from, to, qty } => {
                self.service.transfer_stock(id, from, to, *qty).await
            }
        }
    }
}

/// Settles a mutation as a network failure if its future is dropped while
/// the remote call is outstanding.
struct InFlight<'a> {
    reconciler: &'a Reconciler,
    mutation: Option<PendingMutation>,
}

impl InFlight<'_> {
    fn finish(mut self, result: Result<&ProductRecord, &RemoteError>) -> Vec<Settlement> {
        match self.mutation.take() {
            Some(mutation) => self.reconciler.settle(mutation, result),
            None => Vec::new(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mutation) = self.mutation.take() {
            let err = RemoteError::network("mutation abandoned before the response arrived");
            tracing::warn!(mutation_id = %mutation.mutation_id, "Mutation abandoned");
            self.reconciler.settle(mutation, Err(&err));
        }
    }
}
