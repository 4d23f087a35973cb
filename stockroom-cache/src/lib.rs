//! Optimistic record cache with correctness contracts.
//!
//! This crate is the client-side consistency core of the dashboard. It
//! keeps the last known product lists per [`QueryKey`], applies predicted
//! mutations before the server confirms them, and converges back to
//! authoritative data afterwards.
//!
//! # Protocol
//!
//! 1. [`MutationExecutor`] finds every cached entry containing the target
//!    record, snapshots it through [`SnapshotManager`] and writes the
//!    [`project`]ed entry back into the [`RecordCache`].
//! 2. The remote call is issued; this is the only suspension point.
//! 3. The [`Reconciler`] settles every affected entry exactly once: on
//!    success the projection stays visible, on failure the target record is
//!    restored from the snapshot unless a newer mutation for the same record
//!    is still in flight. Either way a refetch of the entry is scheduled.
//! 4. [`ProductQueries`] runs scheduled refetches. Each fetch carries a
//!    sequence number and only the latest one issued for a key may land.
//!
//! Projections are predictions (no stock floor, no server validation) and
//! are never treated as authoritative.
//!
//! # Concurrency
//!
//! Cache reads and writes are synchronous point updates behind a short
//! lock that is never held across an `.await`. Interleaving only happens
//! at remote calls, so no reader can observe a half-applied projection.

pub mod executor;
pub mod pending;
pub mod projector;
pub mod query;
pub mod reconciler;
pub mod snapshot;
pub mod store;

pub use executor::{MutationExecutor, MutationOutcome};
pub use pending::{AffectedEntry, MutationId, PendingMutation, PendingRegistry};
pub use projector::{project, project_record};
pub use query::{ProductQueries, RefetchOutcome};
pub use reconciler::{MutationPhase, PhaseEvent, Reconciler, Settlement};
pub use snapshot::{Snapshot, SnapshotManager};
pub use store::{CacheEntry, CacheStats, FetchApply, FetchTicket, RecordCache};

pub use stockroom_core::QueryKey;
