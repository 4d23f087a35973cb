//! Optimistic projection of mutation intents onto cache entries.
//!
//! A projection is a prediction. It never clamps stock at zero and never
//! checks a transfer against available stock; the refetch that follows
//! settlement restores authoritative values.

use std::sync::Arc;
use stockroom_core::{MutationIntent, ProductRecord};

use crate::store::CacheEntry;

/// Predict the entry after `intent` is applied.
///
/// Total and pure: `entry` is not modified and an entry without the target
/// record is returned unchanged. Record order is preserved. Only the matched
/// record is replaced with a new allocation; every other record keeps its
/// `Arc` identity.
pub fn project(entry: &CacheEntry, intent: &MutationIntent) -> CacheEntry {
    let target = intent.target();
    if !entry.contains(target) {
        return entry.clone();
    }
    let records = entry
        .records()
        .iter()
        .map(|record| {
            if &record.id == target {
                Arc::new(project_record(record, intent))
            } else {
                Arc::clone(record)
            }
        })
        .collect();
    CacheEntry::from_shared(records, entry.fetched_at())
}

/// Apply `intent` to a single record.
///
/// Status is left as last reported by the server.
pub fn project_record(record: &ProductRecord, intent: &MutationIntent) -> ProductRecord {
    let mut next = record.clone();
    match intent {
        MutationIntent::UpdateDemand { demand, .. } => {
            next.demand = *demand;
        }
        MutationIntent::TransferStock { to, qty, .. } => {
            next.warehouse = to.clone();
            next.stock = record.stock.saturating_sub(*qty);
        }
    }
    next
}
