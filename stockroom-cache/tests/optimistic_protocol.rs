//! End-to-end behavior of the optimistic mutation protocol against the
//! in-memory inventory service.

use std::sync::Arc;
use std::time::Duration;

use stockroom_cache::{
    MutationExecutor, MutationPhase, ProductQueries, QueryKey, RecordCache, RefetchOutcome,
};
use stockroom_test_utils::{
    assertions, fixtures, GatedOp, MockInventory, MutationIntent, ProductId, ProductRecord,
    RemoteError,
};

struct Harness {
    service: Arc<MockInventory>,
    cache: Arc<RecordCache>,
    executor: MutationExecutor<MockInventory>,
    queries: ProductQueries<MockInventory>,
}

async fn harness(records: Vec<ProductRecord>) -> Harness {
    let service = Arc::new(MockInventory::with_products(records));
    let cache = Arc::new(RecordCache::new());
    let executor = MutationExecutor::new(Arc::clone(&service), Arc::clone(&cache));
    let queries = ProductQueries::new(Arc::clone(&service), Arc::clone(&cache));
    queries.fetch(&QueryKey::all()).await.unwrap();
    Harness {
        service,
        cache,
        executor,
        queries,
    }
}

/// Yield to the other joined futures until `ready` holds.
async fn until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        tokio::task::yield_now().await;
    }
}

fn in_flight(h: &Harness, id: &str) -> usize {
    h.executor.pending().in_flight(&ProductId::new(id)).len()
}

fn cached(h: &Harness, id: &str) -> ProductRecord {
    let entry = h.cache.get(&QueryKey::all()).unwrap();
    entry.get(&ProductId::new(id)).unwrap().as_ref().clone()
}

#[tokio::test]
async fn demand_update_is_visible_immediately_and_refetched_after_success() {
    let h = harness(vec![fixtures::p1()]).await;
    let gate = h.service.gate_next(GatedOp::Mutation);

    let (result, ()) = tokio::join!(
        h.executor.execute(MutationIntent::update_demand("p1", 12)),
        async {
            until(|| h.service.mutation_calls() == 1).await;
            assert_eq!(cached(&h, "p1").demand, 12);
            assert!(h.cache.scheduled_refetches().is_empty());
            gate.release();
        }
    );

    assert_eq!(result.unwrap().demand, 12);
    assert_eq!(h.cache.scheduled_refetches(), vec![QueryKey::all()]);
    assert_eq!(cached(&h, "p1").demand, 12);

    h.queries.run_scheduled().await;
    assert_eq!(cached(&h, "p1").demand, 12);
}

#[tokio::test]
async fn rejected_transfer_reverts_exactly() {
    let h = harness(vec![fixtures::p1()]).await;
    h.service.fail_next(
        GatedOp::Mutation,
        RemoteError::server("transferStock", "insufficient stock"),
    );
    let gate = h.service.gate_next(GatedOp::Mutation);

    let (result, ()) = tokio::join!(
        h.executor.execute(MutationIntent::transfer_stock("p1", "WH1", "WH2", 30)),
        async {
            until(|| h.service.mutation_calls() == 1).await;
            let projected = cached(&h, "p1");
            assert_eq!(projected.stock, 70);
            assert_eq!(projected.warehouse, "WH2");
            gate.release();
        }
    );

    assertions::assert_server_error(&result);
    assert_eq!(cached(&h, "p1"), fixtures::p1());
    assert_eq!(h.cache.scheduled_refetches(), vec![QueryKey::all()]);
}

#[tokio::test]
async fn disjoint_records_settle_independently() {
    let h = harness(vec![fixtures::p1(), fixtures::p2()]).await;
    let gate_p1 = h.service.gate_next(GatedOp::Mutation);
    let gate_p2 = h.service.gate_next(GatedOp::Mutation);

    let (p1, p2, ()) = tokio::join!(
        h.executor.submit(MutationIntent::update_demand("p1", 7)),
        // The server rejects moving more than the 20 units p2 holds.
        h.executor.submit(MutationIntent::transfer_stock("p2", "WH2", "WH3", 50)),
        async {
            until(|| h.service.mutation_calls() == 2).await;
            assert_eq!(cached(&h, "p1").demand, 7);
            assert_eq!(cached(&h, "p2").stock, -30);
            gate_p2.release();
            until(|| in_flight(&h, "p2") == 0).await;
            assert_eq!(cached(&h, "p2"), fixtures::p2());
            assert_eq!(cached(&h, "p1").demand, 7);
            gate_p1.release();
        }
    );

    assert!(p1.is_ok());
    assertions::assert_server_error(&p2.result);
    assert_eq!(p1.settlements[0].phase, MutationPhase::Reconciled);
    assert_eq!(p2.settlements[0].phase, MutationPhase::RolledBack);
    assert_eq!(cached(&h, "p1").demand, 7);
    assert_eq!(cached(&h, "p2"), fixtures::p2());
}

#[tokio::test]
async fn mutation_on_uncached_record_creates_nothing() {
    let service = Arc::new(MockInventory::with_products(vec![fixtures::p1()]));
    let cache = Arc::new(RecordCache::new());
    let executor = MutationExecutor::new(Arc::clone(&service), Arc::clone(&cache));

    let outcome = executor
        .submit(MutationIntent::update_demand("p404", 3))
        .await;
    assertions::assert_server_error(&outcome.result);
    assert!(outcome.settlements.is_empty());
    assert!(cache.is_empty());
    assert!(cache.scheduled_refetches().is_empty());
    assert!(!executor.is_pending(&ProductId::new("p404")));
}

#[tokio::test]
async fn mutation_on_record_outside_cached_views_is_noop() {
    let h = harness(vec![fixtures::p1()]).await;
    let before = h.cache.get(&QueryKey::all());

    let outcome = h
        .executor
        .submit(MutationIntent::update_demand("p404", 3))
        .await;
    assert!(outcome.settlements.is_empty());
    assert_eq!(h.cache.get(&QueryKey::all()), before);
    assert_eq!(h.cache.len(), 1);
}

async fn run_a_then_b(release_b_first: bool) -> Harness {
    let h = harness(vec![fixtures::p1()]).await;
    let gate_a = h.service.gate_next(GatedOp::Mutation);
    let gate_b = h.service.gate_next(GatedOp::Mutation);

    let (a, b, ()) = tokio::join!(
        h.executor.execute(MutationIntent::update_demand("p1", 10)),
        h.executor.execute(MutationIntent::update_demand("p1", 20)),
        async {
            until(|| h.service.mutation_calls() == 2).await;
            assert_eq!(cached(&h, "p1").demand, 20);
            let (first, second) = if release_b_first {
                (gate_b, gate_a)
            } else {
                (gate_a, gate_b)
            };
            first.release();
            until(|| in_flight(&h, "p1") == 1).await;
            assert_eq!(cached(&h, "p1").demand, 20);
            second.release();
        }
    );
    assert!(a.is_ok() && b.is_ok());
    h
}

#[tokio::test]
async fn later_intent_wins_when_it_settles_first() {
    let h = run_a_then_b(true).await;
    assert_eq!(cached(&h, "p1").demand, 20);
    h.queries.run_scheduled().await;
    assert_eq!(cached(&h, "p1").demand, 20);
}

#[tokio::test]
async fn later_intent_wins_when_it_settles_last() {
    let h = run_a_then_b(false).await;
    assert_eq!(cached(&h, "p1").demand, 20);
    h.queries.run_scheduled().await;
    assert_eq!(cached(&h, "p1").demand, 20);
}

#[tokio::test]
async fn failed_older_intent_does_not_clobber_newer_projection() {
    let h = harness(vec![fixtures::p1()]).await;
    h.service
        .fail_next(GatedOp::Mutation, RemoteError::network("connection reset"));
    let gate_a = h.service.gate_next(GatedOp::Mutation);
    let gate_b = h.service.gate_next(GatedOp::Mutation);

    let (a, b, ()) = tokio::join!(
        h.executor.submit(MutationIntent::update_demand("p1", 10)),
        h.executor.submit(MutationIntent::update_demand("p1", 20)),
        async {
            until(|| h.service.mutation_calls() == 2).await;
            gate_a.release();
            until(|| in_flight(&h, "p1") == 1).await;
            assert_eq!(cached(&h, "p1").demand, 20);
            gate_b.release();
        }
    );

    assertions::assert_network_error(&a.result);
    assert!(a.settlements[0].rollback_suppressed);
    assert!(b.is_ok());
    h.queries.run_scheduled().await;
    assert_eq!(cached(&h, "p1").demand, 20);
    assert_eq!(h.service.product("p1").unwrap().demand, 20);
}

#[tokio::test]
async fn failed_newer_intent_restores_its_own_snapshot() {
    let h = harness(vec![fixtures::p1()]).await;
    let gate_a = h.service.gate_next(GatedOp::Mutation);
    let gate_b = h.service.gate_next(GatedOp::Mutation);

    let (a, b, ()) = tokio::join!(
        h.executor.submit(MutationIntent::update_demand("p1", 10)),
        h.executor
            .submit(MutationIntent::transfer_stock("p1", "WH1", "WH2", 1000)),
        async {
            until(|| h.service.mutation_calls() == 2).await;
            assert_eq!(cached(&h, "p1").stock, -900);
            gate_b.release();
            until(|| in_flight(&h, "p1") == 1).await;
            let restored = cached(&h, "p1");
            assert_eq!(restored.demand, 10);
            assert_eq!(restored.stock, 100);
            assert_eq!(restored.warehouse, "WH1");
            gate_a.release();
        }
    );

    assert!(a.is_ok());
    assert!(!b.settlements[0].rollback_suppressed);
    h.queries.run_scheduled().await;
    let settled = cached(&h, "p1");
    assert_eq!((settled.demand, settled.stock), (10, 100));
}

#[tokio::test]
async fn abandoned_mutation_still_settles() {
    let h = harness(vec![fixtures::p1()]).await;
    let _gate = h.service.gate_next(GatedOp::Mutation);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        h.executor.execute(MutationIntent::update_demand("p1", 12)),
    )
    .await;

    assert!(abandoned.is_err());
    assert_eq!(cached(&h, "p1").demand, 5);
    assert!(!h.executor.is_pending(&ProductId::new("p1")));
    assert_eq!(h.cache.scheduled_refetches(), vec![QueryKey::all()]);
}

#[tokio::test]
async fn refetch_issued_before_mutation_cannot_overwrite_projection() {
    let h = harness(vec![fixtures::p1()]).await;
    let gate = h.service.gate_next(GatedOp::ListProducts);
    let key = QueryKey::all();

    let (refetch, ()) = tokio::join!(h.queries.refetch(&key), async {
        until(|| h.service.calls().len() == 2).await;
        h.executor
            .execute(MutationIntent::update_demand("p1", 12))
            .await
            .unwrap();
        gate.release();
    });

    match refetch.unwrap() {
        RefetchOutcome::Discarded { entry, .. } => {
            assert_eq!(entry.records()[0].demand, 5);
        }
        RefetchOutcome::Applied(_) => panic!("stale refetch was applied"),
    }
    assert_eq!(cached(&h, "p1").demand, 12);
}

#[tokio::test]
async fn projection_reaches_every_filter_view() {
    let h = harness(fixtures::catalog()).await;
    let wh1 = QueryKey::derive("", "all", "WH1");
    let bolts = QueryKey::derive("bolt", "", "");
    h.queries.fetch(&wh1).await.unwrap();
    h.queries.fetch(&bolts).await.unwrap();

    h.service.fail_next(GatedOp::Mutation, RemoteError::network("down"));
    let gate = h.service.gate_next(GatedOp::Mutation);
    let (outcome, ()) = tokio::join!(
        h.executor.submit(MutationIntent::transfer_stock("p1", "WH1", "WH3", 10)),
        async {
            until(|| h.service.mutation_calls() == 1).await;
            for key in [QueryKey::all(), wh1.clone(), bolts.clone()] {
                let entry = h.cache.get(&key).unwrap();
                assert_eq!(entry.get(&ProductId::new("p1")).unwrap().stock, 90);
            }
            gate.release();
        }
    );

    assert_eq!(outcome.settlements.len(), 3);
    for key in [QueryKey::all(), wh1, bolts] {
        let entry = h.cache.get(&key).unwrap();
        assert_eq!(entry.get(&ProductId::new("p1")).unwrap().stock, 100);
    }
}

#[tokio::test]
async fn failure_does_not_undo_neighbouring_projection() {
    let h = harness(vec![fixtures::p1(), fixtures::p2()]).await;
    h.service
        .fail_next(GatedOp::Mutation, RemoteError::network("connection reset"));
    let gate_p1 = h.service.gate_next(GatedOp::Mutation);
    let gate_p2 = h.service.gate_next(GatedOp::Mutation);

    let (p1, p2, ()) = tokio::join!(
        h.executor.submit(MutationIntent::update_demand("p1", 7)),
        h.executor.submit(MutationIntent::update_demand("p2", 11)),
        async {
            until(|| h.service.mutation_calls() == 2).await;
            gate_p1.release();
            until(|| in_flight(&h, "p1") == 0).await;
            assert_eq!(cached(&h, "p1"), fixtures::p1());
            assert_eq!(cached(&h, "p2").demand, 11);
            gate_p2.release();
        }
    );

    assertions::assert_network_error(&p1.result);
    assert!(p2.is_ok());
    assert_eq!(cached(&h, "p1").demand, 5);
    assert_eq!(cached(&h, "p2").demand, 11);
}
