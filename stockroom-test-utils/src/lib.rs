//! Stockroom Test Utilities
//!
//! Shared test infrastructure for the Stockroom workspace:
//! - `MockInventory`, an in-memory remote service with failure injection
//!   and per-call gates for controlling response order
//! - Proptest generators for records, intents and query keys
//! - Fixtures for the common dashboard scenarios
//! - Assertions over `StockroomResult`

pub use stockroom_core::{
    DateRange, InventoryService, Kpi, MutationIntent, ProductFilters, ProductId, ProductRecord,
    ProductStatus, QueryKey, RemoteError, RemoteResult, StockroomError, StockroomResult,
    ValidationError,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

// ============================================================================
// MOCK INVENTORY SERVICE
// ============================================================================

/// Which class of remote call a gate or injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedOp {
    /// `update_demand` and `transfer_stock`.
    Mutation,
    ListProducts,
    ListKpis,
}

/// A recorded remote call, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListProducts(QueryKey),
    ListKpis(DateRange),
    UpdateDemand {
        id: ProductId,
        demand: u64,
    },
    TransferStock {
        id: ProductId,
        from: String,
        to: String,
        qty: i64,
    },
}

/// Holds back the response of one remote call until released.
///
/// Dropping a gate releases it as well.
#[derive(Debug)]
pub struct Gate {
    tx: oneshot::Sender<()>,
}

impl Gate {
    pub fn release(self) {
        let _ = self.tx.send(());
    }
}

#[derive(Default)]
struct MockState {
    products: Vec<ProductRecord>,
    kpis: HashMap<DateRange, Vec<Kpi>>,
    failures: HashMap<GatedOp, VecDeque<RemoteError>>,
    gates: HashMap<GatedOp, VecDeque<oneshot::Receiver<()>>>,
    calls: Vec<Call>,
}

/// In-memory inventory service.
///
/// Mutations are applied to the server-side table the moment the call
/// arrives, like a real server processing requests in receipt order; only
/// the response is delayed when a gate is queued for the call.
#[derive(Default)]
pub struct MockInventory {
    state: Mutex<MockState>,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<ProductRecord>) -> Self {
        let inventory = Self::new();
        inventory.lock().products = products;
        inventory
    }

    pub fn set_kpis(&self, range: DateRange, kpis: Vec<Kpi>) {
        self.lock().kpis.insert(range, kpis);
    }

    /// Make the next call of `op` fail with `error` (server state untouched).
    pub fn fail_next(&self, op: GatedOp, error: RemoteError) {
        self.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Hold back the response of the next call of `op` until the gate is released.
    pub fn gate_next(&self, op: GatedOp) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.lock().gates.entry(op).or_default().push_back(rx);
        Gate { tx }
    }

    /// Server-side copy of a product.
    pub fn product(&self, id: &str) -> Option<ProductRecord> {
        self.lock()
            .products
            .iter()
            .find(|p| p.id.as_str() == id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::UpdateDemand { .. } | Call::TransferStock { .. }))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, decide its result and take its gate in one step.
    fn arrive<T>(
        &self,
        call: Call,
        op: GatedOp,
        respond: impl FnOnce(&mut MockState) -> RemoteResult<T>,
    ) -> (RemoteResult<T>, Option<oneshot::Receiver<()>>) {
        let mut state = self.lock();
        state.calls.push(call);
        let injected = state.failures.get_mut(&op).and_then(VecDeque::pop_front);
        let result = match injected {
            Some(err) => Err(err),
            None => respond(&mut *state),
        };
        let gate = state.gates.get_mut(&op).and_then(VecDeque::pop_front);
        (result, gate)
    }
}

async fn wait(gate: Option<oneshot::Receiver<()>>) {
    if let Some(rx) = gate {
        let _ = rx.await;
    }
}

fn find_mut<'a>(
    products: &'a mut [ProductRecord],
    id: &ProductId,
    operation: &str,
) -> RemoteResult<&'a mut ProductRecord> {
    products
        .iter_mut()
        .find(|p| &p.id == id)
        .ok_or_else(|| RemoteError::server(operation, format!("product {} not found", id)))
}

#[async_trait]
impl InventoryService for MockInventory {
    async fn list_products(&self, key: &QueryKey) -> RemoteResult<Vec<ProductRecord>> {
        let call = Call::ListProducts(key.clone());
        let (result, gate) = self.arrive(call, GatedOp::ListProducts, |state| {
            Ok(state
                .products
                .iter()
                .filter(|p| key.matches(p))
                .cloned()
                .collect())
        });
        wait(gate).await;
        result
    }

    async fn list_kpis(&self, range: DateRange) -> RemoteResult<Vec<Kpi>> {
        let (result, gate) = self.arrive(Call::ListKpis(range), GatedOp::ListKpis, |state| {
            Ok(state
                .kpis
                .get(&range)
                .cloned()
                .unwrap_or_else(|| fixtures::kpi_series(range)))
        });
        wait(gate).await;
        result
    }

    async fn update_demand(&self, id: &ProductId, demand: u64) -> RemoteResult<ProductRecord> {
        let call = Call::UpdateDemand {
            id: id.clone(),
            demand,
        };
        let (result, gate) = self.arrive(call, GatedOp::Mutation, |state| {
            let product = find_mut(&mut state.products, id, "updateDemand")?;
            product.demand = demand;
            product.status = ProductStatus::classify(product.stock, product.demand);
            Ok(product.clone())
        });
        wait(gate).await;
        result
    }

    async fn transfer_stock(
        &self,
        id: &ProductId,
        from: &str,
        to: &str,
        qty: i64,
    ) -> RemoteResult<ProductRecord> {
        let call = Call::TransferStock {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            qty,
        };
        let (result, gate) = self.arrive(call, GatedOp::Mutation, |state| {
            let product = find_mut(&mut state.products, id, "transferStock")?;
            if product.warehouse != from {
                return Err(RemoteError::server(
                    "transferStock",
                    format!("product {} is not stocked in {}", id, from),
                ));
            }
            if qty > product.stock {
                return Err(RemoteError::server("transferStock", "insufficient stock"));
            }
            product.stock -= qty;
            product.warehouse = to.to_string();
            product.status = ProductStatus::classify(product.stock, product.demand);
            Ok(product.clone())
        });
        wait(gate).await;
        result
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Stockroom types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a warehouse identifier from a small fixed pool.
    pub fn arb_warehouse() -> impl Strategy<Value = String> {
        prop_oneof![Just("WH1"), Just("WH2"), Just("WH3")].prop_map(str::to_string)
    }

    pub fn arb_product_id() -> impl Strategy<Value = ProductId> {
        (0u16..64).prop_map(|n| ProductId::new(format!("p{}", n)))
    }

    /// Generate a record with the given id.
    pub fn arb_product_with_id(id: ProductId) -> impl Strategy<Value = ProductRecord> {
        (arb_warehouse(), 0i64..500, 0u64..500).prop_map(move |(warehouse, stock, demand)| {
            fixtures::product(id.as_str(), &warehouse, stock, demand)
        })
    }

    pub fn arb_product() -> impl Strategy<Value = ProductRecord> {
        arb_product_id().prop_flat_map(arb_product_with_id)
    }

    /// Generate a list of records with unique ids `p0..pN`.
    pub fn arb_catalog(max_len: usize) -> impl Strategy<Value = Vec<ProductRecord>> {
        prop::collection::vec((arb_warehouse(), 0i64..500, 0u64..500), 0..=max_len).prop_map(
            |rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(i, (warehouse, stock, demand))| {
                        fixtures::product(&format!("p{}", i), &warehouse, stock, demand)
                    })
                    .collect()
            },
        )
    }

    /// Generate a valid intent targeting `id`.
    pub fn arb_intent_for(id: ProductId) -> impl Strategy<Value = MutationIntent> {
        let demand_id = id.clone();
        prop_oneof![
            (0u64..1000).prop_map(move |demand| MutationIntent::UpdateDemand {
                id: demand_id.clone(),
                demand,
            }),
            (arb_warehouse(), arb_warehouse(), 1i64..600)
                .prop_filter("distinct warehouses", |(from, to, _)| from != to)
                .prop_map(move |(from, to, qty)| MutationIntent::TransferStock {
                    id: id.clone(),
                    from,
                    to,
                    qty,
                }),
        ]
    }

    pub fn arb_intent() -> impl Strategy<Value = MutationIntent> {
        arb_product_id().prop_flat_map(arb_intent_for)
    }

    pub fn arb_query_key() -> impl Strategy<Value = QueryKey> {
        (
            prop_oneof![Just(String::new()), "[a-z]{1,4}"],
            prop_oneof![Just("all"), Just("Healthy"), Just("Low"), Just("Critical")],
            prop_oneof![Just(String::new()), arb_warehouse()],
        )
            .prop_map(|(search, status, warehouse)| QueryKey::derive(&search, status, &warehouse))
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common test scenarios.

    use super::*;
    use chrono::{Duration, NaiveDate};

    /// A record with generated name and sku.
    pub fn product(id: &str, warehouse: &str, stock: i64, demand: u64) -> ProductRecord {
        ProductRecord::new(
            id,
            format!("Product {}", id),
            format!("SKU-{}", id.to_ascii_uppercase()),
            warehouse,
            stock,
            demand,
        )
    }

    /// `{id: "p1", demand: 5, stock: 100, warehouse: "WH1"}`.
    pub fn p1() -> ProductRecord {
        product("p1", "WH1", 100, 5)
    }

    /// `{id: "p2", demand: 40, stock: 20, warehouse: "WH2"}`.
    pub fn p2() -> ProductRecord {
        product("p2", "WH2", 20, 40)
    }

    /// A small catalog spread over three warehouses.
    pub fn catalog() -> Vec<ProductRecord> {
        vec![
            ProductRecord::new("p1", "Hex Bolt M8", "HEX-8", "WH1", 100, 5),
            ProductRecord::new("p2", "Steel Washer", "WSH-12", "WH2", 20, 40),
            ProductRecord::new("p3", "Lock Nut M8", "NUT-8", "WH1", 60, 60),
            ProductRecord::new("p4", "Cable Tie", "TIE-200", "WH3", 0, 15),
        ]
    }

    /// Deterministic KPI trend ending 2025-01-31.
    pub fn kpi_series(range: DateRange) -> Vec<Kpi> {
        let end = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap_or(NaiveDate::MIN);
        let days = i64::from(range.days());
        (0..days)
            .map(|offset| Kpi {
                date: end - Duration::days(days - 1 - offset),
                stock: 1_000 + offset * 10,
                demand: 900 + offset as u64 * 12,
            })
            .collect()
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Stockroom results.

    use super::*;

    /// Assert that a result is a validation failure.
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &StockroomResult<T>) {
        assert!(
            matches!(result, Err(StockroomError::Validation(_))),
            "Expected validation error, got {:?}",
            result
        );
    }

    /// Assert that a result is a server rejection.
    pub fn assert_server_error<T: std::fmt::Debug>(result: &StockroomResult<T>) {
        assert!(
            matches!(result, Err(StockroomError::Remote(RemoteError::Server { .. }))),
            "Expected server error, got {:?}",
            result
        );
    }

    /// Assert that a result is a transport failure.
    pub fn assert_network_error<T: std::fmt::Debug>(result: &StockroomResult<T>) {
        assert!(
            matches!(result, Err(StockroomError::Remote(RemoteError::Network { .. }))),
            "Expected network error, got {:?}",
            result
        );
    }
}
