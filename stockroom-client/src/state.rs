//! Dashboard state consumed by the view layer.
//!
//! The view reads three things from the consistency core: the current
//! entry for the active filters, whether a record has a mutation in
//! flight, and the last error. Everything else here is view bookkeeping
//! (filters, date range, KPI series, banners).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stockroom_cache::{
    CacheEntry, CacheStats, MutationExecutor, ProductQueries, RecordCache, RefetchOutcome,
};
use stockroom_core::{
    DateRange, InventoryService, InventorySummary, Kpi, MutationIntent, ProductFilters,
    ProductId, ProductRecord, QueryKey, RemoteResult, StockroomError, StockroomResult,
};

use crate::notifications::{Notification, NotificationLevel};

#[derive(Debug, Default)]
struct KpiState {
    /// Sequence of the most recently issued KPI request.
    latest_seq: u64,
    series: Option<(DateRange, Vec<Kpi>)>,
}

#[derive(Debug)]
struct ViewState {
    filters: ProductFilters,
    date_range: DateRange,
    kpis: KpiState,
    last_error: Option<StockroomError>,
    notifications: Vec<Notification>,
}

pub struct Dashboard<S> {
    service: Arc<S>,
    cache: Arc<RecordCache>,
    queries: ProductQueries<S>,
    executor: MutationExecutor<S>,
    view: Mutex<ViewState>,
}

impl<S: InventoryService> Dashboard<S> {
    /// A dashboard over an empty cache.
    pub fn new(service: Arc<S>, date_range: DateRange) -> Self {
        let cache = Arc::new(RecordCache::new());
        Self {
            queries: ProductQueries::new(Arc::clone(&service), Arc::clone(&cache)),
            executor: MutationExecutor::new(Arc::clone(&service), Arc::clone(&cache)),
            service,
            cache,
            view: Mutex::new(ViewState {
                filters: ProductFilters::cleared(),
                date_range,
                kpis: KpiState::default(),
                last_error: None,
                notifications: Vec::new(),
            }),
        }
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    // ------------------------------------------------------------------------
    // Filters
    // ------------------------------------------------------------------------

    pub fn filters(&self) -> ProductFilters {
        self.view().filters.clone()
    }

    pub fn set_filters(&self, filters: ProductFilters) {
        self.view().filters = filters;
    }

    pub fn set_search(&self, search: impl Into<String>) {
        self.view().filters.search = search.into();
    }

    pub fn set_status(&self, status: impl Into<String>) {
        self.view().filters.status = status.into();
    }

    pub fn set_warehouse(&self, warehouse: impl Into<String>) {
        self.view().filters.warehouse = warehouse.into();
    }

    pub fn clear_filters(&self) {
        self.view().filters = ProductFilters::cleared();
    }

    pub fn query_key(&self) -> QueryKey {
        self.view().filters.query_key()
    }

    // ------------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------------

    /// Cached entry for the active filters, if it has been fetched.
    pub fn products(&self) -> Option<CacheEntry> {
        self.cache.get(&self.query_key())
    }

    pub fn summary(&self) -> Option<InventorySummary> {
        self.products().map(|entry| entry.summary())
    }

    /// Entry for the active filters, fetching it on a miss.
    ///
    /// If the filters changed while the fetch was in flight the result is
    /// returned but neither the last error nor the banners are touched.
    pub async fn load_products(&self) -> StockroomResult<CacheEntry> {
        let key = self.query_key();
        let result = self
            .queries
            .fetch(&key)
            .await
            .map_err(StockroomError::from);
        if self.query_key() != key {
            tracing::debug!(key = %key, "Filters changed while loading products");
            return result;
        }
        self.track(result)
    }

    /// Run the refetches scheduled by settled mutations.
    pub async fn sync(&self) -> Vec<(QueryKey, RemoteResult<RefetchOutcome>)> {
        self.queries.run_scheduled().await
    }

    /// Discard every cached list and fetch the active one again.
    pub async fn reload(&self) -> StockroomResult<CacheEntry> {
        self.cache.clear();
        let entry = self.load_products().await?;
        self.notify(
            NotificationLevel::Info,
            format!("Reloaded {} products", entry.len()),
        );
        Ok(entry)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub async fn update_demand(
        &self,
        id: impl Into<ProductId>,
        demand: u64,
    ) -> StockroomResult<ProductRecord> {
        self.mutate(MutationIntent::update_demand(id, demand)).await
    }

    pub async fn transfer_stock(
        &self,
        id: impl Into<ProductId>,
        from: impl Into<String>,
        to: impl Into<String>,
        qty: i64,
    ) -> StockroomResult<ProductRecord> {
        let intent = MutationIntent::transfer_stock(id, from, to, qty);
        self.mutate(intent).await
    }

    pub async fn mutate(&self, intent: MutationIntent) -> StockroomResult<ProductRecord> {
        let result = self.executor.execute(intent).await;
        if let Ok(record) = &result {
            self.notify(
                NotificationLevel::Success,
                format!("Saved {} ({})", record.name, record.id),
            );
        }
        self.track(result)
    }

    pub fn is_pending(&self, id: &ProductId) -> bool {
        self.executor.is_pending(id)
    }

    // ------------------------------------------------------------------------
    // KPIs
    // ------------------------------------------------------------------------

    pub fn date_range(&self) -> DateRange {
        self.view().date_range
    }

    pub fn set_date_range(&self, range: DateRange) {
        self.view().date_range = range;
    }

    /// KPI series for the active range, if loaded.
    pub fn kpis(&self) -> Option<Vec<Kpi>> {
        let view = self.view();
        match &view.kpis.series {
            Some((range, series)) if *range == view.date_range => Some(series.clone()),
            _ => None,
        }
    }

    /// Fetch the KPI series for the active range.
    ///
    /// A response is stored, and its failure reported, only if no newer KPI
    /// request was issued while it was in flight.
    pub async fn load_kpis(&self) -> StockroomResult<Vec<Kpi>> {
        let (range, seq) = {
            let mut view = self.view();
            view.kpis.latest_seq += 1;
            (view.date_range, view.kpis.latest_seq)
        };
        let result = self
            .service
            .list_kpis(range)
            .await
            .map_err(StockroomError::from);
        {
            let mut view = self.view();
            if view.kpis.latest_seq != seq {
                tracing::debug!(range = %range, seq, "Discarding stale KPI response");
                return result;
            }
            if let Ok(series) = &result {
                view.kpis.series = Some((range, series.clone()));
            }
        }
        self.track(result)
    }

    // ------------------------------------------------------------------------
    // Errors and banners
    // ------------------------------------------------------------------------

    pub fn last_error(&self) -> Option<StockroomError> {
        self.view().last_error.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.view().notifications.clone()
    }

    pub fn dismiss_notifications(&self) {
        self.view().notifications.clear();
    }

    pub fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.view()
            .notifications
            .push(Notification::new(level, message));
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Record the outcome of a view operation: failures become the last
    /// error and raise a banner, successes clear the last error.
    fn track<T>(&self, result: StockroomResult<T>) -> StockroomResult<T> {
        let mut view = self.view();
        match &result {
            Ok(_) => view.last_error = None,
            Err(err) => {
                view.notifications.push(Notification::from_error(err));
                view.last_error = Some(err.clone());
            }
        }
        result
    }
}
