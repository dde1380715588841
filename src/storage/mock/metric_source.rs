//! In-memory metric source.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::interfaces::{
    CallLogRow, LoadRow, MetricSource, RateAverages, Result, ReviewResponseRow, StorageError,
    VentureId,
};

/// Metric source backed by per-venture row vectors. Counts every query so
/// tests can assert which domains were touched, and fails freight queries on
/// demand.
#[derive(Default)]
pub struct MockMetricSource {
    loads: RwLock<HashMap<VentureId, Vec<LoadRow>>>,
    calls: RwLock<HashMap<VentureId, Vec<CallLogRow>>>,
    reviews: RwLock<HashMap<VentureId, Vec<ReviewResponseRow>>>,
    averages: RwLock<HashMap<VentureId, RateAverages>>,
    fail_freight: RwLock<HashSet<VentureId>>,
    freight_queries: AtomicUsize,
    call_queries: AtomicUsize,
    review_queries: AtomicUsize,
    kpi_queries: AtomicUsize,
}

impl MockMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_load(&self, venture_id: VentureId, row: LoadRow) {
        self.loads.write().await.entry(venture_id).or_default().push(row);
    }

    pub async fn push_call(&self, venture_id: VentureId, row: CallLogRow) {
        self.calls.write().await.entry(venture_id).or_default().push(row);
    }

    pub async fn push_review(&self, venture_id: VentureId, row: ReviewResponseRow) {
        self.reviews.write().await.entry(venture_id).or_default().push(row);
    }

    pub async fn set_rate_averages(&self, venture_id: VentureId, averages: RateAverages) {
        self.averages.write().await.insert(venture_id, averages);
    }

    /// Make freight queries for this venture fail.
    pub async fn set_fail_freight(&self, venture_id: VentureId) {
        self.fail_freight.write().await.insert(venture_id);
    }

    pub fn freight_query_count(&self) -> usize {
        self.freight_queries.load(Ordering::SeqCst)
    }

    pub fn call_query_count(&self) -> usize {
        self.call_queries.load(Ordering::SeqCst)
    }

    pub fn review_query_count(&self) -> usize {
        self.review_queries.load(Ordering::SeqCst)
    }

    pub fn kpi_query_count(&self) -> usize {
        self.kpi_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricSource for MockMetricSource {
    async fn freight_loads(
        &self,
        venture_id: VentureId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<LoadRow>> {
        self.freight_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_freight.read().await.contains(&venture_id) {
            return Err(StorageError::NotFound(format!(
                "freight loads for venture {venture_id}"
            )));
        }
        Ok(self.loads.read().await.get(&venture_id).cloned().unwrap_or_default())
    }

    async fn call_logs(
        &self,
        venture_id: VentureId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CallLogRow>> {
        self.call_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.calls.read().await.get(&venture_id).cloned().unwrap_or_default())
    }

    async fn review_responses(
        &self,
        venture_id: VentureId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<ReviewResponseRow>> {
        self.review_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.reviews.read().await.get(&venture_id).cloned().unwrap_or_default())
    }

    async fn hotel_rate_averages(
        &self,
        venture_id: VentureId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<RateAverages> {
        self.kpi_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .averages
            .read()
            .await
            .get(&venture_id)
            .copied()
            .unwrap_or_default())
    }
}
