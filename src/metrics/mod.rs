//! Metric store adapter.
//!
//! Maps the three operational domains (freight, call-center, hospitality)
//! onto per-user daily metric buckets. Metric keys are a closed enumeration
//! with an explicit key-to-domain table, so a typo in a rule definition fails
//! at the edge instead of silently reading as zero.

pub mod call_center;
pub mod freight;
pub mod hotel;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interfaces::{MetricSource, RateAverages, Result, UserId, VentureId};

/// Operational domain behind a metric key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricDomain {
    Freight,
    CallCenter,
    Hotel,
}

/// Canonical metric keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    LoadsCompleted,
    LoadsRevenue,
    LoadsMiles,
    LoadsMargin,
    BpoDials,
    BpoConnects,
    BpoTalkSeconds,
    BpoDeals,
    HotelReviewsResponded,
    HotelAdr,
    HotelRevpar,
}

impl MetricKey {
    pub const ALL: [MetricKey; 11] = [
        Self::LoadsCompleted,
        Self::LoadsRevenue,
        Self::LoadsMiles,
        Self::LoadsMargin,
        Self::BpoDials,
        Self::BpoConnects,
        Self::BpoTalkSeconds,
        Self::BpoDeals,
        Self::HotelReviewsResponded,
        Self::HotelAdr,
        Self::HotelRevpar,
    ];

    /// The domain whose query produces this metric.
    pub fn domain(&self) -> MetricDomain {
        match self {
            Self::LoadsCompleted | Self::LoadsRevenue | Self::LoadsMiles | Self::LoadsMargin => {
                MetricDomain::Freight
            }
            Self::BpoDials | Self::BpoConnects | Self::BpoTalkSeconds | Self::BpoDeals => {
                MetricDomain::CallCenter
            }
            Self::HotelReviewsResponded | Self::HotelAdr | Self::HotelRevpar => MetricDomain::Hotel,
        }
    }

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadsCompleted => "loads_completed",
            Self::LoadsRevenue => "loads_revenue",
            Self::LoadsMiles => "loads_miles",
            Self::LoadsMargin => "loads_margin",
            Self::BpoDials => "bpo_dials",
            Self::BpoConnects => "bpo_connects",
            Self::BpoTalkSeconds => "bpo_talk_seconds",
            Self::BpoDeals => "bpo_deals",
            Self::HotelReviewsResponded => "hotel_reviews_responded",
            Self::HotelAdr => "hotel_adr",
            Self::HotelRevpar => "hotel_revpar",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown metric key encountered in stored data.
#[derive(Debug, thiserror::Error)]
#[error("unknown metric key: {0}")]
pub struct MetricKeyParseError(pub String);

impl FromStr for MetricKey {
    type Err = MetricKeyParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MetricKeyParseError(s.to_string()))
    }
}

/// Per-user, per-day mapping of metric key to value. Built fresh per
/// computation; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBucket {
    values: HashMap<MetricKey, f64>,
}

impl MetricBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a metric, treating absence as zero.
    pub fn value(&self, key: MetricKey) -> f64 {
        self.values.get(&key).copied().unwrap_or(0.0)
    }

    /// Read a metric, distinguishing absence from zero.
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        self.values.get(&key).copied()
    }

    pub fn set(&mut self, key: MetricKey, value: f64) {
        self.values.insert(key, value);
    }

    pub fn add(&mut self, key: MetricKey, delta: f64) {
        *self.values.entry(key).or_insert(0.0) += delta;
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overlay another bucket's values onto this one.
    pub fn merge(&mut self, other: &MetricBucket) {
        for (key, value) in &other.values {
            self.values.insert(*key, *value);
        }
    }
}

/// UTC day boundaries `[00:00:00.000, 23:59:59.999]` for a calendar day.
pub fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// The collected metrics for one `(venture, day)` computation.
#[derive(Debug)]
pub struct MetricSet {
    buckets: HashMap<UserId, MetricBucket>,
    averages: RateAverages,
    wants_adr: bool,
    wants_revpar: bool,
}

impl MetricSet {
    /// Users that carried at least one metric in the period.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.buckets.keys().copied().collect()
    }

    /// The bucket for a user, created empty if the user carried no metrics.
    ///
    /// Venture-level ADR / RevPAR averages are broadcast here so every
    /// in-scope user sees them, but a zero or absent average never overwrites
    /// the bucket.
    pub fn bucket(&mut self, user_id: UserId) -> &MetricBucket {
        let bucket = self.buckets.entry(user_id).or_default();
        if self.wants_adr && self.averages.adr != 0.0 {
            bucket.set(MetricKey::HotelAdr, self.averages.adr);
        }
        if self.wants_revpar && self.averages.revpar != 0.0 {
            bucket.set(MetricKey::HotelRevpar, self.averages.revpar);
        }
        bucket
    }
}

/// Aggregates per-user metric buckets from the domain sources.
///
/// A domain's query is skipped entirely when none of its metric keys were
/// requested. A query failure aborts the whole computation.
pub struct MetricAggregator {
    source: Arc<dyn MetricSource>,
}

impl MetricAggregator {
    pub fn new(source: Arc<dyn MetricSource>) -> Self {
        Self { source }
    }

    /// Collect buckets for every requested metric key over one calendar day.
    pub async fn collect(
        &self,
        venture_id: VentureId,
        day: NaiveDate,
        required: &HashSet<MetricKey>,
    ) -> Result<MetricSet> {
        let (start, end) = day_bounds(day);
        let wants = |domain: MetricDomain| required.iter().any(|k| k.domain() == domain);

        let mut buckets: HashMap<UserId, MetricBucket> = HashMap::new();
        let mut merge = |folded: HashMap<UserId, MetricBucket>| {
            for (user_id, bucket) in folded {
                buckets.entry(user_id).or_default().merge(&bucket);
            }
        };

        if wants(MetricDomain::Freight) {
            let rows = self.source.freight_loads(venture_id, start, end).await?;
            debug!(venture_id, rows = rows.len(), "collected freight loads");
            merge(freight::fold_loads(&rows));
        }

        if wants(MetricDomain::CallCenter) {
            let rows = self.source.call_logs(venture_id, start, end).await?;
            debug!(venture_id, rows = rows.len(), "collected call logs");
            merge(call_center::fold_call_logs(&rows));
        }

        let mut averages = RateAverages::default();
        if wants(MetricDomain::Hotel) {
            let rows = self.source.review_responses(venture_id, start, end).await?;
            debug!(venture_id, rows = rows.len(), "collected review responses");
            merge(hotel::fold_review_responses(&rows));
            averages = self.source.hotel_rate_averages(venture_id, start, end).await?;
        }

        Ok(MetricSet {
            buckets,
            averages,
            wants_adr: required.contains(&MetricKey::HotelAdr),
            wants_revpar: required.contains(&MetricKey::HotelRevpar),
        })
    }
}
