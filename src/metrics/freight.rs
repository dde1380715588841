//! Freight load aggregation.

use std::collections::HashMap;

use crate::interfaces::{LoadRow, LoadStatus, UserId};

use super::{MetricBucket, MetricKey};

/// Fold billed loads into per-user buckets.
///
/// Only loads in the terminal `Delivered` status contribute; `Covered` and
/// `Lost` loads are skipped regardless of their amount fields, as are loads
/// with no attributable user.
pub fn fold_loads(rows: &[LoadRow]) -> HashMap<UserId, MetricBucket> {
    let mut buckets: HashMap<UserId, MetricBucket> = HashMap::new();

    for row in rows {
        if row.status != LoadStatus::Delivered {
            continue;
        }
        let Some(user_id) = row.created_by else {
            continue;
        };

        let bucket = buckets.entry(user_id).or_default();
        bucket.add(MetricKey::LoadsCompleted, 1.0);
        bucket.add(MetricKey::LoadsRevenue, row.bill_amount.unwrap_or(0.0));
        bucket.add(MetricKey::LoadsMiles, row.miles.unwrap_or(0.0));
        bucket.add(MetricKey::LoadsMargin, row.margin_amount.unwrap_or(0.0));
    }

    buckets
}
