//! Call-center activity aggregation.

use std::collections::HashMap;

use crate::interfaces::{CallLogRow, UserId};

use super::{MetricBucket, MetricKey};

/// Fold call logs into per-user buckets.
///
/// Dials default to 1 per log when the log carries no explicit count. Talk
/// time is derived from the call timestamps, clamped to zero for clock skew,
/// with a missing end treated as an instant hangup.
pub fn fold_call_logs(rows: &[CallLogRow]) -> HashMap<UserId, MetricBucket> {
    let mut buckets: HashMap<UserId, MetricBucket> = HashMap::new();

    for row in rows {
        let Some(user_id) = row.user_id else {
            continue;
        };

        let bucket = buckets.entry(user_id).or_default();
        bucket.add(MetricKey::BpoDials, row.dial_count.unwrap_or(1) as f64);
        if row.connected {
            bucket.add(MetricKey::BpoConnects, 1.0);
        }
        if row.deal_won {
            bucket.add(MetricKey::BpoDeals, 1.0);
        }
        bucket.add(MetricKey::BpoTalkSeconds, talk_seconds(row));
    }

    buckets
}

fn talk_seconds(row: &CallLogRow) -> f64 {
    let Some(started) = row.started_at else {
        return 0.0;
    };
    let ended = row.ended_at.unwrap_or(started);
    (ended - started).num_seconds().max(0) as f64
}
