//! Hospitality aggregation.
//!
//! Review responses are attributed per user. ADR / RevPAR are venture-level
//! averages broadcast identically to every in-scope user; that simplification
//! is deliberate and handled in [`super::MetricSet::bucket`].

use std::collections::HashMap;

use crate::interfaces::{ReviewResponseRow, UserId};

use super::{MetricBucket, MetricKey};

/// Fold review response events into per-user buckets.
pub fn fold_review_responses(rows: &[ReviewResponseRow]) -> HashMap<UserId, MetricBucket> {
    let mut buckets: HashMap<UserId, MetricBucket> = HashMap::new();

    for row in rows {
        buckets
            .entry(row.responded_by)
            .or_default()
            .add(MetricKey::HotelReviewsResponded, 1.0);
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_count_per_responder() {
        let rows = vec![
            ReviewResponseRow { responded_by: 1 },
            ReviewResponseRow { responded_by: 1 },
            ReviewResponseRow { responded_by: 2 },
        ];

        let buckets = fold_review_responses(&rows);
        assert_eq!(buckets[&1].value(MetricKey::HotelReviewsResponded), 2.0);
        assert_eq!(buckets[&2].value(MetricKey::HotelReviewsResponded), 1.0);
    }
}
