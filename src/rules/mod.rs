//! Rule evaluation.
//!
//! [`evaluate`] is a pure function from a rule definition and a metric bucket
//! to a monetary amount. Zero-amount suppression is the caller's job: a rule
//! that evaluates to zero produces no contribution row, which is distinct
//! from "entitled to zero".

use serde::{Deserialize, Serialize};

use crate::metrics::{MetricBucket, MetricKey};
use crate::interfaces::{PlanId, RuleId};

/// Calculation kind of a rule.
///
/// `PercentOfMetric`, `FlatPerUnit` and `CurrencyPerDollar` share the same
/// math (`value * rate`); they exist as distinct labels for reporting only.
/// Kinds this slice does not compute (tiered slabs and the like) round-trip
/// through `Other` and evaluate to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalcType {
    PercentOfMetric,
    FlatPerUnit,
    CurrencyPerDollar,
    BonusOnTarget,
    #[serde(untagged)]
    Other(String),
}

impl CalcType {
    pub fn parse(s: &str) -> Self {
        match s {
            "PERCENT_OF_METRIC" => Self::PercentOfMetric,
            "FLAT_PER_UNIT" => Self::FlatPerUnit,
            "CURRENCY_PER_DOLLAR" => Self::CurrencyPerDollar,
            "BONUS_ON_TARGET" => Self::BonusOnTarget,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PercentOfMetric => "PERCENT_OF_METRIC",
            Self::FlatPerUnit => "FLAT_PER_UNIT",
            Self::CurrencyPerDollar => "CURRENCY_PER_DOLLAR",
            Self::BonusOnTarget => "BONUS_ON_TARGET",
            Self::Other(s) => s,
        }
    }
}

/// Free-form keyed parameters used by threshold-style calculations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleConfig {
    /// Metric the threshold is checked against; falls back to the rule's own
    /// metric key.
    pub metric_key: Option<MetricKey>,
    pub threshold_value: Option<f64>,
    /// Older rule definitions used `targetValue` for the threshold.
    pub target_value: Option<f64>,
    pub bonus_amount: Option<f64>,
}

/// One compensation formula tied to a metric key. Immutable during a
/// computation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct IncentiveRule {
    pub id: RuleId,
    pub plan_id: PlanId,
    pub metric_key: MetricKey,
    pub calc_type: CalcType,
    pub rate: Option<f64>,
    pub config: RuleConfig,
    pub is_enabled: bool,
}

/// Evaluate one rule against a user's metrics.
///
/// `metric_value` is the value of the rule's own metric key; `None` means "no
/// data" and short-circuits to zero for every kind except `BonusOnTarget`,
/// which reads its threshold metric from the full bucket.
pub fn evaluate(rule: &IncentiveRule, metric_value: Option<f64>, bucket: &MetricBucket) -> f64 {
    if metric_value.is_none() && rule.calc_type != CalcType::BonusOnTarget {
        return 0.0;
    }
    let value = metric_value.unwrap_or(0.0);

    match &rule.calc_type {
        CalcType::PercentOfMetric | CalcType::FlatPerUnit | CalcType::CurrencyPerDollar => {
            value * rule.rate.unwrap_or(0.0)
        }
        CalcType::BonusOnTarget => {
            let threshold_key = rule.config.metric_key.unwrap_or(rule.metric_key);
            let threshold = rule
                .config
                .threshold_value
                .or(rule.config.target_value)
                .unwrap_or(0.0);
            let bonus = rule.config.bonus_amount.unwrap_or(0.0);
            let actual = bucket.get(threshold_key).unwrap_or(value);
            if actual >= threshold {
                bonus
            } else {
                0.0
            }
        }
        CalcType::Other(_) => 0.0,
    }
}

/// Whether an evaluated amount should become a contribution. Zero and
/// non-finite amounts are discarded.
pub fn is_payable(amount: f64) -> bool {
    amount != 0.0 && amount.is_finite()
}
