//! Multi-criteria guard evaluation: the ship/no-ship decision.
//!
//! Rules are evaluated in a fixed priority order and evaluation stops at the
//! first failure, so the surfaced reason is always the first blocking issue
//! rather than an arbitrary one: statistical advantage, then confidence
//! interval overlap, then cost advantage, latency ceiling, and resource
//! spill ceiling.

use crate::scorer::ProviderStatistics;
use crate::stats::intervals_overlap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reason reported when either provider lacks successful results
pub const INSUFFICIENT_DATA: &str = "insufficient data for statistical analysis";

/// Derived statistic a guard rule evaluates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuardMetric {
    /// `challenger.composite_accuracy - baseline.composite_accuracy`
    AccuracyAdvantage,
    /// `baseline.cost_mean_per_request / challenger.cost_mean_per_request`
    CostAdvantage,
    /// Challenger's p95 latency in milliseconds
    LatencyP95Ms,
    /// Challenger's peak resource usage in MB
    ResourceSpillMb,
}

impl GuardMetric {
    /// Configuration-facing name of the metric
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AccuracyAdvantage => "accuracy_advantage",
            Self::CostAdvantage => "cost_advantage",
            Self::LatencyP95Ms => "latency_p95_ms",
            Self::ResourceSpillMb => "resource_spill_mb",
        }
    }
}

/// Threshold comparison operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Comparator {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl Comparator {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Ge => value >= threshold,
            Self::Le => value <= threshold,
            Self::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
        }
    }
}

/// One declarative pass/fail criterion over derived run statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardRule {
    /// Name surfaced in the failure reason
    pub name: String,
    /// Statistic this rule evaluates
    pub metric: GuardMetric,
    /// Comparison operator
    pub comparator: Comparator,
    /// Threshold value
    pub threshold: f64,
}

/// Outcome of guard evaluation: a single verdict with at most one reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardVerdict {
    /// Did every guard pass
    pub passed: bool,
    /// The first blocking issue, or a pass summary
    pub reason: String,
}

impl GuardVerdict {
    fn fail(reason: String) -> Self {
        Self {
            passed: false,
            reason,
        }
    }
}

/// Fixed evaluation priority for configured rules. CI overlap is checked
/// unconditionally between the advantage and cost rules.
const METRIC_ORDER: [GuardMetric; 4] = [
    GuardMetric::AccuracyAdvantage,
    GuardMetric::CostAdvantage,
    GuardMetric::LatencyP95Ms,
    GuardMetric::ResourceSpillMb,
];

/// Evaluate the guard set against per-provider statistics.
///
/// Pure over its inputs. Missing statistics for either provider, or a
/// provider with no successful results, fail immediately with
/// [`INSUFFICIENT_DATA`] rather than silently passing.
#[must_use]
pub fn evaluate_guards(
    rules: &[GuardRule],
    stats: &HashMap<String, ProviderStatistics>,
    baseline_id: &str,
    challenger_id: &str,
) -> GuardVerdict {
    let (Some(baseline), Some(challenger)) = (stats.get(baseline_id), stats.get(challenger_id))
    else {
        return GuardVerdict::fail(INSUFFICIENT_DATA.to_string());
    };
    if !baseline.has_successes() || !challenger.has_successes() {
        return GuardVerdict::fail(INSUFFICIENT_DATA.to_string());
    }

    for metric in METRIC_ORDER {
        // Config validation guarantees at most one rule per metric.
        if let Some(rule) = rules.iter().find(|r| r.metric == metric) {
            if let Some(verdict) = check_rule(rule, baseline, challenger) {
                return verdict;
            }
        }

        // An advantage that is not statistically distinguishable must never
        // pass, so overlapping intervals block regardless of point estimates.
        if metric == GuardMetric::AccuracyAdvantage
            && intervals_overlap(&challenger.confidence_interval, &baseline.confidence_interval)
        {
            return GuardVerdict::fail(
                "confidence intervals overlap: result inconclusive".to_string(),
            );
        }
    }

    GuardVerdict {
        passed: true,
        reason: "all guards passed with statistical significance".to_string(),
    }
}

/// Evaluate one rule; `Some` is a failing verdict, `None` means the rule
/// passed or was skipped.
fn check_rule(
    rule: &GuardRule,
    baseline: &ProviderStatistics,
    challenger: &ProviderStatistics,
) -> Option<GuardVerdict> {
    let value = match rule.metric {
        GuardMetric::AccuracyAdvantage => {
            challenger.composite_accuracy - baseline.composite_accuracy
        }
        GuardMetric::CostAdvantage => {
            if baseline.cost_mean_per_request <= 0.0 {
                // A free baseline makes the ratio meaningless. A free
                // challenger trivially satisfies the rule; anything else
                // skips it loudly rather than passing in silence.
                if challenger.cost_mean_per_request <= 0.0 {
                    return None;
                }
                tracing::warn!(
                    rule = %rule.name,
                    "baseline cost is zero, skipping cost advantage guard"
                );
                return None;
            }
            baseline.cost_mean_per_request / challenger.cost_mean_per_request.max(f64::MIN_POSITIVE)
        }
        GuardMetric::LatencyP95Ms => challenger.latency_p95_ms,
        GuardMetric::ResourceSpillMb => challenger.peak_resource_mb,
    };

    if rule.comparator.holds(value, rule.threshold) {
        return None;
    }

    let reason = match rule.metric {
        GuardMetric::AccuracyAdvantage => format!(
            "{}: advantage {:.1}pp below required {:.1}pp",
            rule.name,
            value * 100.0,
            rule.threshold * 100.0
        ),
        GuardMetric::CostAdvantage => format!(
            "{}: cost advantage {:.1}x below required {:.1}x",
            rule.name, value, rule.threshold
        ),
        GuardMetric::LatencyP95Ms => format!(
            "{}: p95 latency {:.0}ms not {} {:.0}ms",
            rule.name,
            value,
            rule.comparator.symbol(),
            rule.threshold
        ),
        GuardMetric::ResourceSpillMb => format!(
            "{}: resource spill {:.0}MB not {} {:.0}MB",
            rule.name,
            value,
            rule.comparator.symbol(),
            rule.threshold
        ),
    };
    Some(GuardVerdict::fail(reason))
}
