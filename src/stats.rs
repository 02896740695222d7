//! Wilson confidence intervals and significance helpers.
//!
//! The Wilson score interval is used instead of the normal approximation
//! because it stays well-behaved at the small per-provider sample sizes a
//! benchmark run produces. Only the 95% and 99% confidence levels are
//! supported; configuration validation rejects anything else before a run
//! starts.

use serde::{Deserialize, Serialize};

/// z value for a 95% confidence level
const Z_95: f64 = 1.96;
/// z value for a 99% confidence level
const Z_99: f64 = 2.576;

/// A confidence interval for a binomial proportion, bounds in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Confidence level the interval was computed at (0.95 or 0.99)
    pub confidence_level: f64,
}

impl ConfidenceInterval {
    /// Width of the interval
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Map a confidence level to its z value.
///
/// Levels other than 0.95 and 0.99 are clamped to the nearest supported one
/// so the statistical core stays total; `GauntletConfig::validate` rejects
/// them before any provider call is made.
fn z_for_confidence(confidence: f64) -> f64 {
    if (confidence - 0.99).abs() < (confidence - 0.95).abs() {
        Z_99
    } else {
        Z_95
    }
}

/// Compute the Wilson score interval for a success proportion.
///
/// Returns `(0, 0)` when `trials == 0`. Bounds are clamped to [0, 1].
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]
pub fn wilson_interval(successes: u64, trials: u64, confidence: f64) -> ConfidenceInterval {
    if trials == 0 {
        return ConfidenceInterval {
            lower: 0.0,
            upper: 0.0,
            confidence_level: confidence,
        };
    }

    let z = z_for_confidence(confidence);
    let n = trials as f64;
    let p = successes as f64 / n;

    let denominator = 1.0 + z * z / n;
    let center = (p + z * z / (2.0 * n)) / denominator;
    let margin = z * ((p * (1.0 - p) + z * z / (4.0 * n)) / n).sqrt() / denominator;

    ConfidenceInterval {
        lower: (center - margin).max(0.0),
        upper: (center + margin).min(1.0),
        confidence_level: confidence,
    }
}

/// Check whether two confidence intervals overlap.
///
/// Overlapping intervals are the conservative "not statistically
/// distinguishable" signal: a provider is never declared the winner while its
/// interval overlaps the other's.
#[must_use]
pub fn intervals_overlap(a: &ConfidenceInterval, b: &ConfidenceInterval) -> bool {
    !(a.upper < b.lower || b.upper < a.lower)
}

/// Effect size between two proportions (absolute difference).
///
/// Reported for human interpretation only; it is not a guard input.
#[must_use]
pub fn effect_size(p1: f64, p2: f64) -> f64 {
    (p1 - p2).abs()
}
