//! Result accumulation and domain-weighted composite scoring.
//!
//! The scorer owns the append-only result log for the run; statistics are
//! derived from it once per provider after execution completes (or on demand
//! for partial reporting).

use crate::stats::{wilson_interval, ConfidenceInterval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accuracy cutoff that converts a continuous score into a binary trial for
/// the Wilson interval. Fixed by design: the interval models a binomial
/// proportion, so the continuous score must be thresholded somewhere, and
/// 0.5 is the documented convention inherited from the scoring scale.
pub const WILSON_SUCCESS_CUTOFF: f64 = 0.5;

/// Outcome of one provider call for one test item, immutable once built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Provider that served the call
    pub provider_id: String,
    /// Model the provider reported using
    pub model_name: String,
    /// Domain of the test item
    pub domain: String,
    /// Wall-clock latency of the call in milliseconds
    pub latency_ms: f64,
    /// Cost of the call
    pub cost_usd: f64,
    /// Whether the call completed without transport or protocol error
    pub success: bool,
    /// Accuracy in [0, 1]; 0 when the call failed
    pub accuracy_score: f64,
    /// Domain weight in effect when the result was scored
    pub domain_weight: f64,
    /// `accuracy_score * domain_weight`
    pub weighted_score: f64,
    /// Tokens consumed by the call
    pub tokens_used: u64,
    /// Resource high-water mark observed during the call (e.g. VRAM MB)
    pub resource_mb: f64,
    /// Chunk the item belonged to
    pub chunk_id: usize,
    /// Transport error message for failed calls
    pub error: Option<String>,
}

impl EvaluationResult {
    /// Build the record for a failed provider call
    #[must_use]
    pub fn failed(
        provider_id: &str,
        model_name: &str,
        domain: &str,
        latency_ms: f64,
        chunk_id: usize,
        error: String,
    ) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            model_name: model_name.to_string(),
            domain: domain.to_string(),
            latency_ms,
            cost_usd: 0.0,
            success: false,
            accuracy_score: 0.0,
            domain_weight: 0.0,
            weighted_score: 0.0,
            tokens_used: 0,
            resource_mb: 0.0,
            chunk_id,
            error: Some(error),
        }
    }
}

/// Derived per-provider statistics, recomputed from the result log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatistics {
    /// All calls made to the provider, failed ones included
    pub total_requests: usize,
    /// Fraction of calls that completed without transport error
    pub success_rate: f64,
    /// Domain-weighted mean accuracy over successful results
    pub composite_accuracy: f64,
    /// Wilson interval over the thresholded per-item outcomes
    pub confidence_interval: ConfidenceInterval,
    /// Unweighted mean accuracy per domain, successful results only
    pub domain_breakdown: BTreeMap<String, f64>,
    /// Total spend attributed to successful calls
    pub cost_total_usd: f64,
    /// Mean cost per successful call
    pub cost_mean_per_request: f64,
    /// Mean latency over successful calls
    pub latency_mean_ms: f64,
    /// 95th percentile latency over successful calls
    pub latency_p95_ms: f64,
    /// Tokens consumed by successful calls
    pub total_tokens: u64,
    /// Peak resource usage over successful calls
    pub peak_resource_mb: f64,
}

impl ProviderStatistics {
    /// Whether enough successful results exist to support guard evaluation
    #[must_use]
    pub fn has_successes(&self) -> bool {
        self.total_requests > 0 && self.success_rate > 0.0
    }
}

/// Append-only result log with composite statistics derivation
#[derive(Debug, Default)]
pub struct CompositeScorer {
    results: Vec<EvaluationResult>,
}

impl CompositeScorer {
    /// Create an empty scorer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result; O(1)
    pub fn add_result(&mut self, result: EvaluationResult) {
        self.results.push(result);
    }

    /// Full result log in arrival order
    #[must_use]
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    /// Number of recorded results
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no results have been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Provider ids in order of first appearance in the log
    #[must_use]
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for result in &self.results {
            if !ids.contains(&result.provider_id) {
                ids.push(result.provider_id.clone());
            }
        }
        ids
    }

    /// Consume the scorer, yielding the result log
    #[must_use]
    pub fn into_results(self) -> Vec<EvaluationResult> {
        self.results
    }

    /// Derive statistics for one provider.
    ///
    /// Composite accuracy is `sum(weighted_score) / sum(domain_weight)` over
    /// successful results; zero when no successful result exists (never a
    /// division by zero). The domain breakdown is deliberately unweighted so
    /// a per-domain regression stays visible even when the composite masks it.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute_statistics(&self, provider_id: &str, confidence: f64) -> ProviderStatistics {
        let provider_results: Vec<&EvaluationResult> = self
            .results
            .iter()
            .filter(|r| r.provider_id == provider_id)
            .collect();
        let successful: Vec<&EvaluationResult> =
            provider_results.iter().copied().filter(|r| r.success).collect();

        let total_requests = provider_results.len();
        let success_rate = if total_requests == 0 {
            0.0
        } else {
            successful.len() as f64 / total_requests as f64
        };

        let total_weight: f64 = successful.iter().map(|r| r.domain_weight).sum();
        let composite_accuracy = if total_weight > 0.0 {
            successful.iter().map(|r| r.weighted_score).sum::<f64>() / total_weight
        } else {
            0.0
        };

        let wilson_successes = successful
            .iter()
            .filter(|r| r.accuracy_score > WILSON_SUCCESS_CUTOFF)
            .count() as u64;
        let confidence_interval =
            wilson_interval(wilson_successes, successful.len() as u64, confidence);

        let mut domain_sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for result in &successful {
            let entry = domain_sums.entry(result.domain.clone()).or_insert((0.0, 0));
            entry.0 += result.accuracy_score;
            entry.1 += 1;
        }
        let domain_breakdown = domain_sums
            .into_iter()
            .map(|(domain, (sum, count))| (domain, sum / count as f64))
            .collect();

        let cost_total_usd: f64 = successful.iter().map(|r| r.cost_usd).sum();
        let cost_mean_per_request = if successful.is_empty() {
            0.0
        } else {
            cost_total_usd / successful.len() as f64
        };

        let latencies: Vec<f64> = successful.iter().map(|r| r.latency_ms).collect();
        let latency_mean_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };

        ProviderStatistics {
            total_requests,
            success_rate,
            composite_accuracy,
            confidence_interval,
            domain_breakdown,
            cost_total_usd,
            cost_mean_per_request,
            latency_mean_ms,
            latency_p95_ms: percentile(&latencies, 0.95),
            total_tokens: successful.iter().map(|r| r.tokens_used).sum(),
            peak_resource_mb: successful.iter().map(|r| r.resource_mb).fold(0.0, f64::max),
        }
    }
}

/// Percentile over raw samples; a single sample returns itself
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
    sorted[idx.min(sorted.len() - 1)]
}
