//! Report generation for completed benchmark runs.
//!
//! A report bundles the per-provider statistics, the guard verdict, cost
//! totals, and the raw result log into one serializable artifact that renders
//! as JSON (machine-readable) or markdown (human-readable).

use crate::engine::EngineState;
use crate::guards::GuardVerdict;
use crate::scorer::{CompositeScorer, EvaluationResult, ProviderStatistics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use tabled::{Table, Tabled};

/// Terminal status of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All guards held
    Passed,
    /// Run completed but one or more guards failed
    BelowThresholds,
    /// Run aborted by the hard budget cap; results are partial
    BudgetAborted,
    /// Run cancelled by the operator; results are partial
    Cancelled,
}

impl RunStatus {
    /// Human-readable status label for rendered output
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::BelowThresholds => "BELOW THRESHOLDS",
            Self::BudgetAborted => "BUDGET ABORTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Full benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GauntletReport {
    /// Terminal run status
    pub status: RunStatus,
    /// Report generation timestamp
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration of the run
    pub total_duration_seconds: f64,
    /// Total evaluations recorded, failures included
    pub total_tests: usize,
    /// Spend across all providers
    pub total_cost_usd: f64,
    /// Spend attributed to cloud-billed providers
    pub cloud_cost_usd: f64,
    /// Confidence level used for all intervals
    pub confidence_level: f64,
    /// Chunks fully processed
    pub chunks_processed: usize,
    /// Per-provider aggregate statistics, keyed by provider id
    pub statistics: BTreeMap<String, ProviderStatistics>,
    /// Outcome of guard evaluation
    pub guard_verdict: GuardVerdict,
    /// Raw per-evaluation results in execution order
    pub raw_results: Vec<EvaluationResult>,
}

/// Assembles a report from engine output and guard evaluation
pub struct ReportBuilder {
    confidence_level: f64,
    started_at: DateTime<Utc>,
    chunks_processed: usize,
    total_cost_usd: f64,
    cloud_cost_usd: f64,
    engine_state: EngineState,
}

impl ReportBuilder {
    /// Create a builder; `started_at` anchors the duration calculation
    #[must_use]
    pub fn new(confidence_level: f64, started_at: DateTime<Utc>) -> Self {
        Self {
            confidence_level,
            started_at,
            chunks_processed: 0,
            total_cost_usd: 0.0,
            cloud_cost_usd: 0.0,
            engine_state: EngineState::Idle,
        }
    }

    /// Record execution outcome details
    #[must_use]
    pub const fn with_execution(
        mut self,
        engine_state: EngineState,
        chunks_processed: usize,
    ) -> Self {
        self.engine_state = engine_state;
        self.chunks_processed = chunks_processed;
        self
    }

    /// Record final budget counters
    #[must_use]
    pub const fn with_spend(mut self, total_cost_usd: f64, cloud_cost_usd: f64) -> Self {
        self.total_cost_usd = total_cost_usd;
        self.cloud_cost_usd = cloud_cost_usd;
        self
    }

    /// Build the report.
    ///
    /// The status is derived from how the run ended: an aborted run reports
    /// `BudgetAborted` or `Cancelled` regardless of the guard verdict, so a
    /// partial run can never masquerade as a pass.
    #[must_use]
    pub fn build(
        self,
        scorer: CompositeScorer,
        guard_verdict: GuardVerdict,
        aborted_by_budget: bool,
    ) -> GauntletReport {
        let status = match self.engine_state {
            EngineState::Aborted if aborted_by_budget => RunStatus::BudgetAborted,
            EngineState::Aborted => RunStatus::Cancelled,
            _ if guard_verdict.passed => RunStatus::Passed,
            _ => RunStatus::BelowThresholds,
        };

        let statistics: BTreeMap<String, ProviderStatistics> = scorer
            .provider_ids()
            .into_iter()
            .map(|id| {
                let stats = scorer.compute_statistics(&id, self.confidence_level);
                (id, stats)
            })
            .collect();

        let total_tests = scorer.len();
        let generated_at = Utc::now();
        GauntletReport {
            status,
            generated_at,
            total_duration_seconds: (generated_at - self.started_at).num_milliseconds() as f64
                / 1000.0,
            total_tests,
            total_cost_usd: self.total_cost_usd,
            cloud_cost_usd: self.cloud_cost_usd,
            confidence_level: self.confidence_level,
            chunks_processed: self.chunks_processed,
            statistics,
            guard_verdict,
            raw_results: scorer.into_results(),
        }
    }
}

/// Table row for markdown output
#[derive(Tabled)]
struct ProviderTableRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Composite Acc")]
    composite: String,
    #[tabled(rename = "95% CI")]
    interval: String,
    #[tabled(rename = "Cost/Req")]
    cost: String,
    #[tabled(rename = "P95 Latency")]
    latency: String,
    #[tabled(rename = "Success Rate")]
    success: String,
}

impl GauntletReport {
    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render report as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(output, "# Gauntlet Benchmark Report").ok();
        writeln!(output).ok();
        writeln!(output, "**Status:** {}", self.status.label()).ok();
        writeln!(
            output,
            "**Generated:** {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
        .ok();
        writeln!(output, "**Duration:** {:.1}s", self.total_duration_seconds).ok();
        writeln!(output).ok();

        writeln!(output, "## Summary").ok();
        writeln!(output).ok();
        writeln!(output, "| Metric | Value |").ok();
        writeln!(output, "|--------|-------|").ok();
        writeln!(output, "| Total Evaluations | {} |", self.total_tests).ok();
        writeln!(output, "| Chunks Processed | {} |", self.chunks_processed).ok();
        writeln!(output, "| Total Cost | ${:.4} |", self.total_cost_usd).ok();
        writeln!(output, "| Cloud Cost | ${:.4} |", self.cloud_cost_usd).ok();
        writeln!(
            output,
            "| Confidence Level | {:.0}% |",
            self.confidence_level * 100.0
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Provider Results").ok();
        writeln!(output).ok();

        let rows: Vec<ProviderTableRow> = self
            .statistics
            .iter()
            .map(|(id, stats)| ProviderTableRow {
                provider: id.clone(),
                composite: format!("{:.2}%", stats.composite_accuracy * 100.0),
                interval: format!(
                    "[{:.3}, {:.3}]",
                    stats.confidence_interval.lower, stats.confidence_interval.upper
                ),
                cost: format!("${:.5}", stats.cost_mean_per_request),
                latency: format!("{:.0}ms", stats.latency_p95_ms),
                success: format!("{:.1}%", stats.success_rate * 100.0),
            })
            .collect();

        let table = Table::new(rows).to_string();
        writeln!(output, "{table}").ok();
        writeln!(output).ok();

        writeln!(output, "## Guard Verdict").ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**{}:** {}",
            if self.guard_verdict.passed {
                "Passed"
            } else {
                "Failed"
            },
            self.guard_verdict.reason
        )
        .ok();
        writeln!(output).ok();

        writeln!(output, "## Domain Breakdown").ok();
        writeln!(output).ok();
        for (id, stats) in &self.statistics {
            if stats.domain_breakdown.is_empty() {
                continue;
            }
            writeln!(output, "### {id}").ok();
            writeln!(output).ok();
            for (domain, accuracy) in &stats.domain_breakdown {
                writeln!(output, "- {domain}: {:.2}%", accuracy * 100.0).ok();
            }
            writeln!(output).ok();
        }

        output
    }
}
