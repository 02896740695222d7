//! Run configuration loaded from YAML.
//!
//! Validation happens up front, before any provider call is made, so a
//! misconfigured run never spends budget.

use crate::guards::GuardRule;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Tolerance when checking that domain weights sum to 1.0
const WEIGHT_TOLERANCE: f64 = 1e-3;

/// Errors that can occur during configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("domain weights sum to {0:.4}, expected 1.0")]
    InvalidWeights(f64),

    #[error("unsupported confidence level {0} (only 0.95 and 0.99)")]
    UnsupportedConfidence(f64),

    #[error("chunk_size must be at least 1")]
    InvalidChunkSize,

    #[error("checkpoint_interval must be at least 1")]
    InvalidCheckpointInterval,

    #[error("at least one provider must be configured")]
    NoProviders,

    #[error("guard references unknown provider: {0}")]
    UnknownProvider(String),

    #[error("hard_cap_usd must be positive")]
    InvalidHardCap,

    #[error("throttle_delay_seconds must be finite and non-negative, got {0}")]
    InvalidThrottleDelay(f64),

    #[error("soft_cloud_threshold_usd must be finite and non-negative, got {0}")]
    InvalidSoftThreshold(f64),

    #[error("multiple guard rules configured for metric {0}")]
    DuplicateGuardMetric(&'static str),
}

/// How a provider's usage is billed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Billing {
    /// Billed per call by a hosted API; subject to adaptive throttling
    Cloud,
    /// Local compute; never throttled
    Local,
}

/// One candidate inference provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Stable identifier used in results and reports
    pub id: String,
    /// Model name reported by the provider
    pub model: String,
    /// Billing classification for budget accounting
    pub billing: Billing,
}

/// One test domain: its composite weight, item count, and scoring method
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainSpec {
    /// Domain tag (math, reasoning, coding, ...)
    pub name: String,
    /// Weight in the composite accuracy, all weights summing to 1.0
    pub weight: f64,
    /// Number of consecutive dataset items belonging to this domain
    #[serde(default)]
    pub items: usize,
    /// Scoring method identifier passed to the scoring adapter
    #[serde(default = "default_scoring")]
    pub scoring: String,
}

fn default_scoring() -> String {
    "general".to_string()
}

/// Guard configuration: which providers to compare and the ordered rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardSettings {
    /// Provider the challenger is measured against
    pub baseline: String,
    /// Provider that must win for the run to pass
    pub challenger: String,
    /// Declarative threshold rules
    #[serde(default)]
    pub rules: Vec<GuardRule>,
}

/// Full run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GauntletConfig {
    /// JSONL dataset path; a stub dataset is generated when absent
    #[serde(default)]
    pub dataset: Option<PathBuf>,
    /// Items per execution chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Checkpoint every N chunks
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// Directory for checkpoint files
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Hard spending cap; breaching it aborts the run
    #[serde(default = "default_hard_cap")]
    pub hard_cap_usd: f64,
    /// Cloud spend level that triggers adaptive throttling
    #[serde(default = "default_soft_threshold")]
    pub soft_cloud_threshold_usd: f64,
    /// Mandatory pause once throttling is active
    #[serde(default = "default_throttle_delay")]
    pub throttle_delay_seconds: f64,
    /// Confidence level for Wilson intervals (0.95 or 0.99)
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    /// Per-call provider timeout
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Test domains in dataset order
    pub domains: Vec<DomainSpec>,
    /// Candidate providers in dispatch order
    pub providers: Vec<ProviderSpec>,
    /// Ship/no-ship guard configuration
    pub guards: GuardSettings,
}

const fn default_chunk_size() -> usize {
    38
}
const fn default_checkpoint_interval() -> usize {
    10
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}
const fn default_hard_cap() -> f64 {
    20.0
}
const fn default_soft_threshold() -> f64 {
    15.0
}
const fn default_throttle_delay() -> f64 {
    300.0
}
const fn default_confidence() -> f64 {
    0.95
}
const fn default_timeout_secs() -> u64 {
    120
}

impl GauntletConfig {
    /// Load configuration from a YAML file and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string and validate it
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or validation fails.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that must hold before any budget is spent
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weight_sum: f64 = self.domains.iter().map(|d| d.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(weight_sum));
        }

        if (self.confidence_level - 0.95).abs() > f64::EPSILON
            && (self.confidence_level - 0.99).abs() > f64::EPSILON
        {
            return Err(ConfigError::UnsupportedConfidence(self.confidence_level));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::InvalidCheckpointInterval);
        }
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if !(self.hard_cap_usd.is_finite() && self.hard_cap_usd > 0.0) {
            return Err(ConfigError::InvalidHardCap);
        }
        if !self.throttle_delay_seconds.is_finite() || self.throttle_delay_seconds < 0.0 {
            return Err(ConfigError::InvalidThrottleDelay(self.throttle_delay_seconds));
        }
        if !self.soft_cloud_threshold_usd.is_finite() || self.soft_cloud_threshold_usd < 0.0 {
            return Err(ConfigError::InvalidSoftThreshold(self.soft_cloud_threshold_usd));
        }

        for id in [&self.guards.baseline, &self.guards.challenger] {
            if !self.providers.iter().any(|p| &p.id == id) {
                return Err(ConfigError::UnknownProvider(id.clone()));
            }
        }

        let mut seen_metrics = Vec::new();
        for rule in &self.guards.rules {
            if seen_metrics.contains(&rule.metric) {
                return Err(ConfigError::DuplicateGuardMetric(rule.metric.name()));
            }
            seen_metrics.push(rule.metric);
        }

        Ok(())
    }

    /// Throttle delay as a `Duration`. Total for validated configs:
    /// `validate()` rejects negative and non-finite delays.
    #[must_use]
    pub fn throttle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.throttle_delay_seconds)
    }

    /// Per-call provider timeout as a `Duration`
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Weight for a domain, with a 0.1 fallback for untagged domains so
    /// unclassified items still contribute to the composite
    #[must_use]
    pub fn domain_weight(&self, domain: &str) -> f64 {
        self.domains
            .iter()
            .find(|d| d.name == domain)
            .map_or(0.1, |d| d.weight)
    }
}
