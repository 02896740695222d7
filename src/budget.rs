//! Spend tracking with a hard cap and soft adaptive throttling.
//!
//! The governor is the only component allowed to mutate budget counters.
//! It is side-effect free: `check_throttle` reports the mandatory delay but
//! the execution engine performs the actual sleep, which keeps the governor
//! independently testable.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by budget enforcement
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("budget cap exceeded: ${attempted_usd:.4} > ${cap_usd:.4}")]
    CapExceeded { attempted_usd: f64, cap_usd: f64 },
}

/// Serializable snapshot of the spend counters, embedded in checkpoints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Cumulative spend across all providers
    pub total_spend_usd: f64,
    /// Cumulative spend on cloud-billed providers
    pub cloud_spend_usd: f64,
}

/// Tracks cumulative spend and enforces the run's budget policy.
///
/// Two distinct controls: the hard cap aborts the run, while the soft cloud
/// threshold only delays further cloud calls.
#[derive(Debug)]
pub struct BudgetGovernor {
    total_spend_usd: f64,
    cloud_spend_usd: f64,
    hard_cap_usd: f64,
    soft_threshold_usd: f64,
    throttle_delay: Duration,
    cloud_providers: HashSet<String>,
}

impl BudgetGovernor {
    /// Create a governor with zeroed counters
    #[must_use]
    pub fn new(hard_cap_usd: f64, soft_threshold_usd: f64, throttle_delay: Duration) -> Self {
        Self {
            total_spend_usd: 0.0,
            cloud_spend_usd: 0.0,
            hard_cap_usd,
            soft_threshold_usd,
            throttle_delay,
            cloud_providers: HashSet::new(),
        }
    }

    /// Classify a provider as cloud-billed for threshold accounting
    pub fn mark_cloud(&mut self, provider_id: &str) {
        self.cloud_providers.insert(provider_id.to_string());
    }

    /// Check whether a provider is classified as cloud-billed
    #[must_use]
    pub fn is_cloud(&self, provider_id: &str) -> bool {
        self.cloud_providers.contains(provider_id)
    }

    /// Record the cost of one provider call.
    ///
    /// The amount is checked against the hard cap before being committed, so
    /// a rejected call leaves both counters untouched.
    ///
    /// # Errors
    ///
    /// Returns `BudgetError::CapExceeded` when the addition would push total
    /// spend past the hard cap. This is fatal for the run.
    pub fn record_cost(&mut self, provider_id: &str, amount_usd: f64) -> Result<(), BudgetError> {
        let attempted_usd = self.total_spend_usd + amount_usd;
        if attempted_usd > self.hard_cap_usd {
            return Err(BudgetError::CapExceeded {
                attempted_usd,
                cap_usd: self.hard_cap_usd,
            });
        }

        self.total_spend_usd = attempted_usd;
        if self.cloud_providers.contains(provider_id) {
            self.cloud_spend_usd += amount_usd;
        }
        Ok(())
    }

    /// Mandatory pause before the next call to this provider, if throttled.
    ///
    /// Only cloud-billed providers are throttled, so one provider's delay
    /// never stalls local dispatch. Returns `None` while cloud spend is under
    /// the soft threshold.
    #[must_use]
    pub fn check_throttle(&self, provider_id: &str) -> Option<Duration> {
        if self.is_cloud(provider_id) && self.cloud_spend_usd >= self.soft_threshold_usd {
            Some(self.throttle_delay)
        } else {
            None
        }
    }

    /// Cumulative spend across all providers
    #[must_use]
    pub fn total_spend_usd(&self) -> f64 {
        self.total_spend_usd
    }

    /// Cumulative spend on cloud-billed providers
    #[must_use]
    pub fn cloud_spend_usd(&self) -> f64 {
        self.cloud_spend_usd
    }

    /// Hard spending cap for the run
    #[must_use]
    pub fn hard_cap_usd(&self) -> f64 {
        self.hard_cap_usd
    }

    /// Snapshot the counters for checkpointing
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            total_spend_usd: self.total_spend_usd,
            cloud_spend_usd: self.cloud_spend_usd,
        }
    }

    /// Restore counters from a checkpoint snapshot when resuming a run
    pub fn restore(&mut self, snapshot: &BudgetSnapshot) {
        self.total_spend_usd = snapshot.total_spend_usd;
        self.cloud_spend_usd = snapshot.cloud_spend_usd;
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn governor(cap: f64, soft: f64) -> BudgetGovernor {
        BudgetGovernor::new(cap, soft, Duration::from_secs(30))
    }

    #[test]
    fn test_spend_accumulates() {
        let mut gov = governor(100.0, 50.0);
        gov.record_cost("local", 1.5).unwrap();
        gov.record_cost("local", 2.5).unwrap();
        assert_eq!(gov.total_spend_usd(), 4.0);
        assert_eq!(gov.cloud_spend_usd(), 0.0);
    }

    #[test]
    fn test_cloud_spend_tracked_separately() {
        let mut gov = governor(100.0, 50.0);
        gov.mark_cloud("hosted");
        assert!(gov.is_cloud("hosted"));
        assert!(!gov.is_cloud("local"));
        gov.record_cost("local", 1.0).unwrap();
        gov.record_cost("hosted", 2.0).unwrap();
        assert_eq!(gov.total_spend_usd(), 3.0);
        assert_eq!(gov.cloud_spend_usd(), 2.0);
    }

    #[test]
    fn test_monotonic_total() {
        let mut gov = governor(1000.0, 500.0);
        let amounts = [0.0, 0.5, 1.25, 0.0, 3.0];
        let mut previous = 0.0;
        for amount in amounts {
            gov.record_cost("p", amount).unwrap();
            assert!(gov.total_spend_usd() >= previous);
            previous = gov.total_spend_usd();
        }
        assert_eq!(gov.total_spend_usd(), 4.75);
    }

    #[test]
    fn test_hard_cap_enforcement() {
        let mut gov = governor(10.0, 100.0);
        gov.record_cost("p", 6.0).unwrap();

        let err = gov.record_cost("p", 5.0).unwrap_err();
        assert!(matches!(err, BudgetError::CapExceeded { .. }));

        // The rejected amount must not be committed, not even partially
        assert_eq!(gov.total_spend_usd(), 6.0);
    }

    #[test]
    fn test_spend_exactly_at_cap_allowed() {
        let mut gov = governor(10.0, 100.0);
        gov.record_cost("p", 10.0).unwrap();
        assert_eq!(gov.total_spend_usd(), 10.0);
    }

    #[test]
    fn test_throttle_below_threshold() {
        let mut gov = governor(100.0, 5.0);
        gov.mark_cloud("hosted");
        gov.record_cost("hosted", 4.9).unwrap();
        assert!(gov.check_throttle("hosted").is_none());
    }

    #[test]
    fn test_throttle_at_threshold() {
        let mut gov = governor(100.0, 5.0);
        gov.mark_cloud("hosted");
        gov.record_cost("hosted", 5.0).unwrap();
        assert_eq!(gov.check_throttle("hosted"), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_throttle_never_applies_to_local() {
        let mut gov = governor(100.0, 5.0);
        gov.mark_cloud("hosted");
        gov.record_cost("hosted", 9.0).unwrap();
        // Cloud is throttled, local dispatch is not
        assert!(gov.check_throttle("hosted").is_some());
        assert!(gov.check_throttle("local").is_none());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut gov = governor(100.0, 50.0);
        gov.mark_cloud("hosted");
        gov.record_cost("hosted", 3.0).unwrap();
        gov.record_cost("local", 1.0).unwrap();
        let snapshot = gov.snapshot();

        let mut resumed = governor(100.0, 50.0);
        resumed.mark_cloud("hosted");
        resumed.restore(&snapshot);
        assert_eq!(resumed.total_spend_usd(), 4.0);
        assert_eq!(resumed.cloud_spend_usd(), 3.0);
    }

    #[test]
    fn test_budget_error_display() {
        let mut gov = governor(1.0, 1.0);
        let err = gov.record_cost("p", 2.0).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2.0000"));
        assert!(msg.contains("1.0000"));
    }
}
