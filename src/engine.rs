//! Chunked, checkpointed execution driver.
//!
//! A run proceeds chunk by chunk, sequentially, so budget accounting stays
//! exact and checkpoint semantics stay simple. Within a chunk, items are
//! dispatched to providers in the declared order, making the result log
//! deterministic and regression reports diffable. Item-level transport
//! failures never abort the run; only a hard budget-cap breach (or explicit
//! cancellation) does.

use crate::budget::{BudgetError, BudgetGovernor, BudgetSnapshot};
use crate::config::ProviderSpec;
use crate::dataset::TestItem;
use crate::provider::ProviderClient;
use crate::scorer::{CompositeScorer, EvaluationResult};
use crate::scoring::ScoringAdapter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Weight applied to items whose domain carries no configured weight
const FALLBACK_DOMAIN_WEIGHT: f64 = 0.1;

/// Run-level engine failures. Per-item transport errors are not represented
/// here; they become failed results.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("checkpoint I/O failed: {0}")]
    CheckpointIo(#[from] std::io::Error),

    #[error("checkpoint serialization failed: {0}")]
    CheckpointFormat(#[from] serde_json::Error),
}

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Constructed, not yet run
    Idle,
    /// Processing chunks
    Running,
    /// Writing a checkpoint file
    Checkpointing,
    /// All chunks processed
    Completed,
    /// Budget cap breached or cancelled; partial results preserved
    Aborted,
}

/// Resumable snapshot of run progress, written as a new JSON file each time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the last fully processed chunk
    pub chunk_index: usize,
    /// When the checkpoint was written
    pub timestamp: DateTime<Utc>,
    /// Budget counters at checkpoint time
    pub budget_state: BudgetSnapshot,
    /// Results recorded so far, prior runs included
    pub results_count: usize,
}

impl Checkpoint {
    /// Write the checkpoint as a new file under `dir`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, EngineError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("gauntlet_checkpoint_{:04}.json", self.chunk_index));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Load a checkpoint file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Engine tuning, separate from the full run configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items per chunk
    pub chunk_size: usize,
    /// Checkpoint every N chunks
    pub checkpoint_interval: usize,
    /// Where checkpoint files go; `None` disables checkpointing
    pub checkpoint_dir: Option<PathBuf>,
    /// Per-call provider timeout
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 38,
            checkpoint_interval: 10,
            checkpoint_dir: None,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Summary of a finished (or aborted) run
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    /// Terminal engine state
    pub state: EngineState,
    /// Chunks fully processed, resumed chunks included
    pub chunks_processed: usize,
    /// Total chunks in the dataset
    pub total_chunks: usize,
}

/// Drives per-item, per-provider evaluation over fixed-size chunks.
///
/// Constructed per run with its governor injected; all shared mutable state
/// (budget counters, result log) lives behind this engine's owned components
/// and is only touched through their documented operations.
pub struct ChunkedExecutionEngine {
    config: EngineConfig,
    governor: BudgetGovernor,
    scorer: CompositeScorer,
    state: EngineState,
    cancel: Arc<AtomicBool>,
    resume_from_chunk: usize,
    prior_results_count: usize,
    chunks_processed: usize,
}

impl ChunkedExecutionEngine {
    /// Create an engine for a fresh run
    #[must_use]
    pub fn new(config: EngineConfig, governor: BudgetGovernor) -> Self {
        Self {
            config,
            governor,
            scorer: CompositeScorer::new(),
            state: EngineState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            resume_from_chunk: 0,
            prior_results_count: 0,
            chunks_processed: 0,
        }
    }

    /// Create an engine that resumes from a checkpoint.
    ///
    /// The budget counters are restored from the snapshot and execution
    /// continues with the chunk after the last checkpointed one, so budget is
    /// never double-spent and already-scored chunks are never re-queried.
    #[must_use]
    pub fn resume(
        config: EngineConfig,
        mut governor: BudgetGovernor,
        checkpoint: &Checkpoint,
    ) -> Self {
        governor.restore(&checkpoint.budget_state);
        tracing::info!(
            chunk_index = checkpoint.chunk_index,
            total_spend_usd = checkpoint.budget_state.total_spend_usd,
            "resuming from checkpoint"
        );
        Self {
            config,
            governor,
            scorer: CompositeScorer::new(),
            state: EngineState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
            resume_from_chunk: checkpoint.chunk_index + 1,
            prior_results_count: checkpoint.results_count,
            chunks_processed: checkpoint.chunk_index + 1,
        }
    }

    /// Shared flag for cooperative cancellation, checked between items
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Result log accumulated so far
    #[must_use]
    pub const fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Budget governor, for spend reporting
    #[must_use]
    pub const fn governor(&self) -> &BudgetGovernor {
        &self.governor
    }

    /// Chunks fully processed, resumed chunks included
    #[must_use]
    pub const fn chunks_processed(&self) -> usize {
        self.chunks_processed
    }

    /// Results recorded across this run and any resumed-from runs
    #[must_use]
    pub fn results_count(&self) -> usize {
        self.prior_results_count + self.scorer.len()
    }

    /// Consume the engine, yielding its scorer and governor for reporting
    #[must_use]
    pub fn into_parts(self) -> (CompositeScorer, BudgetGovernor) {
        (self.scorer, self.governor)
    }

    /// Run the full dataset.
    ///
    /// Providers are dispatched in slice order for every item. Item-level
    /// failures are recorded and skipped over; a hard budget breach aborts
    /// with all results gathered so far preserved in the scorer.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Budget` when the hard cap is breached, or a
    /// checkpoint error if a checkpoint file cannot be written.
    pub fn run(
        &mut self,
        items: &[TestItem],
        providers: &mut [(ProviderSpec, Box<dyn ProviderClient>)],
        scoring: &dyn ScoringAdapter,
        weights: &HashMap<String, f64>,
    ) -> Result<RunOutcome, EngineError> {
        self.state = EngineState::Running;
        let total_chunks = items.len().div_ceil(self.config.chunk_size);

        'chunks: for (chunk_index, chunk) in items.chunks(self.config.chunk_size).enumerate() {
            if chunk_index < self.resume_from_chunk {
                continue;
            }

            for item in chunk {
                if self.cancel.load(Ordering::Relaxed) {
                    tracing::warn!(chunk = chunk_index, "run cancelled");
                    self.state = EngineState::Aborted;
                    break 'chunks;
                }

                for (spec, client) in providers.iter_mut() {
                    self.evaluate_item(item, spec, client.as_mut(), scoring, weights, chunk_index)?;
                }
            }

            self.chunks_processed = chunk_index + 1;
            tracing::info!(
                chunk = chunk_index + 1,
                total = total_chunks,
                spend_usd = self.governor.total_spend_usd(),
                results = self.results_count(),
                "chunk complete"
            );

            // No checkpoint after the final chunk: a checkpoint always refers
            // to a chunk index below the total chunk count.
            if (chunk_index + 1) % self.config.checkpoint_interval == 0
                && chunk_index + 1 < total_chunks
            {
                self.write_checkpoint(chunk_index)?;
            }
        }

        if self.state == EngineState::Running {
            self.state = EngineState::Completed;
        }
        Ok(RunOutcome {
            state: self.state,
            chunks_processed: self.chunks_processed,
            total_chunks,
        })
    }

    fn evaluate_item(
        &mut self,
        item: &TestItem,
        spec: &ProviderSpec,
        client: &mut dyn ProviderClient,
        scoring: &dyn ScoringAdapter,
        weights: &HashMap<String, f64>,
        chunk_index: usize,
    ) -> Result<(), EngineError> {
        // The governor only reports the delay; the sleep happens here so the
        // governor stays side-effect free.
        if let Some(delay) = self.governor.check_throttle(&spec.id) {
            tracing::info!(
                provider = %spec.id,
                cloud_spend_usd = self.governor.cloud_spend_usd(),
                delay_secs = delay.as_secs_f64(),
                "adaptive throttle engaged"
            );
            std::thread::sleep(delay);
        }

        let started = Instant::now();
        match client.complete(&item.prompt, self.config.request_timeout) {
            Ok(response) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                let accuracy = scoring.score(
                    &item.prompt,
                    &response.text,
                    &item.domain,
                    &item.scoring_method,
                );
                let domain_weight = weights
                    .get(&item.domain)
                    .copied()
                    .unwrap_or(FALLBACK_DOMAIN_WEIGHT);
                let cost_usd = response.cost_usd;

                self.scorer.add_result(EvaluationResult {
                    provider_id: spec.id.clone(),
                    model_name: response.model_used,
                    domain: item.domain.clone(),
                    latency_ms,
                    cost_usd,
                    success: true,
                    accuracy_score: accuracy,
                    domain_weight,
                    weighted_score: accuracy * domain_weight,
                    tokens_used: response.tokens_used,
                    resource_mb: response.resource_mb,
                    chunk_id: chunk_index,
                    error: None,
                });

                if let Err(err) = self.governor.record_cost(&spec.id, cost_usd) {
                    tracing::error!(provider = %spec.id, error = %err, "hard budget cap breached, aborting run");
                    self.state = EngineState::Aborted;
                    return Err(err.into());
                }
            }
            Err(err) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                tracing::debug!(
                    provider = %spec.id,
                    item = item.item_index,
                    error = %err,
                    "provider call failed"
                );
                self.scorer.add_result(EvaluationResult::failed(
                    &spec.id,
                    &spec.model,
                    &item.domain,
                    latency_ms,
                    chunk_index,
                    err.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn write_checkpoint(&mut self, chunk_index: usize) -> Result<(), EngineError> {
        let Some(dir) = self.config.checkpoint_dir.clone() else {
            return Ok(());
        };
        self.state = EngineState::Checkpointing;
        let checkpoint = Checkpoint {
            chunk_index,
            timestamp: Utc::now(),
            budget_state: self.governor.snapshot(),
            results_count: self.results_count(),
        };
        let path = checkpoint.save(&dir)?;
        tracing::info!(path = %path.display(), chunk = chunk_index, "checkpoint saved");
        self.state = EngineState::Running;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::Billing;
    use crate::provider::{ProviderError, ProviderResponse};

    /// Provider that answers every prompt identically at a fixed cost
    struct ScriptedProvider {
        cost_usd: f64,
        fail: bool,
    }

    impl ProviderClient for ScriptedProvider {
        fn complete(
            &mut self,
            _prompt: &str,
            _timeout: Duration,
        ) -> Result<ProviderResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::Transport("connection refused".to_string()));
            }
            Ok(ProviderResponse {
                text: "The answer = 42".to_string(),
                model_used: "scripted".to_string(),
                cost_usd: self.cost_usd,
                tokens_used: 10,
                resource_mb: 0.0,
            })
        }
    }

    /// Scorer that returns a constant accuracy
    struct ConstScorer(f64);

    impl ScoringAdapter for ConstScorer {
        fn score(&self, _p: &str, _r: &str, _d: &str, _m: &str) -> f64 {
            self.0
        }
    }

    fn items(n: usize) -> Vec<TestItem> {
        (0..n)
            .map(|i| TestItem {
                prompt: format!("prompt {i}"),
                domain: "math".to_string(),
                scoring_method: "exact_numeric".to_string(),
                item_index: i,
            })
            .collect()
    }

    fn spec(id: &str) -> ProviderSpec {
        ProviderSpec {
            id: id.to_string(),
            model: "scripted".to_string(),
            billing: Billing::Local,
        }
    }

    fn providers(costs: &[(&str, f64)]) -> Vec<(ProviderSpec, Box<dyn ProviderClient>)> {
        costs
            .iter()
            .map(|(id, cost)| {
                (
                    spec(id),
                    Box::new(ScriptedProvider {
                        cost_usd: *cost,
                        fail: false,
                    }) as Box<dyn ProviderClient>,
                )
            })
            .collect()
    }

    fn weights() -> HashMap<String, f64> {
        HashMap::from([("math".to_string(), 1.0)])
    }

    fn engine(chunk_size: usize, cap: f64) -> ChunkedExecutionEngine {
        let config = EngineConfig {
            chunk_size,
            checkpoint_interval: 100,
            checkpoint_dir: None,
            request_timeout: Duration::from_secs(5),
        };
        ChunkedExecutionEngine::new(
            config,
            BudgetGovernor::new(cap, cap, Duration::from_millis(1)),
        )
    }

    #[test]
    fn test_run_completes_all_items() {
        let mut eng = engine(3, 100.0);
        let mut provs = providers(&[("a", 0.01), ("b", 0.02)]);

        let outcome = eng
            .run(&items(7), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        assert_eq!(outcome.state, EngineState::Completed);
        assert_eq!(outcome.total_chunks, 3);
        assert_eq!(outcome.chunks_processed, 3);
        // 7 items x 2 providers
        assert_eq!(eng.results_count(), 14);
        assert!((eng.governor().total_spend_usd() - 0.21).abs() < 1e-9);
    }

    #[test]
    fn test_result_order_deterministic() {
        let mut eng = engine(2, 100.0);
        let mut provs = providers(&[("a", 0.01), ("b", 0.01)]);
        eng.run(&items(2), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        let order: Vec<&str> = eng
            .scorer()
            .results()
            .iter()
            .map(|r| r.provider_id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn test_transport_failure_recorded_not_fatal() {
        let mut eng = engine(4, 100.0);
        let mut provs: Vec<(ProviderSpec, Box<dyn ProviderClient>)> = vec![
            (
                spec("flaky"),
                Box::new(ScriptedProvider {
                    cost_usd: 0.01,
                    fail: true,
                }),
            ),
            (
                spec("steady"),
                Box::new(ScriptedProvider {
                    cost_usd: 0.01,
                    fail: false,
                }),
            ),
        ];

        let outcome = eng
            .run(&items(4), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        assert_eq!(outcome.state, EngineState::Completed);
        let results = eng.scorer().results();
        assert_eq!(results.len(), 8);
        let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failures.len(), 4);
        assert!(failures.iter().all(|r| r.provider_id == "flaky"));
        assert!(failures.iter().all(|r| r.accuracy_score == 0.0));
        assert!(failures.iter().all(|r| r.error.is_some()));
    }

    #[test]
    fn test_budget_breach_aborts_preserving_results() {
        let mut eng = engine(4, 10.0);
        let mut provs = providers(&[("pricey", 6.0)]);

        let err = eng
            .run(&items(4), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap_err();

        assert!(matches!(err, EngineError::Budget(BudgetError::CapExceeded { .. })));
        assert_eq!(eng.state(), EngineState::Aborted);
        // Both calls happened and are preserved; only the first cost landed
        assert_eq!(eng.results_count(), 2);
        assert_eq!(eng.governor().total_spend_usd(), 6.0);
    }

    #[test]
    fn test_cancellation_between_items() {
        let mut eng = engine(4, 100.0);
        eng.cancel_flag().store(true, Ordering::Relaxed);
        let mut provs = providers(&[("a", 0.01)]);

        let outcome = eng
            .run(&items(4), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        assert_eq!(outcome.state, EngineState::Aborted);
        assert_eq!(eng.results_count(), 0);
    }

    #[test]
    fn test_checkpoint_written_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            chunk_size: 2,
            checkpoint_interval: 2,
            checkpoint_dir: Some(dir.path().to_path_buf()),
            request_timeout: Duration::from_secs(5),
        };
        let mut eng = ChunkedExecutionEngine::new(
            config,
            BudgetGovernor::new(100.0, 100.0, Duration::from_millis(1)),
        );
        let mut provs = providers(&[("a", 0.01)]);

        // 10 items, chunk size 2 -> 5 chunks; checkpoints after chunks 2 and 4
        eng.run(&items(10), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        let checkpoint = Checkpoint::load(dir.path().join("gauntlet_checkpoint_0003.json")).unwrap();
        assert_eq!(checkpoint.chunk_index, 3);
        assert_eq!(checkpoint.results_count, 8);
        assert!((checkpoint.budget_state.total_spend_usd - 0.08).abs() < 1e-9);
        assert!(dir.path().join("gauntlet_checkpoint_0001.json").exists());
    }

    #[test]
    fn test_no_checkpoint_after_final_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            chunk_size: 2,
            checkpoint_interval: 2,
            checkpoint_dir: Some(dir.path().to_path_buf()),
            request_timeout: Duration::from_secs(5),
        };
        let mut eng = ChunkedExecutionEngine::new(
            config,
            BudgetGovernor::new(100.0, 100.0, Duration::from_millis(1)),
        );
        let mut provs = providers(&[("a", 0.01)]);

        // 4 items -> 2 chunks; interval 2 would fire after the last chunk
        eng.run(&items(4), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        assert!(!dir.path().join("gauntlet_checkpoint_0001.json").exists());
    }

    #[test]
    fn test_resume_skips_completed_chunks() {
        let checkpoint = Checkpoint {
            chunk_index: 1,
            timestamp: Utc::now(),
            budget_state: BudgetSnapshot {
                total_spend_usd: 0.04,
                cloud_spend_usd: 0.0,
            },
            results_count: 4,
        };
        let config = EngineConfig {
            chunk_size: 2,
            checkpoint_interval: 100,
            checkpoint_dir: None,
            request_timeout: Duration::from_secs(5),
        };
        let governor = BudgetGovernor::new(100.0, 100.0, Duration::from_millis(1));
        let mut eng = ChunkedExecutionEngine::resume(config, governor, &checkpoint);
        let mut provs = providers(&[("a", 0.01)]);

        // 8 items -> 4 chunks; chunks 0 and 1 are already done
        let outcome = eng
            .run(&items(8), &mut provs, &ConstScorer(0.9), &weights())
            .unwrap();

        assert_eq!(outcome.state, EngineState::Completed);
        assert_eq!(eng.scorer().len(), 4);
        assert_eq!(eng.results_count(), 8);
        assert!((eng.governor().total_spend_usd() - 0.08).abs() < 1e-9);
        // Re-executed chunks would have ids below 2
        assert!(eng.scorer().results().iter().all(|r| r.chunk_id >= 2));
    }

    #[test]
    fn test_domain_weight_copied_at_scoring_time() {
        let mut eng = engine(4, 100.0);
        let mut provs = providers(&[("a", 0.01)]);
        let weights = HashMap::from([("math".to_string(), 0.6)]);

        eng.run(&items(2), &mut provs, &ConstScorer(0.5), &weights)
            .unwrap();

        for result in eng.scorer().results() {
            assert_eq!(result.domain_weight, 0.6);
            assert_eq!(result.weighted_score, 0.5 * 0.6);
        }
    }

    #[test]
    fn test_unknown_domain_falls_back_to_default_weight() {
        let mut eng = engine(4, 100.0);
        let mut provs = providers(&[("a", 0.01)]);

        eng.run(&items(1), &mut provs, &ConstScorer(1.0), &HashMap::new())
            .unwrap();

        assert_eq!(eng.scorer().results()[0].domain_weight, FALLBACK_DOMAIN_WEIGHT);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint {
            chunk_index: 7,
            timestamp: Utc::now(),
            budget_state: BudgetSnapshot {
                total_spend_usd: 1.5,
                cloud_spend_usd: 0.5,
            },
            results_count: 42,
        };
        let path = checkpoint.save(dir.path()).unwrap();
        let loaded = Checkpoint::load(path).unwrap();
        assert_eq!(loaded.chunk_index, 7);
        assert_eq!(loaded.results_count, 42);
        assert_eq!(loaded.budget_state.total_spend_usd, 1.5);
    }
}
