//! # Gauntlet
//!
//! Comparative benchmark engine for pitting a challenger model stack against
//! a baseline under hard cost controls and statistically honest comparison.
//!
//! ## Methodology
//!
//! - Wilson score intervals on success proportions (95% or 99% confidence)
//! - Confidence-interval overlap as a conservative significance gate
//! - Domain-weighted composite accuracy across heterogeneous test domains
//! - Dollar costs tracked against a hard cap with adaptive cloud throttling
//!
//! ## Architecture
//!
//! ```text
//! Dataset (JSONL | stub)
//!        ↓
//! Chunked Execution (fixed provider order, checkpoint every N chunks)
//!        ↓
//! Budget Governor (hard cap abort, soft cloud throttle)
//!        ↓
//! Composite Scorer (domain weights, Wilson CI, p95 latency)
//!        ↓
//! Guard Evaluation (ordered rules, short-circuit on first failure)
//!        ↓
//! Report (JSON | markdown)
//! ```

pub mod budget;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod guards;
pub mod provider;
pub mod report;
pub mod scorer;
pub mod scoring;
pub mod stats;

pub use budget::{BudgetError, BudgetGovernor, BudgetSnapshot};
pub use config::{
    Billing, ConfigError, DomainSpec, GauntletConfig, GuardSettings, ProviderSpec,
};
pub use dataset::{load_jsonl, stub_dataset, DatasetError, TestItem};
pub use engine::{
    Checkpoint, ChunkedExecutionEngine, EngineConfig, EngineError, EngineState, RunOutcome,
};
pub use guards::{evaluate_guards, Comparator, GuardMetric, GuardRule, GuardVerdict};
pub use provider::{
    ProviderClient, ProviderError, ProviderResponse, SimulatedProvider, SimulationProfile,
};
pub use report::{GauntletReport, ReportBuilder, RunStatus};
pub use scorer::{CompositeScorer, EvaluationResult, ProviderStatistics};
pub use scoring::{HeuristicScorer, ScoringAdapter};
pub use stats::{effect_size, intervals_overlap, wilson_interval, ConfidenceInterval};
