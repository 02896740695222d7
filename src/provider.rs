//! Provider client seam and the built-in simulated provider.
//!
//! Real deployments inject an HTTP client per provider; the engine only needs
//! text, cost, and token counts back from each call and measures latency
//! itself. `SimulatedProvider` is a deterministic stand-in for demo runs and
//! tests, seeded so repeated runs produce identical result logs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures of a single provider call.
///
/// These are expected, per-item events: the engine converts them into failed
/// results and keeps going.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// What a provider call returns when it completes
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Response text to be scored
    pub text: String,
    /// Model the provider actually used
    pub model_used: String,
    /// Cost of the call
    pub cost_usd: f64,
    /// Tokens consumed
    pub tokens_used: u64,
    /// Resource high-water mark during the call, 0 when not observable
    pub resource_mb: f64,
}

/// A candidate inference provider under benchmark
pub trait ProviderClient {
    /// Issue one prompt with a bounded timeout
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` on timeout or transport failure.
    fn complete(&mut self, prompt: &str, timeout: Duration)
        -> Result<ProviderResponse, ProviderError>;
}

/// Behavior profile for a simulated provider
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Model name reported in responses
    pub model: String,
    /// Probability of producing a well-formed answer
    pub quality: f64,
    /// Mean simulated latency in milliseconds
    pub base_latency_ms: u64,
    /// Cost charged per call
    pub cost_per_call_usd: f64,
    /// Probability of a transport failure
    pub failure_rate: f64,
    /// Resource usage reported per call
    pub resource_mb: f64,
}

/// Deterministic fake provider driven by a seeded rng
pub struct SimulatedProvider {
    profile: SimulationProfile,
    rng: ChaCha8Rng,
}

impl SimulatedProvider {
    /// Create a simulated provider with an explicit seed
    #[must_use]
    pub fn new(profile: SimulationProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Profile of a capable local council: accurate, fast, nearly free
    #[must_use]
    pub fn local_council(seed: u64) -> Self {
        Self::new(
            SimulationProfile {
                model: "council-v2".to_string(),
                quality: 0.85,
                base_latency_ms: 60,
                cost_per_call_usd: 0.0004,
                failure_rate: 0.02,
                resource_mb: 180.0,
            },
            seed,
        )
    }

    /// Profile of a hosted mega-model: accurate but slow and expensive
    #[must_use]
    pub fn hosted_megamodel(seed: u64) -> Self {
        Self::new(
            SimulationProfile {
                model: "medium-3".to_string(),
                quality: 0.75,
                base_latency_ms: 450,
                cost_per_call_usd: 0.012,
                failure_rate: 0.05,
                resource_mb: 0.0,
            },
            seed,
        )
    }

    fn render_answer(&mut self, prompt: &str) -> String {
        let good = self.rng.gen_bool(self.profile.quality.clamp(0.0, 1.0));
        if good {
            // Shaped to satisfy the heuristic scorer across domains:
            // structured numeric answer, reasoning connectives, code, units,
            // planning language, and enough length for the writing tier.
            let filler = "and the supporting detail follows logically ".repeat(12);
            format!(
                "First, plan the approach step by step. Because the problem asks us to solve \
                 directly, the answer = 42 m/s. In Python: def solve(): return 42. \
                 Therefore the result is established. {filler}"
            )
        } else if prompt.len() % 2 == 0 {
            "unclear".to_string()
        } else {
            "I am not able to determine that.".to_string()
        }
    }
}

impl ProviderClient for SimulatedProvider {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn complete(
        &mut self,
        prompt: &str,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        if self.rng.gen_bool(self.profile.failure_rate.clamp(0.0, 1.0)) {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }

        let jitter = self.rng.gen_range(0..=self.profile.base_latency_ms / 4 + 1);
        let simulated_latency = Duration::from_millis(self.profile.base_latency_ms + jitter);
        if simulated_latency > timeout {
            return Err(ProviderError::Timeout(timeout));
        }
        // Sleep microseconds per simulated millisecond so runs stay fast but
        // measured latencies remain nonzero and ordered.
        std::thread::sleep(Duration::from_micros(simulated_latency.as_millis() as u64));

        let text = self.render_answer(prompt);
        let tokens_used =
            (prompt.split_whitespace().count() + text.split_whitespace().count()) as u64;

        Ok(ProviderResponse {
            text,
            model_used: self.profile.model.clone(),
            cost_usd: self.profile.cost_per_call_usd,
            tokens_used,
            resource_mb: self.profile.resource_mb,
        })
    }
}
