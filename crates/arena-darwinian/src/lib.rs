//! # Darwinian
//!
//! Epoch-driven population management for the Arena simulation.
//!
//! ## Epoch
//!
//! ```text
//! 1. metrics       gini + top-K share of alive balances -> metrics sink
//! 2. reproduction  balance >= min_balance  =>  one mutated offspring
//! 3. culling       bottom ceil(n × 20%) (min 1)  ∪  balance < 0
//! ```
//!
//! ## Gini
//!
//! ```text
//! G = (2 × Σ(i+1)·b[i] − (n+1) × Σb) / (n × Σb)      b sorted ascending
//! ```

pub mod culling;
pub mod inequality;
pub mod reproduction;
pub mod scheduler;
pub mod telemetry;

pub use culling::CullingPolicy;
pub use inequality::InequalityCalculator;
pub use reproduction::{MutationStrategy, OneTraitMutation};
pub use scheduler::{EpochReport, EpochScheduler};
pub use telemetry::{CsvMetricsSink, EpochTelemetry, InequalitySample, MemoryMetricsSink, MetricsSink};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Epoch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochConfig {
    /// Minutes between epoch ticks
    pub epoch_minutes: u64,
    /// Number of agents in the top-K share
    pub top_k: usize,
    /// Share of the alive population culled per epoch (percent)
    pub cull_percent: u32,
    /// Charged to each parent per offspring
    pub reproduction_cost: i64,
    /// Starting balance of an offspring
    pub offspring_balance: i64,
    /// Starting reputation of an offspring
    pub offspring_reputation: f64,
    /// Seed for the mutation RNG
    pub rng_seed: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            epoch_minutes: arena_common::DEFAULT_EPOCH_MINUTES,
            top_k: arena_common::DEFAULT_TOP_K,
            cull_percent: arena_common::DEFAULT_CULL_PERCENT,
            reproduction_cost: arena_common::REPRODUCTION_COST,
            offspring_balance: arena_common::OFFSPRING_BALANCE,
            offspring_reputation: arena_common::DEFAULT_REPUTATION,
            rng_seed: 42,
        }
    }
}

impl EpochConfig {
    /// Tick interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.epoch_minutes.max(1) * 60)
    }
}
