//! # Market
//!
//! Routes jobs to agents and settles the results.
//!
//! ```text
//! JobGenerator ──► GenerationLoop ──► Dispatcher ──► [queue per agent]
//!                                                          │
//!                                                     AgentWorker
//!                                          capability ─► Grader ─► store.settle()
//! ```
//!
//! Jobs for one agent are worked strictly in order; agents run in parallel.

pub mod agent;
pub mod dispatcher;
pub mod generator;
pub mod grader;
pub mod metrics;
pub mod worker;

pub use agent::{AgentCapability, AgentOutput, AgentProfile};
pub use dispatcher::Dispatcher;
pub use generator::{GenerationLoop, JobGenerator, TemplateJobGenerator};
pub use grader::Grader;
pub use metrics::{MarketMetrics, MarketSnapshot};
pub use worker::{AgentWorker, JobOutcome};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Market configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Charged for a failed job
    pub fail_penalty: i64,
    /// Jobs requested from the generator per interval
    pub jobs_per_interval: usize,
    /// Seconds between generation rounds
    pub generation_interval_secs: u64,
    /// Extra settlement attempts after the first failure
    pub commit_retries: u32,
    /// Base backoff between settlement attempts
    pub retry_backoff_ms: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            fail_penalty: arena_common::DEFAULT_FAIL_PENALTY,
            jobs_per_interval: 10,
            generation_interval_secs: 60,
            commit_retries: 2,
            retry_backoff_ms: 50,
        }
    }
}

impl MarketConfig {
    pub fn generation_interval(&self) -> Duration {
        Duration::from_secs(self.generation_interval_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
