//! Per-agent worker
//!
//! Drains one agent's queue strictly in order. For every job:
//!
//! ```text
//! 1. start clock
//! 2. capability.handle(profile, job)      error => failed, 0 units
//! 3. Grader::grade(category, payload, artifact)
//! 4. store.settle(browser_steps + payout|fail + attempt)   one commit
//! ```
//!
//! The commit is retried `commit_retries` times. A job whose commit never
//! succeeds is reported lost and the worker moves on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arena_common::{AgentState, ArenaError, DispatchError, Job, Result, Settlement, StoreError};
use arena_ledger::PopulationStore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::agent::{AgentCapability, AgentProfile};
use crate::grader::Grader;
use crate::metrics::MarketMetrics;
use crate::MarketConfig;

/// Settled result of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub agent_id: Uuid,
    pub won: bool,
    pub resource_units: u64,
    /// Net balance change
    pub delta: i64,
    pub elapsed_secs: u64,
    /// Balance after settlement
    pub balance: i64,
}

pub struct AgentWorker {
    agent_id: Uuid,
    store: Arc<dyn PopulationStore>,
    capability: Arc<dyn AgentCapability>,
    metrics: Arc<MarketMetrics>,
    config: MarketConfig,
}

impl AgentWorker {
    pub fn new(
        agent_id: Uuid,
        store: Arc<dyn PopulationStore>,
        capability: Arc<dyn AgentCapability>,
        metrics: Arc<MarketMetrics>,
        config: MarketConfig,
    ) -> Self {
        Self {
            agent_id,
            store,
            capability,
            metrics,
            config,
        }
    }

    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Work and settle a single job
    #[instrument(skip(self, job), fields(agent_id = %self.agent_id, job_id = %job.id))]
    pub async fn process(&self, job: Job) -> Result<JobOutcome> {
        let agent = self
            .store
            .get_agent(&self.agent_id)
            .await
            .ok_or(StoreError::AgentNotFound(self.agent_id))?;
        if !agent.alive {
            return Err(DispatchError::AgentNotAlive(self.agent_id).into());
        }
        let blueprint = self
            .store
            .get_blueprint(&agent.blueprint_id)
            .await
            .ok_or(StoreError::BlueprintNotFound(agent.blueprint_id))?;
        let profile = AgentProfile::new(self.agent_id, &blueprint);

        let started = Instant::now();
        let (won, resource_units) = match self.capability.handle(&profile, &job).await {
            Ok(output) => (
                Grader::grade(&job.category, &job.payload, &output.artifact),
                output.resource_units_used,
            ),
            Err(e) => {
                warn!(error = %e, "Agent failed, grading as failure");
                self.metrics.record_agent_error();
                (false, 0)
            }
        };
        let elapsed_secs = started.elapsed().as_secs();

        let settlement = Settlement::graded(
            self.agent_id,
            &job,
            resource_units,
            won,
            self.config.fail_penalty,
            elapsed_secs,
        );
        let state = self.commit(&settlement).await?;
        self.metrics.record_outcome(won);

        let outcome = JobOutcome {
            job_id: job.id,
            agent_id: self.agent_id,
            won,
            resource_units,
            delta: settlement.net_delta(),
            elapsed_secs,
            balance: state.balance,
        };

        info!(
            category = %job.category,
            won,
            delta = outcome.delta,
            balance = outcome.balance,
            elapsed_secs,
            "Job settled"
        );
        Ok(outcome)
    }

    /// Settle with retries
    async fn commit(&self, settlement: &Settlement) -> Result<AgentState> {
        let attempts = self.config.commit_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.store.settle(settlement).await {
                Ok(state) => return Ok(state),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Settlement failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_backoff() * attempt).await;
                    }
                }
            }
        }

        self.metrics.record_lost();
        Err(ArenaError::JobLost {
            job_id: settlement.job_id,
            attempts,
            reason: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Consume the queue until every sender is dropped
    pub async fn run(self, mut jobs: mpsc::UnboundedReceiver<Job>, depth: Arc<AtomicUsize>) {
        debug!(agent_id = %self.agent_id, "Worker started");

        while let Some(job) = jobs.recv().await {
            depth.fetch_sub(1, Ordering::SeqCst);
            let job_id = job.id;

            match self.process(job).await {
                Ok(_) => {}
                Err(ArenaError::Dispatch(DispatchError::AgentNotAlive(_))) => {
                    self.metrics.record_discarded();
                    info!(agent_id = %self.agent_id, job_id = %job_id, "Agent culled, discarding queued job");
                }
                Err(e) => {
                    error!(agent_id = %self.agent_id, job_id = %job_id, error = %e, "Job not settled");
                }
            }
        }

        debug!(agent_id = %self.agent_id, "Worker stopped");
    }
}
