//! Epoch scheduler
//!
//! Runs metrics, reproduction and culling as sequential passes over one read
//! of the alive population. Culling ranks the population as it stands after
//! reproduction, so offspring created in this epoch are already candidates.
//! Offspring, parent charges and culls are committed to the store in a single
//! step: a failed epoch changes nothing and can simply run again. Only one
//! epoch runs at a time.

use std::collections::HashMap;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arena_common::{AgentState, ArenaError, Result};
use arena_ledger::{EpochCommit, Offspring, PopulationStore};
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::culling::CullingPolicy;
use crate::inequality::InequalityCalculator;
use crate::reproduction::{self, MutationStrategy, OneTraitMutation};
use crate::telemetry::{EpochTelemetry, InequalitySample, MetricsSink};
use crate::EpochConfig;

/// Outcome of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: u64,
    pub gini: f64,
    pub top_k_share: f64,
    pub alive_before: usize,
    /// Offspring created
    pub offspring: usize,
    /// Alive agents skipped for reproduction because their blueprint is missing
    pub reproduction_failures: usize,
    pub culled: Vec<Uuid>,
    pub alive_after: usize,
}

pub struct EpochScheduler {
    store: Arc<dyn PopulationStore>,
    sink: Arc<dyn MetricsSink>,
    config: EpochConfig,
    culling: CullingPolicy,
    mutation: Box<dyn MutationStrategy>,
    rng: Mutex<StdRng>,
    /// Held for the duration of an epoch
    running: tokio::sync::Mutex<()>,
    epochs: AtomicU64,
    telemetry: Option<Arc<EpochTelemetry>>,
}

impl EpochScheduler {
    pub fn new(store: Arc<dyn PopulationStore>, sink: Arc<dyn MetricsSink>, config: EpochConfig) -> Self {
        Self {
            store,
            sink,
            culling: CullingPolicy::new(config.cull_percent),
            mutation: Box::new(OneTraitMutation::default()),
            rng: Mutex::new(StdRng::seed_from_u64(config.rng_seed)),
            running: tokio::sync::Mutex::new(()),
            epochs: AtomicU64::new(0),
            telemetry: None,
            config,
        }
    }

    /// Replace the mutation strategy
    pub fn with_mutation(mut self, mutation: Box<dyn MutationStrategy>) -> Self {
        self.mutation = mutation;
        self
    }

    /// Publish epoch reports to Prometheus
    pub fn with_telemetry(mut self, telemetry: Arc<EpochTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn config(&self) -> &EpochConfig {
        &self.config
    }

    /// Completed epochs
    pub fn epochs_run(&self) -> u64 {
        self.epochs.load(Ordering::SeqCst)
    }

    /// Wait for a running epoch to finish.
    ///
    /// No epoch starts while the guard is held.
    pub async fn pause(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.running.lock().await
    }

    /// Run one epoch now.
    ///
    /// Fails with [`ArenaError::EpochInProgress`] if another epoch is running.
    #[instrument(skip(self))]
    pub async fn run_epoch(&self) -> Result<EpochReport> {
        let epoch = self.epochs.load(Ordering::SeqCst) + 1;
        let _running = self
            .running
            .try_lock()
            .map_err(|_| ArenaError::EpochInProgress(epoch))?;

        let alive = self.store.alive_agents().await;
        let sample = self.measure(&alive);
        let (offspring, reproduction_failures) = self.plan_reproduction(&alive).await;
        let culled = self.culling.select(&Self::after_reproduction(&alive, &offspring));

        let applied = self
            .store
            .commit_epoch(EpochCommit {
                offspring,
                culled: culled.clone(),
            })
            .await?;
        let alive_after = self.store.alive_agents().await.len();

        if let Err(e) = self.sink.record(&sample) {
            warn!(error = %e, "Failed to record epoch metrics");
        }

        let offspring = applied.offspring.len();
        let report = EpochReport {
            epoch,
            gini: sample.gini,
            top_k_share: sample.top_k_share,
            alive_before: alive.len(),
            offspring,
            reproduction_failures,
            culled,
            alive_after,
        };

        self.epochs.store(epoch, Ordering::SeqCst);
        if let Some(telemetry) = &self.telemetry {
            telemetry.observe(&report);
        }

        info!(
            epoch,
            gini = format!("{:.4}", report.gini),
            top_k_share = format!("{:.4}", report.top_k_share),
            offspring,
            culled = report.culled.len(),
            alive = alive_after,
            "Epoch complete"
        );
        Ok(report)
    }

    /// Inequality over alive balances
    fn measure(&self, alive: &[AgentState]) -> InequalitySample {
        let balances: Vec<i64> = alive.iter().map(|a| a.balance).collect();
        InequalitySample {
            timestamp: Utc::now(),
            gini: InequalityCalculator::gini(&balances),
            top_k_share: InequalityCalculator::top_k_share(&balances, self.config.top_k),
        }
    }

    /// One offspring per eligible parent; returns (planned, skipped)
    async fn plan_reproduction(&self, alive: &[AgentState]) -> (Vec<Offspring>, usize) {
        let mut planned = Vec::new();
        let mut skipped = 0;

        for parent in alive {
            let Some(blueprint) = self.store.get_blueprint(&parent.blueprint_id).await else {
                skipped += 1;
                warn!(agent_id = %parent.id, blueprint_id = %parent.blueprint_id, "Blueprint missing, skipping");
                continue;
            };

            let plan = {
                let mut rng = self.rng.lock();
                reproduction::plan_offspring(
                    parent,
                    &blueprint,
                    self.mutation.as_ref(),
                    &mut *rng,
                    &self.config,
                )
            };
            if let Some(offspring) = plan {
                debug!(parent_id = %parent.id, child_id = %offspring.agent.id, "Offspring planned");
                planned.push(offspring);
            }
        }
        (planned, skipped)
    }

    /// The alive population once `offspring` are created and their parents
    /// charged, in creation order
    fn after_reproduction(alive: &[AgentState], offspring: &[Offspring]) -> Vec<AgentState> {
        let mut charges: HashMap<Uuid, i64> = HashMap::new();
        for child in offspring {
            *charges.entry(child.parent_id).or_default() += child.cost;
        }

        let mut population: Vec<AgentState> = alive
            .iter()
            .cloned()
            .map(|mut agent| {
                if let Some(cost) = charges.get(&agent.id) {
                    agent.balance = agent.balance.saturating_sub(*cost);
                }
                agent
            })
            .collect();
        population.extend(offspring.iter().map(|child| child.agent.clone()));
        population
    }

    /// Start the periodic epoch task.
    ///
    /// The first epoch fires one full interval after start. Failed ticks are
    /// logged and the loop continues.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                interval.tick().await;
                match self.run_epoch().await {
                    Ok(_) => {}
                    Err(ArenaError::EpochInProgress(epoch)) => {
                        warn!(epoch, "Previous epoch still running, skipping tick");
                    }
                    Err(e) => {
                        error!(error = %e, "Epoch failed");
                    }
                }
            }
        })
    }
}
