//! Job queue and dispatcher
//!
//! One unbounded FIFO and one worker task per alive agent. Jobs sent to an
//! agent wait in its queue until the worker gets to them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arena_common::{DispatchError, Job};
use arena_ledger::PopulationStore;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::agent::AgentCapability;
use crate::metrics::MarketMetrics;
use crate::worker::AgentWorker;
use crate::MarketConfig;

struct AgentQueue {
    tx: mpsc::UnboundedSender<Job>,
    depth: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

pub struct Dispatcher {
    store: Arc<dyn PopulationStore>,
    capability: Arc<dyn AgentCapability>,
    metrics: Arc<MarketMetrics>,
    config: MarketConfig,
    queues: DashMap<Uuid, AgentQueue>,
    /// Round-robin position
    cursor: AtomicUsize,
    shut_down: AtomicBool,
    /// Shared by queue writers, exclusive for shutdown
    gate: RwLock<()>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PopulationStore>,
        capability: Arc<dyn AgentCapability>,
        metrics: Arc<MarketMetrics>,
        config: MarketConfig,
    ) -> Self {
        Self {
            store,
            capability,
            metrics,
            config,
            queues: DashMap::new(),
            cursor: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            gate: RwLock::new(()),
        }
    }

    pub fn metrics(&self) -> &Arc<MarketMetrics> {
        &self.metrics
    }

    /// Send a job to the next alive agent in creation order.
    ///
    /// Returns the chosen agent.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn dispatch(&self, job: Job) -> Result<Uuid, DispatchError> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let alive = self.store.alive_agents().await;
        if alive.is_empty() {
            return Err(DispatchError::NoAliveAgents);
        }
        let target = alive[self.cursor.fetch_add(1, Ordering::Relaxed) % alive.len()].id;
        self.enqueue_for(target, job).await?;
        Ok(target)
    }

    /// Queue a job for a specific agent, starting its worker if needed
    pub async fn enqueue_for(&self, agent_id: Uuid, job: Job) -> Result<(), DispatchError> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let agent = self
            .store
            .get_agent(&agent_id)
            .await
            .ok_or(DispatchError::UnknownAgent(agent_id))?;
        if !agent.alive {
            return Err(DispatchError::AgentNotAlive(agent_id));
        }

        let job_id = job.id;
        {
            let _gate = self.gate.read();
            if self.is_shut_down() {
                return Err(DispatchError::ShutDown);
            }
            let (tx, depth) = {
                let queue = self
                    .queues
                    .entry(agent_id)
                    .or_insert_with(|| self.spawn_worker(agent_id));
                (queue.tx.clone(), queue.depth.clone())
            };

            depth.fetch_add(1, Ordering::SeqCst);
            if tx.send(job).is_err() {
                depth.fetch_sub(1, Ordering::SeqCst);
                return Err(DispatchError::QueueClosed(agent_id));
            }
        }

        self.metrics.record_dispatched();
        debug!(agent_id = %agent_id, job_id = %job_id, "Job queued");
        Ok(())
    }

    fn spawn_worker(&self, agent_id: Uuid) -> AgentQueue {
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        let worker = AgentWorker::new(
            agent_id,
            self.store.clone(),
            self.capability.clone(),
            self.metrics.clone(),
            self.config.clone(),
        );
        let handle = tokio::spawn(worker.run(rx, depth.clone()));
        debug!(agent_id = %agent_id, "Worker spawned");
        AgentQueue { tx, depth, handle }
    }

    /// Start workers for alive agents and retire queues of culled ones.
    ///
    /// Returns the number of workers started. A retired worker drains its
    /// queue, discarding each job, then exits.
    pub async fn sync_workers(&self) -> usize {
        if self.is_shut_down() {
            return 0;
        }
        let alive: HashSet<Uuid> = self
            .store
            .alive_agents()
            .await
            .into_iter()
            .map(|a| a.id)
            .collect();

        let retired: Vec<Uuid> = self
            .queues
            .iter()
            .filter(|entry| !alive.contains(entry.key()))
            .map(|entry| *entry.key())
            .collect();
        for agent_id in &retired {
            // Dropping the sender lets the worker finish
            self.queues.remove(agent_id);
        }

        let _gate = self.gate.read();
        if self.is_shut_down() {
            return 0;
        }
        let mut started = 0;
        for agent_id in alive {
            if !self.queues.contains_key(&agent_id) {
                self.queues
                    .entry(agent_id)
                    .or_insert_with(|| self.spawn_worker(agent_id));
                started += 1;
            }
        }

        if started > 0 || !retired.is_empty() {
            info!(started, retired = retired.len(), workers = self.queues.len(), "Workers synced");
        }
        started
    }

    /// Jobs waiting for `agent_id`, excluding the one in progress
    pub fn queue_depth(&self, agent_id: &Uuid) -> usize {
        self.queues
            .get(agent_id)
            .map(|q| q.depth.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total jobs waiting across all queues
    pub fn total_queued(&self) -> usize {
        self.queues
            .iter()
            .map(|q| q.depth.load(Ordering::SeqCst))
            .sum()
    }

    pub fn active_workers(&self) -> usize {
        self.queues
            .iter()
            .filter(|q| !q.handle.is_finished())
            .count()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait for workers to drain their queues
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let _gate = self.gate.write();
            if self.shut_down.swap(true, Ordering::SeqCst) {
                return;
            }
            let ids: Vec<Uuid> = self.queues.iter().map(|e| *e.key()).collect();
            ids.iter()
                .filter_map(|id| self.queues.remove(id))
                .map(|(_, queue)| queue.handle)
                .collect()
        };

        info!(workers = handles.len(), "Draining workers");
        join_all(handles).await;
        info!("Dispatcher stopped");
    }
}
