//! # Arena Sim
//!
//! Wires the population store, market and epoch scheduler into one runnable
//! simulation.
//!
//! ```text
//!            ┌──────────────── Simulation ────────────────┐
//!            │                                             │
//!  generator ─► GenerationLoop ─► Dispatcher ─► AgentWorker ×N
//!            │                                      │      │
//!            │     EpochScheduler ◄──── PopulationStore ◄──┘
//!            │          │                    ▲             │
//!            │          └── metrics sink     └── HTTP API  │
//!            └─────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod seed;
pub mod simulated;

pub use config::SimConfig;
pub use seed::SeedConfig;
pub use simulated::SimulatedAgent;

use std::sync::Arc;

use arena_common::{AgentState, ArenaError, Result};
use arena_darwinian::{CsvMetricsSink, EpochScheduler, EpochTelemetry, MemoryMetricsSink, MetricsSink};
use arena_ledger::{InMemoryStore, PopulationStore};
use arena_market::{AgentCapability, Dispatcher, GenerationLoop, JobGenerator, MarketMetrics};
use parking_lot::Mutex;
use prometheus::Registry;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;
use tracing::info;

/// A fully wired simulation
pub struct Simulation {
    config: SimConfig,
    store: Arc<dyn PopulationStore>,
    registry: Registry,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<EpochScheduler>,
    generation: Arc<GenerationLoop>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulation {
    /// Build every component; nothing runs until [`Simulation::start`]
    pub fn new(
        config: SimConfig,
        capability: Arc<dyn AgentCapability>,
        generator: Arc<dyn JobGenerator>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn PopulationStore> = match &config.journal_path {
            Some(path) => Arc::new(InMemoryStore::open(path)?),
            None => Arc::new(InMemoryStore::new()),
        };
        let sink: Arc<dyn MetricsSink> = match &config.metrics_path {
            Some(path) => Arc::new(CsvMetricsSink::create(path)?),
            None => Arc::new(MemoryMetricsSink::new()),
        };

        let registry = Registry::new();
        let telemetry = EpochTelemetry::register(&registry).map_err(prometheus_error)?;
        let metrics = MarketMetrics::with_registry(&registry).map_err(prometheus_error)?;

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            capability,
            Arc::new(metrics),
            config.market.clone(),
        ));
        let scheduler = Arc::new(
            EpochScheduler::new(store.clone(), sink, config.epoch.clone())
                .with_telemetry(Arc::new(telemetry)),
        );
        let generation = Arc::new(GenerationLoop::new(
            generator,
            dispatcher.clone(),
            config.market.clone(),
        ));

        Ok(Self {
            config,
            store,
            registry,
            dispatcher,
            scheduler,
            generation,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PopulationStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Arc<EpochScheduler> {
        &self.scheduler
    }

    pub fn generation(&self) -> &Arc<GenerationLoop> {
        &self.generation
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Seed the initial population if the store is empty
    pub async fn seed(&self) -> Result<Vec<AgentState>> {
        // Offset from the epoch seed so traits and mutations draw different streams
        let mut rng = StdRng::seed_from_u64(self.config.epoch.rng_seed.wrapping_add(1));
        seed::seed_population(self.store.as_ref(), &self.config.seed, &mut rng).await
    }

    /// Spawn workers and the periodic generation and epoch tasks
    pub async fn start(&self) {
        let workers = self.dispatcher.sync_workers().await;
        let mut tasks = self.tasks.lock();
        tasks.push(self.generation.clone().start());
        tasks.push(self.scheduler.clone().start());
        info!(
            workers,
            epoch_minutes = self.config.epoch.epoch_minutes,
            generation_interval_secs = self.config.market.generation_interval_secs,
            "Simulation started"
        );
    }

    /// HTTP routes backed by this simulation
    pub fn router(&self) -> axum::Router {
        api::router(api::AppState {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
        })
    }

    /// Stop the periodic tasks and drain agent queues.
    ///
    /// An epoch already running is allowed to finish first.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        {
            let _paused = self.scheduler.pause().await;
            for task in &tasks {
                task.abort();
            }
        }
        self.dispatcher.shutdown().await;

        let stats = self.store.stats().await;
        info!(
            alive = stats.alive_agents,
            total = stats.total_agents,
            ledger_entries = stats.ledger_entries,
            epochs = self.scheduler.epochs_run(),
            "Simulation stopped"
        );
    }
}

fn prometheus_error(err: prometheus::Error) -> ArenaError {
    ArenaError::Internal(format!("metrics registry: {}", err))
}
