//! Arena simulation binary
//!
//! Seeds a population of simulated agents, runs the job market and epoch
//! scheduler, and serves the leaderboard over HTTP.

use std::sync::Arc;

use anyhow::Result;
use arena_market::TemplateJobGenerator;
use arena_sim::{SimConfig, SimulatedAgent, Simulation};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SimConfig::load()?;
    init_tracing(config.log_json);

    info!("Starting Arena simulation v{}", arena_common::VERSION);
    info!("Loaded configuration: {:?}", config);

    let seed = config.epoch.rng_seed;
    let simulation = Arc::new(Simulation::new(
        config,
        Arc::new(SimulatedAgent::new(seed.wrapping_add(2))),
        Arc::new(TemplateJobGenerator::new(seed.wrapping_add(3))),
    )?);

    simulation.seed().await?;
    simulation.start().await;

    let addr = simulation.config().bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP API listening on {}", addr);
    info!("Endpoints: /health, /leaderboard, /agents/:id, /metrics");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, simulation.router())
        .with_graceful_shutdown(shutdown)
        .await?;

    simulation.shutdown().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
