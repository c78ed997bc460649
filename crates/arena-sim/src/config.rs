//! Simulation configuration
//!
//! Defaults, then `.env`, then `ARENA_*` environment variables. A variable
//! that is set but does not parse is an error.

use std::path::PathBuf;
use std::str::FromStr;

use arena_common::{ArenaError, Result};
use arena_darwinian::EpochConfig;
use arena_market::MarketConfig;
use serde::{Deserialize, Serialize};

use crate::seed::SeedConfig;

/// Arena simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// HTTP host
    pub host: String,
    /// HTTP port
    pub port: u16,
    /// Initial population
    pub seed: SeedConfig,
    /// Epoch scheduler settings
    pub epoch: EpochConfig,
    /// Job market settings
    pub market: MarketConfig,
    /// JSONL journal; in-memory only when unset
    pub journal_path: Option<PathBuf>,
    /// CSV metrics time series; kept in memory when unset
    pub metrics_path: Option<PathBuf>,
    /// Emit logs as JSON
    pub log_json: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            seed: SeedConfig::default(),
            epoch: EpochConfig::default(),
            market: MarketConfig::default(),
            journal_path: None,
            metrics_path: Some(PathBuf::from("arena_metrics.csv")),
            log_json: false,
        }
    }
}

impl SimConfig {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Apply `ARENA_*` overrides read through `lookup`, then validate
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ARENA_HOST") {
            self.host = host;
        }
        set(&lookup, "ARENA_PORT", &mut self.port)?;

        // Population
        set(&lookup, "ARENA_SEED_AGENTS", &mut self.seed.agents)?;
        set(&lookup, "ARENA_SEED_BALANCE", &mut self.seed.balance)?;
        set(&lookup, "ARENA_MIN_BALANCE", &mut self.seed.min_balance)?;

        // Epochs
        set(&lookup, "ARENA_RNG_SEED", &mut self.epoch.rng_seed)?;
        set(&lookup, "ARENA_EPOCH_MINUTES", &mut self.epoch.epoch_minutes)?;
        set(&lookup, "ARENA_TOP_K", &mut self.epoch.top_k)?;
        set(&lookup, "ARENA_CULL_PERCENT", &mut self.epoch.cull_percent)?;
        set(&lookup, "ARENA_REPRODUCTION_COST", &mut self.epoch.reproduction_cost)?;
        set(&lookup, "ARENA_OFFSPRING_BALANCE", &mut self.epoch.offspring_balance)?;

        // Market
        set(&lookup, "ARENA_JOBS_PER_INTERVAL", &mut self.market.jobs_per_interval)?;
        set(
            &lookup,
            "ARENA_GENERATION_INTERVAL_SECS",
            &mut self.market.generation_interval_secs,
        )?;
        set(&lookup, "ARENA_FAIL_PENALTY", &mut self.market.fail_penalty)?;

        // Files; an empty value disables the file
        if let Some(path) = lookup("ARENA_JOURNAL_PATH") {
            self.journal_path = non_empty_path(path);
        }
        if let Some(path) = lookup("ARENA_METRICS_PATH") {
            self.metrics_path = non_empty_path(path);
        }
        set(&lookup, "ARENA_LOG_JSON", &mut self.log_json)?;

        self.validate()
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.epoch.epoch_minutes == 0 {
            return Err(invalid("ARENA_EPOCH_MINUTES", "must be at least 1"));
        }
        if self.market.generation_interval_secs == 0 {
            return Err(invalid("ARENA_GENERATION_INTERVAL_SECS", "must be at least 1"));
        }
        if self.epoch.top_k == 0 {
            return Err(invalid("ARENA_TOP_K", "must be at least 1"));
        }
        if self.epoch.cull_percent > 100 {
            return Err(invalid("ARENA_CULL_PERCENT", "must be between 0 and 100"));
        }
        if self.epoch.reproduction_cost < 0 {
            return Err(invalid("ARENA_REPRODUCTION_COST", "must not be negative"));
        }
        if self.epoch.offspring_balance < 0 {
            return Err(invalid("ARENA_OFFSPRING_BALANCE", "must not be negative"));
        }
        if self.market.fail_penalty < 0 {
            return Err(invalid("ARENA_FAIL_PENALTY", "must not be negative"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn set<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| invalid(key, &format!("{:?}: {}", raw, e)))?;
    }
    Ok(())
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

fn invalid(key: &str, reason: &str) -> ArenaError {
    ArenaError::Config(format!("{} {}", key, reason))
}
