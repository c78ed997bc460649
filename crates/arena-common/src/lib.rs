//! # Arena Common
//!
//! Shared data model and error types for the Arena job-market simulation.
//!
//! ## Core Types
//!
//! - [`Job`]/[`JobSpec`]: unit of work competed for by agents
//! - [`Blueprint`]: immutable genetic parameters an agent is instantiated from
//! - [`AgentState`]: mutable per-agent accounting (balance, counters, alive flag)
//! - [`LedgerEntry`]: append-only balance delta with a reason code
//! - [`Settlement`]: the atomic commit of one graded job
//!
//! ## Accounting Invariant
//!
//! ```text
//! balance == seed_balance + Σ ledger.delta   (per agent, at all times)
//! ```

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{AgentError, ArenaError, DispatchError, GeneratorError, Result, StoreError};
pub use types::{
    agent_state::{running_mean, AgentState, LeaderboardEntry},
    blueprint::{Blueprint, ReproductionPolicy, Traits},
    job::{Job, JobSpec, Payload},
    ledger_entry::{LedgerEntry, LedgerReason},
    settlement::Settlement,
};

/// Arena version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Penalty charged for a failed job
pub const DEFAULT_FAIL_PENALTY: i64 = 1;

/// Starting balance of seeded agents
pub const DEFAULT_SEED_BALANCE: i64 = 10;

/// Starting balance of an offspring
pub const OFFSPRING_BALANCE: i64 = 5;

/// Reputation assigned to every new agent
pub const DEFAULT_REPUTATION: f64 = 0.5;

/// Cost charged to a parent per offspring
pub const REPRODUCTION_COST: i64 = 5;

/// Default balance required to reproduce
pub const DEFAULT_MIN_BALANCE: i64 = 15;

/// Number of wealthiest agents in the top-K share
pub const DEFAULT_TOP_K: usize = 5;

/// Share of the alive population culled each epoch (percent)
pub const DEFAULT_CULL_PERCENT: u32 = 20;

/// Epoch interval in minutes
pub const DEFAULT_EPOCH_MINUTES: u64 = 10;

/// Temperatures a mutation can pick from
pub const TEMPERATURE_CANDIDATES: [f64; 5] = [0.0, 0.2, 0.5, 0.7, 1.0];

/// Tools a mutation can toggle
pub const TOOL_UNIVERSE: [&str; 5] = ["browser", "calculator", "search", "code", "memory"];
