//! Population store contract
//!
//! Every balance mutation goes through an operation that appends ledger
//! entries and adjusts the agent in one step. Callers never read a balance,
//! modify it and write it back.

use arena_common::{
    AgentState, Blueprint, LeaderboardEntry, LedgerEntry, Settlement, StoreError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reproduction event: new blueprint, new agent, parent charge
#[derive(Debug, Clone)]
pub struct Offspring {
    pub parent_id: Uuid,
    pub blueprint: Blueprint,
    pub agent: AgentState,
    /// Charged to the parent as `reproduction_cost`
    pub cost: i64,
}

/// Everything one epoch changes, committed together
#[derive(Debug, Clone, Default)]
pub struct EpochCommit {
    pub offspring: Vec<Offspring>,
    /// Agents to cull; may name offspring from the same commit
    pub culled: Vec<Uuid>,
}

/// Result of an [`EpochCommit`]
#[derive(Debug, Clone, Default)]
pub struct EpochApplied {
    /// Created agents with their assigned creation sequence
    pub offspring: Vec<AgentState>,
    /// Agents that went from alive to culled
    pub culled: usize,
}

/// Trait for population store backends
#[async_trait]
pub trait PopulationStore: Send + Sync {
    /// Store a blueprint (insert-only)
    async fn insert_blueprint(&self, blueprint: Blueprint) -> Result<Uuid, StoreError>;

    /// Get a blueprint by ID
    async fn get_blueprint(&self, id: &Uuid) -> Option<Blueprint>;

    /// Store a new agent, assigning its creation sequence.
    ///
    /// The referenced blueprint must exist.
    async fn insert_agent(&self, agent: AgentState) -> Result<AgentState, StoreError>;

    /// Get an agent by ID
    async fn get_agent(&self, id: &Uuid) -> Option<AgentState>;

    /// Alive agents in creation order
    async fn alive_agents(&self) -> Vec<AgentState>;

    /// All agents, culled included, in creation order
    async fn all_agents(&self) -> Vec<AgentState>;

    /// Atomically append a job's ledger entries and record the attempt
    async fn settle(&self, settlement: &Settlement) -> Result<AgentState, StoreError>;

    /// Create offspring, charge their parents and cull, all or nothing.
    ///
    /// Culled IDs that are unknown or already culled are skipped.
    async fn commit_epoch(&self, commit: EpochCommit) -> Result<EpochApplied, StoreError>;

    /// Atomically create an offspring and charge its parent
    async fn spawn_offspring(&self, offspring: Offspring) -> Result<AgentState, StoreError> {
        let applied = self
            .commit_epoch(EpochCommit {
                offspring: vec![offspring],
                culled: Vec::new(),
            })
            .await?;
        applied
            .offspring
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable("offspring was not created".into()))
    }

    /// Mark agents as culled; returns how many were alive before the call
    async fn mark_culled(&self, ids: &[Uuid]) -> Result<usize, StoreError> {
        let applied = self
            .commit_epoch(EpochCommit {
                offspring: Vec::new(),
                culled: ids.to_vec(),
            })
            .await?;
        Ok(applied.culled)
    }

    /// Ledger entries for one agent in append order
    async fn ledger_for(&self, agent_id: &Uuid) -> Vec<LedgerEntry>;

    /// Total ledger entries
    async fn ledger_len(&self) -> usize;

    /// Store counters
    async fn stats(&self) -> StoreStats;

    /// Up to `limit` alive agents by balance descending, ties by creation order
    async fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut alive = self.alive_agents().await;
        // Stable: equal balances keep creation order
        alive.sort_by(|a, b| b.balance.cmp(&a.balance));
        alive.iter().take(limit).map(LeaderboardEntry::from).collect()
    }

    /// Liveness probe
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_agents: usize,
    pub alive_agents: usize,
    pub blueprints: usize,
    pub ledger_entries: usize,
    /// Sum of alive balances
    pub alive_balance: i64,
}
