//! AgentState - mutable accounting for one agent
//!
//! Key characteristics:
//! - Balance only moves through ledger entries (see [`crate::Settlement`])
//! - `attempts >= wins` at all times
//! - Never deleted: culled agents keep their history with `alive = false`
//! - `seq` is assigned by the store and orders agents by creation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: Uuid,

    /// Blueprint this agent was instantiated from
    pub blueprint_id: Uuid,

    /// Current balance (may go negative)
    pub balance: i64,

    /// Balance at creation, before any ledger entry
    pub seed_balance: i64,

    /// Reputation (0.0 - 1.0)
    pub reputation: f64,

    /// Jobs settled
    pub attempts: u64,

    /// Jobs graded successful
    pub wins: u64,

    /// Running mean of job wall-clock time, floored to whole seconds
    pub mean_time_to_complete_secs: u64,

    pub alive: bool,

    /// Refreshed on every settlement
    pub last_heartbeat: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    /// Creation order, assigned on insert
    pub seq: u64,
}

impl AgentState {
    /// Create a live agent with the given starting balance
    pub fn new(blueprint_id: Uuid, seed_balance: i64, reputation: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            blueprint_id,
            balance: seed_balance,
            seed_balance,
            reputation: reputation.clamp(0.0, 1.0),
            attempts: 0,
            wins: 0,
            mean_time_to_complete_secs: 0,
            alive: true,
            last_heartbeat: now,
            created_at: now,
            seq: 0,
        }
    }

    /// Fraction of attempts that were won
    #[inline]
    pub fn win_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.wins as f64 / self.attempts as f64
    }

    /// Record one settled attempt.
    ///
    /// The running mean uses the attempt count from before this increment.
    pub fn record_attempt(&mut self, won: bool, elapsed_secs: u64) {
        self.mean_time_to_complete_secs =
            running_mean(self.mean_time_to_complete_secs, self.attempts, elapsed_secs);
        self.attempts += 1;
        if won {
            self.wins += 1;
        }
        self.last_heartbeat = Utc::now();
    }
}

/// `floor((old_mean * old_attempts + sample) / (old_attempts + 1))`
pub fn running_mean(old_mean: u64, old_attempts: u64, sample: u64) -> u64 {
    let total = old_mean as u128 * old_attempts as u128 + sample as u128;
    (total / (old_attempts as u128 + 1)) as u64
}

/// One row of the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub agent_id: Uuid,
    pub balance: i64,
    pub wins: u64,
    pub attempts: u64,
}

impl From<&AgentState> for LeaderboardEntry {
    fn from(agent: &AgentState) -> Self {
        Self {
            agent_id: agent.id,
            balance: agent.balance,
            wins: agent.wins,
            attempts: agent.attempts,
        }
    }
}
