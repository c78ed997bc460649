//! LedgerEntry - append-only balance delta
//!
//! The ledger is the source of truth for balances. Entries are never edited
//! or removed, including for culled agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a balance moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Job graded successful
    Payout,
    /// Job graded failed
    Fail,
    /// Resource units consumed while running a job
    BrowserSteps,
    /// Charged to a parent on reproduction
    ReproductionCost,
}

impl LedgerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Payout => "payout",
            LedgerReason::Fail => "fail",
            LedgerReason::BrowserSteps => "browser_steps",
            LedgerReason::ReproductionCost => "reproduction_cost",
        }
    }
}

impl std::fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub agent_id: Uuid,
    /// Job that caused the delta, if any
    pub job_id: Option<Uuid>,
    pub delta: i64,
    pub reason: LedgerReason,
    pub ts: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(agent_id: Uuid, job_id: Option<Uuid>, delta: i64, reason: LedgerReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            job_id,
            delta,
            reason,
            ts: Utc::now(),
        }
    }

    /// Charge for offspring creation
    pub fn reproduction_cost(agent_id: Uuid, cost: i64) -> Self {
        Self::new(agent_id, None, -cost, LedgerReason::ReproductionCost)
    }
}
