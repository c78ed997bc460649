//! Settlement - the accounting outcome of one graded job
//!
//! A settlement produces up to two ledger entries, in this order:
//!
//! ```text
//! browser_steps   -resource_units        (only when resource_units > 0)
//! payout | fail   +payout | -fail_penalty
//! ```
//!
//! and one attempt record. Stores apply all of it atomically.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::Job;
use super::ledger_entry::{LedgerEntry, LedgerReason};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub agent_id: Uuid,
    pub job_id: Uuid,
    /// Resource units reported by the agent
    pub resource_units: u64,
    /// Grader verdict
    pub won: bool,
    /// Payout on win, negated penalty on failure
    pub outcome_delta: i64,
    /// Wall-clock time spent on the job
    pub elapsed_secs: u64,
}

impl Settlement {
    /// Build the settlement for a graded job
    pub fn graded(
        agent_id: Uuid,
        job: &Job,
        resource_units: u64,
        won: bool,
        fail_penalty: i64,
        elapsed_secs: u64,
    ) -> Self {
        let outcome_delta = if won { job.payout } else { -fail_penalty };
        Self {
            agent_id,
            job_id: job.id,
            resource_units,
            won,
            outcome_delta,
            elapsed_secs,
        }
    }

    pub fn outcome_reason(&self) -> LedgerReason {
        if self.won {
            LedgerReason::Payout
        } else {
            LedgerReason::Fail
        }
    }

    /// Resource charge as a ledger delta, saturating at `i64::MIN`
    pub fn resource_delta(&self) -> i64 {
        i64::try_from(self.resource_units).map_or(i64::MIN, |units| -units)
    }

    /// Sum of all deltas this settlement applies
    pub fn net_delta(&self) -> i64 {
        self.outcome_delta.saturating_add(self.resource_delta())
    }

    /// Ledger entries in commit order
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        let mut entries = Vec::with_capacity(2);
        if self.resource_units > 0 {
            entries.push(LedgerEntry::new(
                self.agent_id,
                Some(self.job_id),
                self.resource_delta(),
                LedgerReason::BrowserSteps,
            ));
        }
        entries.push(LedgerEntry::new(
            self.agent_id,
            Some(self.job_id),
            self.outcome_delta,
            self.outcome_reason(),
        ));
        entries
    }
}
