//! Job - unit of work agents compete for
//!
//! A [`JobSpec`] is what a generator produces; a [`Job`] is a spec that has
//! been minted with an identity and enqueued. Jobs are immutable and consumed
//! exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GeneratorError;

/// Opaque job payload interpreted only by the grader and the agent
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Generator output, before a job id is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Grading category (e.g. "classification", "math")
    pub category: String,
    /// Category-specific payload
    pub payload: Payload,
    /// Amount credited on success
    pub payout: i64,
    /// Advisory deadline, not enforced
    pub deadline_seconds: u64,
}

impl JobSpec {
    pub fn new(category: impl Into<String>, payload: Payload, payout: i64, deadline_seconds: u64) -> Self {
        Self {
            category: category.into(),
            payload,
            payout,
            deadline_seconds,
        }
    }

    /// Static job substituted when the generator fails
    pub fn fallback() -> Self {
        let mut payload = Payload::new();
        payload.insert("prompt".into(), "ping".into());
        payload.insert("answer".into(), "pong".into());
        Self::new("classification", payload, 1, 60)
    }

    /// Reject specs the market cannot settle
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.category.trim().is_empty() {
            return Err(GeneratorError::Malformed("category is required".into()));
        }
        if self.payout < 0 {
            return Err(GeneratorError::Malformed(format!(
                "payout must be non-negative, got {}",
                self.payout
            )));
        }
        Ok(())
    }
}

/// An enqueued job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub category: String,
    pub payload: Payload,
    pub payout: i64,
    pub deadline_seconds: u64,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Mint a job from a generator spec
    pub fn from_spec(spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: spec.category,
            payload: spec.payload,
            payout: spec.payout,
            deadline_seconds: spec.deadline_seconds,
            created_at: Utc::now(),
        }
    }

    /// Read a string field from the payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

impl From<JobSpec> for Job {
    fn from(spec: JobSpec) -> Self {
        Job::from_spec(spec)
    }
}
