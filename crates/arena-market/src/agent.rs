//! Agent capability contract
//!
//! How an agent actually works a job (LLM calls, browser automation, code
//! generation) is outside the market. Workers only see an artifact and the
//! resource units spent producing it.

use arena_common::{AgentError, Blueprint, Job, Traits};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the capability knows about the agent it runs as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: Uuid,
    pub blueprint_id: Uuid,
    pub blueprint_version: u32,
    pub traits: Traits,
}

impl AgentProfile {
    pub fn new(agent_id: Uuid, blueprint: &Blueprint) -> Self {
        Self {
            agent_id,
            blueprint_id: blueprint.id,
            blueprint_version: blueprint.version,
            traits: blueprint.traits.clone(),
        }
    }
}

/// Result of one job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub artifact: String,
    /// Charged to the agent as `browser_steps`
    pub resource_units_used: u64,
}

impl AgentOutput {
    pub fn new(artifact: impl Into<String>, resource_units_used: u64) -> Self {
        Self {
            artifact: artifact.into(),
            resource_units_used,
        }
    }
}

/// Executes jobs on behalf of an agent
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentCapability: Send + Sync {
    async fn handle(&self, profile: &AgentProfile, job: &Job) -> Result<AgentOutput, AgentError>;
}
