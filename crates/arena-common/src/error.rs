//! Error types for the Arena simulation
//!
//! Provides a unified error type and layer-specific error variants

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using ArenaError
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Unified error type for Arena operations
#[derive(Debug, Error)]
pub enum ArenaError {
    // Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Agent capability errors
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // Job generator errors
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    // Dispatch errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Settlement could not be committed after all retries
    #[error("Job {job_id} lost after {attempts} commit attempts: {reason}")]
    JobLost {
        job_id: Uuid,
        attempts: u32,
        reason: String,
    },

    #[error("Epoch {0} is still running")]
    EpochInProgress(u64),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Population store and ledger errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Blueprint not found: {0}")]
    BlueprintNotFound(Uuid),

    #[error("Agent {agent} references blueprint {expected}, offspring carries {actual}")]
    BlueprintMismatch {
        agent: Uuid,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("Agent is not alive: {0}")]
    AgentNotAlive(Uuid),

    #[error("Agent already exists: {0}")]
    DuplicateAgent(Uuid),

    #[error("Journal write failed: {0}")]
    Journal(String),

    #[error("Journal corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the external agent capability
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AgentError {
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the external job generator
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("Generation failed: {0}")]
    Failed(String),

    #[error("Malformed job: {0}")]
    Malformed(String),
}

/// Job routing errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("No alive agents to dispatch to")]
    NoAliveAgents,

    #[error("Agent {0} is not alive")]
    AgentNotAlive(Uuid),

    #[error("Unknown agent: {0}")]
    UnknownAgent(Uuid),

    #[error("Queue for agent {0} is closed")]
    QueueClosed(Uuid),

    #[error("Dispatcher is shut down")]
    ShutDown,
}

// Implement From for common external error types
impl From<serde_json::Error> for ArenaError {
    fn from(err: serde_json::Error) -> Self {
        ArenaError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ArenaError {
    fn from(err: std::io::Error) -> Self {
        ArenaError::Store(StoreError::Journal(err.to_string()))
    }
}

impl From<anyhow::Error> for ArenaError {
    fn from(err: anyhow::Error) -> Self {
        ArenaError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Journal(err.to_string())
    }
}
