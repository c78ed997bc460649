//! Core data types for the Arena simulation

pub mod agent_state;
pub mod blueprint;
pub mod job;
pub mod ledger_entry;
pub mod settlement;
