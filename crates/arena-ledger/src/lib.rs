//! # Arena Ledger
//!
//! Population store and append-only ledger for the Arena simulation.
//!
//! ## Components
//!
//! - **Store**: [`PopulationStore`] trait with atomic settlement and epoch
//!   commit (offspring creation plus culling) operations
//! - **Memory**: [`InMemoryStore`], a DashMap-backed implementation
//! - **Journal**: JSONL event log mirroring every mutation for durability and
//!   replay
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   InMemoryStore                      │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────────┐  │
//! │  │   Agents   │  │ Blueprints │  │     Ledger     │  │
//! │  │ (DashMap)  │  │ (DashMap)  │  │ (append-only)  │  │
//! │  └─────┬──────┘  └─────┬──────┘  └───────┬────────┘  │
//! │        └───────────────┼─────────────────┘           │
//! │                ┌───────┴────────┐                    │
//! │                │ Journal (JSONL)│                    │
//! │                └────────────────┘                    │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod journal;
pub mod memory;
pub mod store;

pub use journal::{Journal, JournalEvent};
pub use memory::InMemoryStore;
pub use store::{EpochApplied, EpochCommit, Offspring, PopulationStore, StoreStats};
