//! Blueprint - immutable genetic parameters of an agent
//!
//! Blueprints are never edited. Reproduction derives a new blueprint with a
//! bumped version; lineage is implicit in creation order.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Behavioural traits handed to the agent capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    /// Model identifier used by the agent
    pub llm_model: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Tools the agent may use
    pub tool_set: BTreeSet<String>,
    /// Willingness to cooperate (0.0 - 1.0)
    pub coop_threshold: f64,
}

impl Default for Traits {
    fn default() -> Self {
        Self {
            llm_model: "default".to_string(),
            temperature: 0.5,
            tool_set: ["search".to_string()].into_iter().collect(),
            coop_threshold: 0.5,
        }
    }
}

impl Traits {
    /// Copy with a different temperature
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }

    /// Copy with `tool` added if absent, removed if present
    pub fn with_tool_toggled(&self, tool: &str) -> Self {
        let mut next = self.clone();
        if !next.tool_set.remove(tool) {
            next.tool_set.insert(tool.to_string());
        }
        next
    }
}

/// When and how an agent reproduces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReproductionPolicy {
    /// Balance required to reproduce (inclusive)
    pub min_balance: i64,
    /// Carried for compatibility; the epoch mutates exactly one trait
    pub mutation_rate: f64,
    /// Carried for compatibility; at most one offspring per epoch is created
    pub max_offspring: u32,
}

impl Default for ReproductionPolicy {
    fn default() -> Self {
        Self {
            min_balance: crate::DEFAULT_MIN_BALANCE,
            mutation_rate: 0.1,
            max_offspring: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: Uuid,
    pub version: u32,
    pub traits: Traits,
    pub reproduction_policy: ReproductionPolicy,
    pub created_at: DateTime<Utc>,
}

impl Blueprint {
    /// Create a first-generation blueprint
    pub fn new(traits: Traits, reproduction_policy: ReproductionPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 1,
            traits,
            reproduction_policy,
            created_at: Utc::now(),
        }
    }

    /// Derive an offspring blueprint carrying `traits` and this policy
    pub fn derive(&self, traits: Traits) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: self.version + 1,
            traits,
            reproduction_policy: self.reproduction_policy.clone(),
            created_at: Utc::now(),
        }
    }
}
