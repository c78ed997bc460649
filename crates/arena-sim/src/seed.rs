//! Initial population
//!
//! Each seeded agent gets its own version-1 blueprint with randomized
//! temperature and tool set, so the first epochs already have variation to
//! select on.

use std::collections::BTreeSet;

use arena_common::{
    AgentState, Blueprint, ReproductionPolicy, Result, Traits, DEFAULT_MIN_BALANCE,
    DEFAULT_REPUTATION, DEFAULT_SEED_BALANCE, TEMPERATURE_CANDIDATES, TOOL_UNIVERSE,
};
use arena_ledger::PopulationStore;
use rand::seq::{IteratorRandom, SliceRandom};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Agents created on an empty store
    pub agents: usize,
    /// Starting balance of each seeded agent
    pub balance: i64,
    /// Reproduction threshold written into every seeded blueprint
    pub min_balance: i64,
    pub reputation: f64,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            agents: 20,
            balance: DEFAULT_SEED_BALANCE,
            min_balance: DEFAULT_MIN_BALANCE,
            reputation: DEFAULT_REPUTATION,
        }
    }
}

/// Random traits drawn from the mutation candidate sets
pub fn random_traits(rng: &mut dyn RngCore) -> Traits {
    let temperature = TEMPERATURE_CANDIDATES
        .choose(rng)
        .copied()
        .unwrap_or(Traits::default().temperature);
    let tool_count = rng.gen_range(1..=TOOL_UNIVERSE.len());
    let tool_set: BTreeSet<String> = TOOL_UNIVERSE
        .iter()
        .choose_multiple(rng, tool_count)
        .into_iter()
        .map(|tool| tool.to_string())
        .collect();

    Traits {
        temperature,
        tool_set,
        ..Traits::default()
    }
}

/// Create the initial population unless the store already has agents.
///
/// Returns the agents created.
pub async fn seed_population(
    store: &dyn PopulationStore,
    config: &SeedConfig,
    rng: &mut (dyn RngCore + Send),
) -> Result<Vec<AgentState>> {
    let existing = store.stats().await.total_agents;
    if existing > 0 {
        info!(existing, "Store already populated, skipping seeding");
        return Ok(Vec::new());
    }

    let policy = ReproductionPolicy {
        min_balance: config.min_balance,
        ..ReproductionPolicy::default()
    };

    let mut agents = Vec::with_capacity(config.agents);
    for _ in 0..config.agents {
        let blueprint = Blueprint::new(random_traits(rng), policy.clone());
        let blueprint_id = store.insert_blueprint(blueprint).await?;
        let agent = store
            .insert_agent(AgentState::new(blueprint_id, config.balance, config.reputation))
            .await?;
        agents.push(agent);
    }

    info!(agents = agents.len(), balance = config.balance, "Population seeded");
    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_ledger::InMemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_traits_in_candidate_sets() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let traits = random_traits(&mut rng);
            assert!(TEMPERATURE_CANDIDATES.contains(&traits.temperature));
            assert!(!traits.tool_set.is_empty());
            assert!(traits
                .tool_set
                .iter()
                .all(|tool| TOOL_UNIVERSE.contains(&tool.as_str())));
        }
    }

    #[tokio::test]
    async fn test_seed_once() {
        let store = InMemoryStore::new();
        let config = SeedConfig {
            agents: 4,
            balance: 12,
            min_balance: 8,
            reputation: 0.5,
        };
        let mut rng = StdRng::seed_from_u64(1);

        let agents = seed_population(&store, &config, &mut rng).await.unwrap();
        assert_eq!(agents.len(), 4);
        for agent in &agents {
            assert_eq!(agent.balance, 12);
            let blueprint = store.get_blueprint(&agent.blueprint_id).await.unwrap();
            assert_eq!(blueprint.version, 1);
            assert_eq!(blueprint.reproduction_policy.min_balance, 8);
        }

        let again = seed_population(&store, &config, &mut rng).await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.alive_agents().await.len(), 4);
    }
}
