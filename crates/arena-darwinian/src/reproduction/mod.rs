//! Reproduction: gating and offspring construction
pub mod mutation;

pub use self::mutation::{MutationStrategy, OneTraitMutation};

use arena_common::{AgentState, Blueprint};
use arena_ledger::Offspring;
use rand::RngCore;

use crate::EpochConfig;

/// Whether `agent` may reproduce under `blueprint`'s policy
pub fn is_eligible(agent: &AgentState, blueprint: &Blueprint) -> bool {
    agent.alive && agent.balance >= blueprint.reproduction_policy.min_balance
}

/// Build the offspring for an eligible parent, or `None` if not eligible
pub fn plan_offspring(
    parent: &AgentState,
    blueprint: &Blueprint,
    strategy: &dyn MutationStrategy,
    rng: &mut dyn RngCore,
    config: &EpochConfig,
) -> Option<Offspring> {
    if !is_eligible(parent, blueprint) {
        return None;
    }

    let child_blueprint = blueprint.derive(strategy.mutate(&blueprint.traits, rng));
    let child = AgentState::new(
        child_blueprint.id,
        config.offspring_balance,
        config.offspring_reputation,
    );

    Some(Offspring {
        parent_id: parent.id,
        blueprint: child_blueprint,
        agent: child,
        cost: config.reproduction_cost,
    })
}
