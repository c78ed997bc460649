//! Blueprint mutation strategies

use arena_common::{Traits, TEMPERATURE_CANDIDATES, TOOL_UNIVERSE};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Produces offspring traits from parent traits
pub trait MutationStrategy: Send + Sync {
    fn mutate(&self, parent: &Traits, rng: &mut dyn RngCore) -> Traits;
}

/// Changes exactly one trait: either the temperature (picked from a fixed
/// candidate set) or membership of one randomly chosen tool.
#[derive(Debug, Clone)]
pub struct OneTraitMutation {
    temperatures: Vec<f64>,
    tools: Vec<String>,
}

impl Default for OneTraitMutation {
    fn default() -> Self {
        Self::new(
            TEMPERATURE_CANDIDATES.to_vec(),
            TOOL_UNIVERSE.iter().map(|t| t.to_string()).collect(),
        )
    }
}

impl OneTraitMutation {
    pub fn new(temperatures: Vec<f64>, tools: Vec<String>) -> Self {
        Self { temperatures, tools }
    }

    fn mutate_temperature(&self, parent: &Traits, rng: &mut dyn RngCore) -> Option<Traits> {
        let choices: Vec<f64> = self
            .temperatures
            .iter()
            .copied()
            .filter(|t| (t - parent.temperature).abs() > f64::EPSILON)
            .collect();
        choices.choose(rng).map(|&t| parent.with_temperature(t))
    }

    fn toggle_tool(&self, parent: &Traits, rng: &mut dyn RngCore) -> Option<Traits> {
        self.tools
            .choose(rng)
            .map(|tool| parent.with_tool_toggled(tool))
    }
}

impl MutationStrategy for OneTraitMutation {
    fn mutate(&self, parent: &Traits, rng: &mut dyn RngCore) -> Traits {
        let mutated = if rng.gen_bool(0.5) {
            self.mutate_temperature(parent, rng)
                .or_else(|| self.toggle_tool(parent, rng))
        } else {
            self.toggle_tool(parent, rng)
                .or_else(|| self.mutate_temperature(parent, rng))
        };
        mutated.unwrap_or_else(|| parent.clone())
    }
}
