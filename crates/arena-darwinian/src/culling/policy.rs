//! Culling policy: every bankrupt agent, plus the bottom ceil(n × percent) of the solvent ones

use arena_common::AgentState;
use uuid::Uuid;

pub struct CullingPolicy {
    percent: u32,
}

impl CullingPolicy {
    pub fn new(percent: u32) -> Self {
        Self {
            percent: percent.min(100),
        }
    }

    /// Size of the bottom bucket for `n` agents: `ceil(n × percent / 100)`, at least 1
    pub fn bucket_size(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let scaled = n * self.percent as usize;
        scaled.div_ceil(100).max(1)
    }

    /// Agents to cull: every bankrupt agent, then the bottom bucket of the rest.
    ///
    /// The bucket is sized over the whole alive population but filled only
    /// from agents with a non-negative balance. `alive` must be in creation
    /// order; ties on balance keep that order.
    pub fn select(&self, alive: &[AgentState]) -> Vec<Uuid> {
        let alive: Vec<&AgentState> = alive.iter().filter(|a| a.alive).collect();
        let bucket = self.bucket_size(alive.len());

        let (mut bankrupt, mut solvent): (Vec<&AgentState>, Vec<&AgentState>) =
            alive.into_iter().partition(|a| a.balance < 0);
        bankrupt.sort_by_key(|a| a.balance);
        solvent.sort_by_key(|a| a.balance);

        bankrupt
            .into_iter()
            .chain(solvent.into_iter().take(bucket))
            .map(|agent| agent.id)
            .collect()
    }
}
