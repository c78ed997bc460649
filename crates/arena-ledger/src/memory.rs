//! In-memory population store
//!
//! Uses DashMap for concurrent per-agent access. A settlement holds the
//! agent's map entry for the whole commit, so ledger appends and counter
//! updates for one agent never interleave with another writer on that agent.
//! When a journal is attached, events are written before memory is touched;
//! a failed journal write leaves the store unchanged.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use arena_common::{AgentState, Blueprint, LedgerEntry, Settlement, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::journal::{Journal, JournalEvent};
use crate::store::{EpochApplied, EpochCommit, Offspring, PopulationStore, StoreStats};

pub struct InMemoryStore {
    /// Agents by ID
    agents: DashMap<Uuid, AgentState>,

    /// Blueprints by ID
    blueprints: DashMap<Uuid, Blueprint>,

    /// Global ledger in append order
    ledger: RwLock<Vec<LedgerEntry>>,

    /// Ledger positions by agent
    by_agent: DashMap<Uuid, Vec<usize>>,

    /// Next creation sequence
    next_seq: AtomicU64,

    /// Optional durable mirror
    journal: Option<Journal>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty, non-durable store
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            blueprints: DashMap::new(),
            ledger: RwLock::new(Vec::new()),
            by_agent: DashMap::new(),
            next_seq: AtomicU64::new(1),
            journal: None,
        }
    }

    /// Open a journal-backed store, replaying any existing events
    #[instrument(skip(path))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let (journal, events) = Journal::open(path)?;
        let mut store = Self::new();
        let replayed = events.len();
        for event in events {
            store.replay(event)?;
        }
        store.journal = Some(journal);
        info!(
            replayed,
            agents = store.agents.len(),
            ledger = store.ledger.read().len(),
            "Restored store from journal"
        );
        Ok(store)
    }

    fn replay(&self, event: JournalEvent) -> Result<(), StoreError> {
        match event {
            JournalEvent::BlueprintCreated(blueprint) => {
                self.blueprints.insert(blueprint.id, blueprint);
            }
            JournalEvent::AgentCreated(agent) => {
                self.next_seq.fetch_max(agent.seq + 1, Ordering::SeqCst);
                self.agents.insert(agent.id, agent);
            }
            JournalEvent::LedgerAppended(entry) => {
                let mut agent = self
                    .agents
                    .get_mut(&entry.agent_id)
                    .ok_or(StoreError::AgentNotFound(entry.agent_id))?;
                agent.balance = agent.balance.saturating_add(entry.delta);
                self.push_entry(entry);
            }
            JournalEvent::AttemptRecorded {
                agent_id,
                won,
                elapsed_secs,
                at,
            } => {
                let mut agent = self
                    .agents
                    .get_mut(&agent_id)
                    .ok_or(StoreError::AgentNotFound(agent_id))?;
                agent.record_attempt(won, elapsed_secs);
                agent.last_heartbeat = at;
            }
            JournalEvent::AgentCulled { agent_id, .. } => {
                let mut agent = self
                    .agents
                    .get_mut(&agent_id)
                    .ok_or(StoreError::AgentNotFound(agent_id))?;
                agent.alive = false;
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_journal(journal: Journal) -> Self {
        let mut store = Self::new();
        store.journal = Some(journal);
        store
    }

    fn write_journal(&self, events: &[JournalEvent]) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.append(events),
            None => Ok(()),
        }
    }

    fn push_entry(&self, entry: LedgerEntry) {
        let agent_id = entry.agent_id;
        let position = {
            let mut ledger = self.ledger.write();
            ledger.push(entry);
            ledger.len() - 1
        };
        self.by_agent.entry(agent_id).or_default().push(position);
    }

    fn sorted_by_creation(mut agents: Vec<AgentState>) -> Vec<AgentState> {
        agents.sort_by_key(|a| a.seq);
        agents
    }
}

#[async_trait]
impl PopulationStore for InMemoryStore {
    async fn insert_blueprint(&self, blueprint: Blueprint) -> Result<Uuid, StoreError> {
        let id = blueprint.id;
        self.write_journal(&[JournalEvent::BlueprintCreated(blueprint.clone())])?;
        self.blueprints.insert(id, blueprint);
        Ok(id)
    }

    async fn get_blueprint(&self, id: &Uuid) -> Option<Blueprint> {
        self.blueprints.get(id).map(|b| b.clone())
    }

    async fn insert_agent(&self, mut agent: AgentState) -> Result<AgentState, StoreError> {
        if !self.blueprints.contains_key(&agent.blueprint_id) {
            return Err(StoreError::BlueprintNotFound(agent.blueprint_id));
        }
        if self.agents.contains_key(&agent.id) {
            return Err(StoreError::DuplicateAgent(agent.id));
        }

        agent.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.write_journal(&[JournalEvent::AgentCreated(agent.clone())])?;
        self.agents.insert(agent.id, agent.clone());
        debug!(agent_id = %agent.id, seq = agent.seq, "Agent inserted");
        Ok(agent)
    }

    async fn get_agent(&self, id: &Uuid) -> Option<AgentState> {
        self.agents.get(id).map(|a| a.clone())
    }

    async fn alive_agents(&self) -> Vec<AgentState> {
        Self::sorted_by_creation(
            self.agents
                .iter()
                .filter(|a| a.alive)
                .map(|a| a.clone())
                .collect(),
        )
    }

    async fn all_agents(&self) -> Vec<AgentState> {
        Self::sorted_by_creation(self.agents.iter().map(|a| a.clone()).collect())
    }

    #[instrument(skip(self, settlement), fields(agent_id = %settlement.agent_id, job_id = %settlement.job_id))]
    async fn settle(&self, settlement: &Settlement) -> Result<AgentState, StoreError> {
        let mut agent = self
            .agents
            .get_mut(&settlement.agent_id)
            .ok_or(StoreError::AgentNotFound(settlement.agent_id))?;

        let entries = settlement.ledger_entries();
        let at = Utc::now();

        let mut events: Vec<JournalEvent> = entries
            .iter()
            .cloned()
            .map(JournalEvent::LedgerAppended)
            .collect();
        events.push(JournalEvent::AttemptRecorded {
            agent_id: settlement.agent_id,
            won: settlement.won,
            elapsed_secs: settlement.elapsed_secs,
            at,
        });
        self.write_journal(&events)?;

        for entry in entries {
            agent.balance = agent.balance.saturating_add(entry.delta);
            self.push_entry(entry);
        }
        agent.record_attempt(settlement.won, settlement.elapsed_secs);
        agent.last_heartbeat = at;

        Ok(agent.clone())
    }

    #[instrument(skip(self, commit), fields(offspring = commit.offspring.len(), culled = commit.culled.len()))]
    async fn commit_epoch(&self, commit: EpochCommit) -> Result<EpochApplied, StoreError> {
        let EpochCommit { offspring, culled } = commit;

        let mut newborn = HashSet::with_capacity(offspring.len());
        for child in &offspring {
            if child.agent.blueprint_id != child.blueprint.id {
                return Err(StoreError::BlueprintMismatch {
                    agent: child.agent.id,
                    expected: child.agent.blueprint_id,
                    actual: child.blueprint.id,
                });
            }
            match self.agents.get(&child.parent_id) {
                None => return Err(StoreError::AgentNotFound(child.parent_id)),
                Some(parent) if !parent.alive => {
                    return Err(StoreError::AgentNotAlive(child.parent_id))
                }
                Some(_) => {}
            }
            if self.agents.contains_key(&child.agent.id) || !newborn.insert(child.agent.id) {
                return Err(StoreError::DuplicateAgent(child.agent.id));
            }
        }

        let mut seen = HashSet::with_capacity(culled.len());
        let targets: Vec<Uuid> = culled
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter(|id| {
                newborn.contains(id) || self.agents.get(id).map(|a| a.alive).unwrap_or(false)
            })
            .collect();
        let skipped = seen.len() - targets.len();
        if skipped > 0 {
            warn!(skipped, "Cull requested for missing or already culled agents");
        }

        let at = Utc::now();
        let mut planned = Vec::with_capacity(offspring.len());
        let mut events = Vec::with_capacity(offspring.len() * 3 + targets.len());
        for mut child in offspring {
            child.agent.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            let charge = LedgerEntry::reproduction_cost(child.parent_id, child.cost);
            events.push(JournalEvent::BlueprintCreated(child.blueprint.clone()));
            events.push(JournalEvent::AgentCreated(child.agent.clone()));
            events.push(JournalEvent::LedgerAppended(charge.clone()));
            planned.push((child, charge));
        }
        events.extend(
            targets
                .iter()
                .map(|&agent_id| JournalEvent::AgentCulled { agent_id, at }),
        );
        self.write_journal(&events)?;

        let mut created = Vec::with_capacity(planned.len());
        for (child, charge) in planned {
            // Guard dropped before the child is inserted: both live in the
            // same map and may share a shard.
            if let Some(mut parent) = self.agents.get_mut(&child.parent_id) {
                parent.balance = parent.balance.saturating_add(charge.delta);
            }
            self.push_entry(charge);

            let Offspring {
                parent_id,
                blueprint,
                agent,
                ..
            } = child;
            self.blueprints.insert(blueprint.id, blueprint);
            self.agents.insert(agent.id, agent.clone());
            debug!(parent_id = %parent_id, child_id = %agent.id, seq = agent.seq, "Offspring created");
            created.push(agent);
        }
        for id in &targets {
            if let Some(mut agent) = self.agents.get_mut(id) {
                agent.alive = false;
            }
        }

        Ok(EpochApplied {
            offspring: created,
            culled: targets.len(),
        })
    }

    async fn ledger_for(&self, agent_id: &Uuid) -> Vec<LedgerEntry> {
        let positions = match self.by_agent.get(agent_id) {
            Some(p) => p.clone(),
            None => return Vec::new(),
        };
        let ledger = self.ledger.read();
        positions.iter().filter_map(|&i| ledger.get(i).cloned()).collect()
    }

    async fn ledger_len(&self) -> usize {
        self.ledger.read().len()
    }

    async fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            blueprints: self.blueprints.len(),
            ledger_entries: self.ledger.read().len(),
            ..StoreStats::default()
        };
        for agent in self.agents.iter() {
            stats.total_agents += 1;
            if agent.alive {
                stats.alive_agents += 1;
                stats.alive_balance += agent.balance;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::testing::FaultyFile;
    use arena_common::{Job, JobSpec, LedgerReason, ReproductionPolicy, Traits};
    use proptest::prelude::*;

    async fn seed(store: &InMemoryStore, balance: i64) -> AgentState {
        let blueprint = Blueprint::new(Traits::default(), ReproductionPolicy::default());
        let id = store.insert_blueprint(blueprint).await.unwrap();
        store
            .insert_agent(AgentState::new(id, balance, 0.5))
            .await
            .unwrap()
    }

    fn job(payout: i64) -> Job {
        let mut spec = JobSpec::fallback();
        spec.payout = payout;
        Job::from_spec(spec)
    }

    async fn assert_conserved(store: &InMemoryStore, agent_id: &Uuid) {
        let agent = store.get_agent(agent_id).await.unwrap();
        let sum: i64 = store.ledger_for(agent_id).await.iter().map(|e| e.delta).sum();
        assert_eq!(agent.balance, agent.seed_balance + sum);
    }

    #[tokio::test]
    async fn test_insert_requires_blueprint() {
        let store = InMemoryStore::new();
        let orphan = AgentState::new(Uuid::new_v4(), 10, 0.5);
        let result = store.insert_agent(orphan).await;
        assert!(matches!(result, Err(StoreError::BlueprintNotFound(_))));
    }

    #[tokio::test]
    async fn test_creation_order() {
        let store = InMemoryStore::new();
        let a = seed(&store, 1).await;
        let b = seed(&store, 1).await;
        let c = seed(&store, 1).await;

        let alive: Vec<Uuid> = store.alive_agents().await.iter().map(|x| x.id).collect();
        assert_eq!(alive, vec![a.id, b.id, c.id]);
        assert!(a.seq < b.seq && b.seq < c.seq);
    }

    #[tokio::test]
    async fn test_settle_win_and_loss() {
        let store = InMemoryStore::new();
        let agent = seed(&store, 10).await;

        let win = Settlement::graded(agent.id, &job(5), 2, true, 1, 4);
        let after = store.settle(&win).await.unwrap();
        assert_eq!(after.balance, 13);
        assert_eq!(after.attempts, 1);
        assert_eq!(after.wins, 1);
        assert_eq!(after.mean_time_to_complete_secs, 4);

        let loss = Settlement::graded(agent.id, &job(5), 0, false, 1, 2);
        let after = store.settle(&loss).await.unwrap();
        assert_eq!(after.balance, 12);
        assert_eq!(after.attempts, 2);
        assert_eq!(after.wins, 1);
        assert_eq!(after.mean_time_to_complete_secs, 3);

        let reasons: Vec<LedgerReason> =
            store.ledger_for(&agent.id).await.iter().map(|e| e.reason).collect();
        assert_eq!(
            reasons,
            vec![LedgerReason::BrowserSteps, LedgerReason::Payout, LedgerReason::Fail]
        );
        assert_conserved(&store, &agent.id).await;
    }

    #[tokio::test]
    async fn test_spawn_offspring_charges_parent() {
        let store = InMemoryStore::new();
        let parent = seed(&store, 15).await;
        let parent_bp = store.get_blueprint(&parent.blueprint_id).await.unwrap();

        let child_bp = parent_bp.derive(parent_bp.traits.with_temperature(1.0));
        let child = AgentState::new(child_bp.id, 5, 0.5);
        let child = store
            .spawn_offspring(Offspring {
                parent_id: parent.id,
                blueprint: child_bp.clone(),
                agent: child,
                cost: 5,
            })
            .await
            .unwrap();

        assert_eq!(store.get_agent(&parent.id).await.unwrap().balance, 10);
        assert!(child.seq > parent.seq);
        assert_eq!(store.get_blueprint(&child_bp.id).await.unwrap().version, 2);
        assert_eq!(store.alive_agents().await.len(), 2);
        assert_conserved(&store, &parent.id).await;
        assert_conserved(&store, &child.id).await;
    }

    #[tokio::test]
    async fn test_culled_parent_cannot_reproduce() {
        let store = InMemoryStore::new();
        let parent = seed(&store, 50).await;
        store.mark_culled(&[parent.id]).await.unwrap();

        let bp = store.get_blueprint(&parent.blueprint_id).await.unwrap().derive(Traits::default());
        let result = store
            .spawn_offspring(Offspring {
                parent_id: parent.id,
                agent: AgentState::new(bp.id, 5, 0.5),
                blueprint: bp,
                cost: 5,
            })
            .await;
        assert!(matches!(result, Err(StoreError::AgentNotAlive(_))));
    }

    #[tokio::test]
    async fn test_mismatched_offspring_blueprint() {
        let store = InMemoryStore::new();
        let parent = seed(&store, 50).await;
        let bp = store.get_blueprint(&parent.blueprint_id).await.unwrap().derive(Traits::default());
        let stray = Uuid::new_v4();

        let result = store
            .spawn_offspring(Offspring {
                parent_id: parent.id,
                agent: AgentState::new(stray, 5, 0.5),
                blueprint: bp.clone(),
                cost: 5,
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::BlueprintMismatch { expected, actual, .. }) if expected == stray && actual == bp.id
        ));
        assert_eq!(store.get_agent(&parent.id).await.unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_commit_epoch_culls_new_offspring() {
        let store = InMemoryStore::new();
        let parent = seed(&store, 15).await;
        let poor = seed(&store, 1).await;
        let bp = store.get_blueprint(&parent.blueprint_id).await.unwrap().derive(Traits::default());
        let child = AgentState::new(bp.id, 5, 0.5);
        let child_id = child.id;

        let applied = store
            .commit_epoch(EpochCommit {
                offspring: vec![Offspring {
                    parent_id: parent.id,
                    blueprint: bp,
                    agent: child,
                    cost: 5,
                }],
                culled: vec![child_id, poor.id, poor.id],
            })
            .await
            .unwrap();

        assert_eq!(applied.culled, 2);
        assert_eq!(applied.offspring[0].id, child_id);
        assert!(applied.offspring[0].seq > poor.seq);
        assert!(!store.get_agent(&child_id).await.unwrap().alive);
        let alive: Vec<Uuid> = store.alive_agents().await.iter().map(|a| a.id).collect();
        assert_eq!(alive, vec![parent.id]);
        assert_eq!(store.get_agent(&parent.id).await.unwrap().balance, 10);
        assert_conserved(&store, &parent.id).await;
    }

    #[tokio::test]
    async fn test_failed_journal_write_leaves_store_unchanged() {
        let file = FaultyFile::default();
        let store = InMemoryStore::with_journal(file.journal());
        let parent = seed(&store, 15).await;
        let settlement = Settlement::graded(parent.id, &job(5), 1, true, 1, 2);

        file.fail_next_writes(1);
        assert!(store.settle(&settlement).await.is_err());
        let unchanged = store.get_agent(&parent.id).await.unwrap();
        assert_eq!(unchanged.balance, 15);
        assert_eq!(unchanged.attempts, 0);
        assert_eq!(store.ledger_len().await, 0);

        // A retried settlement is journaled once
        store.settle(&settlement).await.unwrap();
        let journaled = file
            .contents()
            .lines()
            .filter(|l| l.contains("AttemptRecorded"))
            .count();
        assert_eq!(journaled, 1);

        let bp = store.get_blueprint(&parent.blueprint_id).await.unwrap().derive(Traits::default());
        let commit = EpochCommit {
            offspring: vec![Offspring {
                parent_id: parent.id,
                agent: AgentState::new(bp.id, 5, 0.5),
                blueprint: bp,
                cost: 5,
            }],
            culled: vec![parent.id],
        };
        file.fail_next_writes(1);
        assert!(store.commit_epoch(commit).await.is_err());
        assert_eq!(store.all_agents().await.len(), 1);
        assert!(store.get_agent(&parent.id).await.unwrap().alive);
        assert_eq!(store.get_agent(&parent.id).await.unwrap().balance, 19);
        assert_eq!(store.ledger_len().await, 2);
        assert_conserved(&store, &parent.id).await;
    }

    #[tokio::test]
    async fn test_mark_culled_is_idempotent() {
        let store = InMemoryStore::new();
        let a = seed(&store, 1).await;
        let b = seed(&store, 2).await;

        assert_eq!(store.mark_culled(&[a.id]).await.unwrap(), 1);
        assert_eq!(store.mark_culled(&[a.id, b.id]).await.unwrap(), 1);
        assert!(store.alive_agents().await.is_empty());
        // History survives culling
        assert_eq!(store.all_agents().await.len(), 2);
    }

    #[tokio::test]
    async fn test_leaderboard_order() {
        let store = InMemoryStore::new();
        let low = seed(&store, 3).await;
        let first_tie = seed(&store, 9).await;
        let second_tie = seed(&store, 9).await;
        let culled = seed(&store, 100).await;
        store.mark_culled(&[culled.id]).await.unwrap();

        let board = store.leaderboard(10).await;
        let ids: Vec<Uuid> = board.iter().map(|e| e.agent_id).collect();
        assert_eq!(ids, vec![first_tie.id, second_tie.id, low.id]);

        assert_eq!(store.leaderboard(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_journal_replay_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");

        let (agent_id, expected) = {
            let store = InMemoryStore::open(&path).unwrap();
            let agent = seed(&store, 10).await;
            store
                .settle(&Settlement::graded(agent.id, &job(5), 1, true, 1, 6))
                .await
                .unwrap();
            let other = seed(&store, 0).await;
            store.mark_culled(&[other.id]).await.unwrap();
            (agent.id, store.get_agent(&agent.id).await.unwrap())
        };

        let restored = InMemoryStore::open(&path).unwrap();
        let agent = restored.get_agent(&agent_id).await.unwrap();
        assert_eq!(agent.balance, expected.balance);
        assert_eq!(agent.attempts, 1);
        assert_eq!(agent.mean_time_to_complete_secs, 6);
        assert_eq!(restored.ledger_len().await, 2);
        assert_eq!(restored.alive_agents().await.len(), 1);

        // New agents continue the sequence
        let next = seed(&restored, 1).await;
        assert!(next.seq > agent.seq);
    }

    #[tokio::test]
    async fn test_concurrent_settlements_conserve_balance() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let agent = seed(&store, 0).await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            let id = agent.id;
            handles.push(tokio::spawn(async move {
                let s = Settlement::graded(id, &job(3), i % 3, i % 2 == 0, 2, 1);
                store.settle(&s).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let after = store.get_agent(&agent.id).await.unwrap();
        assert_eq!(after.attempts, 50);
        assert_eq!(after.wins, 25);
        assert_conserved(&store, &agent.id).await;
    }

    proptest! {
        #[test]
        fn prop_conservation_holds(outcomes in proptest::collection::vec((0u64..5, any::<bool>(), 0i64..20), 1..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                let agent = seed(&store, 10).await;
                for (units, won, payout) in outcomes {
                    let s = Settlement::graded(agent.id, &job(payout), units, won, 1, 1);
                    store.settle(&s).await.unwrap();
                }
                assert_conserved(&store, &agent.id).await;
            });
        }
    }
}
