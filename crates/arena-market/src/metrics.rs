//! Market counters
//!
//! Always kept as atomics for health reporting; mirrored to Prometheus when
//! built with [`MarketMetrics::with_registry`].

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{IntCounter, Registry};
use serde::{Deserialize, Serialize};

struct PromCounters {
    dispatched: IntCounter,
    completed: IntCounter,
    won: IntCounter,
    failed: IntCounter,
    agent_errors: IntCounter,
    lost: IntCounter,
    discarded: IntCounter,
    fallbacks: IntCounter,
}

impl PromCounters {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let counters = Self {
            dispatched: IntCounter::new("arena_jobs_dispatched_total", "Jobs accepted into an agent queue")?,
            completed: IntCounter::new("arena_jobs_completed_total", "Jobs settled")?,
            won: IntCounter::new("arena_jobs_won_total", "Jobs graded as success")?,
            failed: IntCounter::new("arena_jobs_failed_total", "Jobs graded as failure")?,
            agent_errors: IntCounter::new("arena_agent_errors_total", "Agent capability failures")?,
            lost: IntCounter::new("arena_jobs_lost_total", "Jobs whose settlement could not be committed")?,
            discarded: IntCounter::new("arena_jobs_discarded_total", "Queued jobs dropped because the agent was culled")?,
            fallbacks: IntCounter::new("arena_fallback_jobs_total", "Fallback jobs substituted for generator failures")?,
        };

        for counter in [
            &counters.dispatched,
            &counters.completed,
            &counters.won,
            &counters.failed,
            &counters.agent_errors,
            &counters.lost,
            &counters.discarded,
            &counters.fallbacks,
        ] {
            registry.register(Box::new(counter.clone()))?;
        }
        Ok(counters)
    }
}

/// Market metrics
#[derive(Default)]
pub struct MarketMetrics {
    jobs_dispatched: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_won: AtomicU64,
    jobs_failed: AtomicU64,
    agent_errors: AtomicU64,
    jobs_lost: AtomicU64,
    jobs_discarded: AtomicU64,
    fallback_jobs: AtomicU64,
    prometheus: Option<PromCounters>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub jobs_dispatched: u64,
    pub jobs_completed: u64,
    pub jobs_won: u64,
    pub jobs_failed: u64,
    pub agent_errors: u64,
    pub jobs_lost: u64,
    pub jobs_discarded: u64,
    pub fallback_jobs: u64,
}

impl MarketMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics that are also exported through `registry`
    pub fn with_registry(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            prometheus: Some(PromCounters::register(registry)?),
            ..Self::default()
        })
    }

    pub fn record_dispatched(&self) {
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.dispatched.inc();
        }
    }

    /// A settled job and its verdict
    pub fn record_outcome(&self, won: bool) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if won {
            self.jobs_won.fetch_add(1, Ordering::Relaxed);
        } else {
            self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(p) = &self.prometheus {
            p.completed.inc();
            if won {
                p.won.inc();
            } else {
                p.failed.inc();
            }
        }
    }

    pub fn record_agent_error(&self) {
        self.agent_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.agent_errors.inc();
        }
    }

    pub fn record_lost(&self) {
        self.jobs_lost.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.lost.inc();
        }
    }

    pub fn record_discarded(&self) {
        self.jobs_discarded.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.discarded.inc();
        }
    }

    pub fn record_fallback(&self) {
        self.fallback_jobs.fetch_add(1, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.fallbacks.inc();
        }
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            jobs_dispatched: self.jobs_dispatched.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_won: self.jobs_won.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            agent_errors: self.agent_errors.load(Ordering::Relaxed),
            jobs_lost: self.jobs_lost.load(Ordering::Relaxed),
            jobs_discarded: self.jobs_discarded.load(Ordering::Relaxed),
            fallback_jobs: self.fallback_jobs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_split_into_won_and_failed() {
        let metrics = MarketMetrics::new();
        metrics.record_outcome(true);
        metrics.record_outcome(false);
        metrics.record_outcome(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_completed, 3);
        assert_eq!(snapshot.jobs_won, 1);
        assert_eq!(snapshot.jobs_failed, 2);
    }

    #[test]
    fn test_prometheus_mirror() {
        let registry = Registry::new();
        let metrics = MarketMetrics::with_registry(&registry).unwrap();
        metrics.record_lost();
        metrics.record_lost();

        let lost = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "arena_jobs_lost_total")
            .unwrap();
        assert_eq!(lost.get_metric()[0].get_counter().get_value(), 2.0);
        assert_eq!(metrics.snapshot().jobs_lost, 2);
    }
}
