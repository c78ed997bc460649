//! Job generation
//!
//! The generation loop asks the generator for a batch of jobs on a fixed
//! interval. A failed, malformed or hung request is replaced by
//! [`JobSpec::fallback`], so every round produces a full batch.

use std::sync::Arc;

use arena_common::{GeneratorError, Job, JobSpec, Payload};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::grader::{CLASSIFICATION, EXTRACT, MATH, SUMMARIZE};
use crate::MarketConfig;

/// Produces job specs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobGenerator: Send + Sync {
    async fn generate_job(&self) -> Result<JobSpec, GeneratorError>;
}

const CLASSIFICATION_PROMPTS: &[(&str, &str)] = &[
    ("Sentiment of 'I love this product': positive or negative?", "positive"),
    ("Sentiment of 'The delivery never arrived': positive or negative?", "negative"),
    ("Is 17 a prime number? yes or no", "yes"),
    ("Is the Pacific an ocean or a sea?", "ocean"),
    ("Language of 'bonjour tout le monde'?", "french"),
];

const SUMMARIZE_TEXTS: &[(&str, u64)] = &[
    (
        "The quarterly report shows revenue grew twelve percent while costs stayed flat, \
         driven mostly by new subscriptions in the European market.",
        12,
    ),
    (
        "After three days of heavy rain the river rose above its banks and several roads \
         near the old mill were closed until further notice.",
        10,
    ),
    (
        "The team shipped the new search feature, fixed two long standing crashes and \
         started planning the migration to the new database cluster.",
        15,
    ),
];

const EXTRACT_TEXTS: &[(&str, &str)] = &[
    ("Contact the billing desk at billing@example.com for refunds.", "billing@example.com"),
    ("The meeting moved to Room 42 on the third floor.", "Room 42"),
    ("Order #A-1093 shipped on Tuesday via ground freight.", "A-1093"),
];

/// Draws jobs from built-in templates
pub struct TemplateJobGenerator {
    rng: Mutex<StdRng>,
}

impl TemplateJobGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn next_spec(&self) -> JobSpec {
        let mut rng = self.rng.lock();
        let mut payload = Payload::new();

        let category = match rng.gen_range(0..4) {
            0 => {
                let (prompt, answer) = CLASSIFICATION_PROMPTS
                    .choose(&mut *rng)
                    .copied()
                    .unwrap_or(("ping", "pong"));
                payload.insert("prompt".into(), prompt.into());
                payload.insert("answer".into(), answer.into());
                CLASSIFICATION
            }
            1 => {
                let (text, max_words) = SUMMARIZE_TEXTS
                    .choose(&mut *rng)
                    .copied()
                    .unwrap_or(("", 1));
                payload.insert("text".into(), text.into());
                payload.insert("maxWords".into(), max_words.into());
                SUMMARIZE
            }
            2 => {
                let a: i64 = rng.gen_range(1..100);
                let b: i64 = rng.gen_range(1..100);
                let (op, expected) = match rng.gen_range(0..3) {
                    0 => ("+", a + b),
                    1 => ("-", a - b),
                    _ => ("*", a * b),
                };
                payload.insert("expression".into(), format!("{} {} {}", a, op, b).into());
                payload.insert("expected".into(), (expected as f64).into());
                MATH
            }
            _ => {
                let (text, needle) = EXTRACT_TEXTS
                    .choose(&mut *rng)
                    .copied()
                    .unwrap_or(("", ""));
                payload.insert("text".into(), text.into());
                payload.insert("mustContain".into(), needle.into());
                EXTRACT
            }
        };

        JobSpec::new(category, payload, rng.gen_range(1..=5), 60)
    }
}

#[async_trait]
impl JobGenerator for TemplateJobGenerator {
    async fn generate_job(&self) -> Result<JobSpec, GeneratorError> {
        Ok(self.next_spec())
    }
}

/// Periodic job production
pub struct GenerationLoop {
    generator: Arc<dyn JobGenerator>,
    dispatcher: Arc<Dispatcher>,
    config: MarketConfig,
}

impl GenerationLoop {
    pub fn new(generator: Arc<dyn JobGenerator>, dispatcher: Arc<Dispatcher>, config: MarketConfig) -> Self {
        Self {
            generator,
            dispatcher,
            config,
        }
    }

    /// One spec from the generator, or the fallback
    pub async fn next_spec(&self) -> JobSpec {
        let result = tokio::time::timeout(
            self.config.generation_interval(),
            self.generator.generate_job(),
        )
        .await;

        let error = match result {
            Ok(Ok(spec)) => match spec.validate() {
                Ok(()) => return spec,
                Err(e) => e,
            },
            Ok(Err(e)) => e,
            Err(_) => GeneratorError::Failed("generator timed out".into()),
        };

        warn!(error = %error, "Job generation failed, using fallback job");
        self.dispatcher.metrics().record_fallback();
        JobSpec::fallback()
    }

    /// Generate and dispatch one batch; returns the number of jobs queued
    pub async fn run_once(&self) -> usize {
        self.dispatcher.sync_workers().await;

        let mut queued = 0;
        for _ in 0..self.config.jobs_per_interval {
            let job = Job::from_spec(self.next_spec().await);
            let job_id = job.id;
            match self.dispatcher.dispatch(job).await {
                Ok(agent_id) => {
                    queued += 1;
                    debug!(job_id = %job_id, agent_id = %agent_id, "Job dispatched");
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Job dropped");
                }
            }
        }

        info!(queued, requested = self.config.jobs_per_interval, "Generation round complete");
        queued
    }

    /// Start the periodic generation task; the first round runs immediately
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.generation_interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if self.dispatcher.is_shut_down() {
                    break;
                }
                self.run_once().await;
            }
            info!("Generation loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentCapability, AgentOutput, AgentProfile};
    use crate::grader::Grader;
    use crate::metrics::MarketMetrics;
    use arena_common::{AgentError, AgentState, Blueprint, ReproductionPolicy, Traits};
    use arena_ledger::{InMemoryStore, PopulationStore};

    struct Idle;

    #[async_trait]
    impl AgentCapability for Idle {
        async fn handle(&self, _profile: &AgentProfile, _job: &Job) -> Result<AgentOutput, AgentError> {
            Ok(AgentOutput::new("", 0))
        }
    }

    async fn dispatcher(agents: usize) -> Arc<Dispatcher> {
        let store = Arc::new(InMemoryStore::new());
        let blueprint_id = store
            .insert_blueprint(Blueprint::new(Traits::default(), ReproductionPolicy::default()))
            .await
            .unwrap();
        for _ in 0..agents {
            store
                .insert_agent(AgentState::new(blueprint_id, 10, 0.5))
                .await
                .unwrap();
        }
        Arc::new(Dispatcher::new(
            store,
            Arc::new(Idle),
            Arc::new(MarketMetrics::new()),
            MarketConfig::default(),
        ))
    }

    fn config(jobs: usize) -> MarketConfig {
        MarketConfig {
            jobs_per_interval: jobs,
            ..MarketConfig::default()
        }
    }

    #[test]
    fn test_templates_are_gradable() {
        let generator = TemplateJobGenerator::new(7);
        for _ in 0..200 {
            let spec = generator.next_spec();
            assert!(spec.validate().is_ok());
            assert!((1..=5).contains(&spec.payout));

            // The reference answer for each template grades as a success
            let answer = match spec.category.as_str() {
                CLASSIFICATION => spec.payload["answer"].as_str().unwrap().to_string(),
                SUMMARIZE => "short summary".to_string(),
                MATH => spec.payload["expected"].as_f64().unwrap().to_string(),
                EXTRACT => spec.payload["mustContain"].as_str().unwrap().to_string(),
                other => panic!("unexpected category {}", other),
            };
            assert!(Grader::grade(&spec.category, &spec.payload, &answer));
        }
    }

    #[test]
    fn test_same_seed_same_jobs() {
        let a = TemplateJobGenerator::new(11);
        let b = TemplateJobGenerator::new(11);
        for _ in 0..20 {
            assert_eq!(a.next_spec(), b.next_spec());
        }
    }

    #[tokio::test]
    async fn test_failures_replaced_by_fallback() {
        let dispatcher = dispatcher(2).await;
        let mut generator = MockJobGenerator::new();
        let mut calls = 0;
        generator.expect_generate_job().times(4).returning(move || {
            calls += 1;
            match calls {
                2 => Err(GeneratorError::Failed("upstream 503".into())),
                3 => Ok(JobSpec::new("", Payload::new(), 1, 60)),
                _ => Ok(JobSpec::new("math", Payload::new(), 3, 60)),
            }
        });

        let generation = GenerationLoop::new(Arc::new(generator), dispatcher.clone(), config(4));
        assert_eq!(generation.run_once().await, 4);

        let snapshot = dispatcher.metrics().snapshot();
        assert_eq!(snapshot.fallback_jobs, 2);
        assert_eq!(snapshot.jobs_dispatched, 4);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_alive_agents_drops_jobs() {
        let dispatcher = dispatcher(0).await;
        let generation = GenerationLoop::new(
            Arc::new(TemplateJobGenerator::new(1)),
            dispatcher.clone(),
            config(3),
        );
        assert_eq!(generation.run_once().await, 0);
        assert_eq!(dispatcher.metrics().snapshot().jobs_dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_each_interval() {
        let dispatcher = dispatcher(1).await;
        let generation = Arc::new(GenerationLoop::new(
            Arc::new(TemplateJobGenerator::new(3)),
            dispatcher.clone(),
            config(2),
        ));

        let handle = generation.clone().start();
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;
        handle.abort();

        // Rounds at t=0 and t=60
        assert_eq!(dispatcher.metrics().snapshot().jobs_dispatched, 4);
    }
}
