//! Simulated agent capability
//!
//! Stands in for a real LLM-backed agent. The chance of producing a correct
//! artifact depends on the agent's traits:
//!
//! ```text
//! p = BASE_SKILL
//!   - |temperature - ideal(category)| × TEMPERATURE_WEIGHT
//!   + TOOL_BONUS   if the agent has the category's tool
//! ```
//!
//! Browser use costs one resource unit per job.

use arena_common::{AgentError, Job};
use arena_market::grader::{CLASSIFICATION, EXTRACT, MATH, SUMMARIZE};
use arena_market::{AgentCapability, AgentOutput, AgentProfile};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

pub const BASE_SKILL: f64 = 0.6;
pub const TEMPERATURE_WEIGHT: f64 = 0.4;
pub const TOOL_BONUS: f64 = 0.25;

pub struct SimulatedAgent {
    rng: Mutex<StdRng>,
}

impl SimulatedAgent {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Probability that `profile` answers a `category` job correctly
    pub fn success_probability(profile: &AgentProfile, category: &str) -> f64 {
        let (ideal_temperature, tool) = match category {
            CLASSIFICATION => (0.2, "search"),
            SUMMARIZE => (0.7, "memory"),
            MATH => (0.0, "calculator"),
            EXTRACT => (0.2, "browser"),
            _ => (0.5, ""),
        };
        let traits = &profile.traits;
        let mut p = BASE_SKILL - (traits.temperature - ideal_temperature).abs() * TEMPERATURE_WEIGHT;
        if traits.tool_set.contains(tool) {
            p += TOOL_BONUS;
        }
        p.clamp(0.05, 0.95)
    }

    fn correct_artifact(job: &Job) -> String {
        match job.category.as_str() {
            CLASSIFICATION => job.payload_str("answer").unwrap_or_default().to_string(),
            SUMMARIZE => job
                .payload_str("text")
                .unwrap_or_default()
                .split_whitespace()
                .take(5)
                .collect::<Vec<_>>()
                .join(" "),
            MATH => job
                .payload
                .get("expected")
                .and_then(Value::as_f64)
                .map(|v| v.to_string())
                .unwrap_or_default(),
            EXTRACT => job.payload_str("mustContain").unwrap_or_default().to_string(),
            _ => String::new(),
        }
    }

    fn wrong_artifact(job: &Job) -> String {
        match job.category.as_str() {
            // Too long for any template budget
            SUMMARIZE => job.payload_str("text").unwrap_or("no summary").repeat(4),
            MATH => "NaN".to_string(),
            _ => "i am not sure".to_string(),
        }
    }
}

#[async_trait]
impl AgentCapability for SimulatedAgent {
    async fn handle(&self, profile: &AgentProfile, job: &Job) -> Result<AgentOutput, AgentError> {
        let p = Self::success_probability(profile, &job.category);
        let correct = self.rng.lock().gen_bool(p);

        let artifact = if correct {
            Self::correct_artifact(job)
        } else {
            Self::wrong_artifact(job)
        };
        let resource_units = u64::from(profile.traits.tool_set.contains("browser"));

        Ok(AgentOutput::new(artifact, resource_units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::{Blueprint, JobSpec, ReproductionPolicy, Traits};
    use arena_market::{Grader, JobGenerator, TemplateJobGenerator};
    use uuid::Uuid;

    fn profile(temperature: f64, tools: &[&str]) -> AgentProfile {
        let traits = Traits {
            temperature,
            tool_set: tools.iter().map(|t| t.to_string()).collect(),
            ..Traits::default()
        };
        AgentProfile::new(Uuid::new_v4(), &Blueprint::new(traits, ReproductionPolicy::default()))
    }

    #[test]
    fn test_traits_shape_skill() {
        let tuned = profile(0.0, &["calculator"]);
        let hot = profile(1.0, &[]);
        assert!(
            SimulatedAgent::success_probability(&tuned, MATH)
                > SimulatedAgent::success_probability(&hot, MATH)
        );
        assert!((SimulatedAgent::success_probability(&tuned, MATH) - 0.85).abs() < 1e-12);
        assert!((SimulatedAgent::success_probability(&hot, "translation") - 0.4).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_artifacts_grade_as_expected() {
        let generator = TemplateJobGenerator::new(9);
        for _ in 0..100 {
            let job = Job::from_spec(generator.generate_job().await.unwrap());
            assert!(Grader::grade(&job.category, &job.payload, &SimulatedAgent::correct_artifact(&job)));
            assert!(!Grader::grade(&job.category, &job.payload, &SimulatedAgent::wrong_artifact(&job)));
        }
    }

    #[tokio::test]
    async fn test_browser_costs_one_unit() {
        let agent = SimulatedAgent::new(1);
        let job = Job::from_spec(JobSpec::fallback());

        let output = agent.handle(&profile(0.2, &["browser"]), &job).await.unwrap();
        assert_eq!(output.resource_units_used, 1);
        let output = agent.handle(&profile(0.2, &["search"]), &job).await.unwrap();
        assert_eq!(output.resource_units_used, 0);
    }
}
