//! Deterministic outcome grading
//!
//! | category         | success when                                          |
//! |------------------|-------------------------------------------------------|
//! | `classification` | `artifact.trim() == payload.answer`                   |
//! | `summarize`      | whitespace token count in `[1, payload.maxWords]`     |
//! | `math`           | `artifact` parses to `payload.expected` (±1e-9)       |
//! | `extract`        | `artifact` contains `payload.mustContain`, any case   |
//!
//! Anything else, including missing or ill-typed payload fields, grades as a
//! failure.

use arena_common::Payload;
use serde_json::Value;

pub const CLASSIFICATION: &str = "classification";
pub const SUMMARIZE: &str = "summarize";
pub const MATH: &str = "math";
pub const EXTRACT: &str = "extract";

/// Absolute tolerance for numeric answers
pub const MATH_TOLERANCE: f64 = 1e-9;

/// Stateless grader
pub struct Grader;

impl Grader {
    /// Grade an artifact against a job's payload
    pub fn grade(category: &str, payload: &Payload, artifact: &str) -> bool {
        match category {
            CLASSIFICATION => Self::classification(payload, artifact),
            SUMMARIZE => Self::summarize(payload, artifact),
            MATH => Self::math(payload, artifact),
            EXTRACT => Self::extract(payload, artifact),
            _ => false,
        }
    }

    fn classification(payload: &Payload, artifact: &str) -> bool {
        payload
            .get("answer")
            .and_then(Value::as_str)
            .is_some_and(|answer| artifact.trim() == answer)
    }

    fn summarize(payload: &Payload, artifact: &str) -> bool {
        let Some(max_words) = payload.get("maxWords").and_then(Value::as_u64) else {
            return false;
        };
        let words = artifact.split_whitespace().count() as u64;
        (1..=max_words).contains(&words)
    }

    fn math(payload: &Payload, artifact: &str) -> bool {
        let Some(expected) = payload.get("expected").and_then(Value::as_f64) else {
            return false;
        };
        match artifact.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => (value - expected).abs() <= MATH_TOLERANCE,
            _ => false,
        }
    }

    fn extract(payload: &Payload, artifact: &str) -> bool {
        match payload.get("mustContain").and_then(Value::as_str) {
            // An empty needle would match anything
            Some(needle) if !needle.is_empty() => artifact
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_classification() {
        let p = payload(json!({"prompt": "ping", "answer": "pong"}));
        assert!(Grader::grade(CLASSIFICATION, &p, "pong"));
        assert!(Grader::grade(CLASSIFICATION, &p, "  pong\n"));
        assert!(!Grader::grade(CLASSIFICATION, &p, "Pong"));
        assert!(!Grader::grade(CLASSIFICATION, &p, ""));
    }

    #[test]
    fn test_summarize_word_bounds() {
        let p = payload(json!({"text": "...", "maxWords": 3}));
        assert!(Grader::grade(SUMMARIZE, &p, "one"));
        assert!(Grader::grade(SUMMARIZE, &p, "one two  three"));
        assert!(!Grader::grade(SUMMARIZE, &p, "one two three four"));
        assert!(!Grader::grade(SUMMARIZE, &p, "   "));
    }

    #[test]
    fn test_math_tolerance() {
        let p = payload(json!({"expression": "0.1 + 0.2", "expected": 0.3}));
        assert!(Grader::grade(MATH, &p, "0.30000000000000004"));
        assert!(Grader::grade(MATH, &p, " 0.3 "));
        assert!(!Grader::grade(MATH, &p, "0.31"));
        assert!(!Grader::grade(MATH, &p, "three tenths"));
        assert!(!Grader::grade(MATH, &p, "NaN"));

        let integer = payload(json!({"expected": 42}));
        assert!(Grader::grade(MATH, &integer, "42"));
    }

    #[test]
    fn test_extract_case_insensitive() {
        let p = payload(json!({"text": "...", "mustContain": "Rust"}));
        assert!(Grader::grade(EXTRACT, &p, "written in rust."));
        assert!(!Grader::grade(EXTRACT, &p, "written in go"));

        let empty = payload(json!({"mustContain": ""}));
        assert!(!Grader::grade(EXTRACT, &empty, "anything"));
    }

    #[test]
    fn test_missing_or_ill_typed_fields_fail() {
        let empty = Payload::new();
        for category in [CLASSIFICATION, SUMMARIZE, MATH, EXTRACT] {
            assert!(!Grader::grade(category, &empty, "anything"));
        }

        let wrong = payload(json!({"answer": 1, "maxWords": "ten", "expected": "4", "mustContain": 7}));
        assert!(!Grader::grade(CLASSIFICATION, &wrong, "1"));
        assert!(!Grader::grade(SUMMARIZE, &wrong, "a b"));
        assert!(!Grader::grade(MATH, &wrong, "4"));
        assert!(!Grader::grade(EXTRACT, &wrong, "7"));
    }

    #[test]
    fn test_unknown_category_fails() {
        let p = payload(json!({"answer": "x"}));
        assert!(!Grader::grade("translation", &p, "x"));
    }
}
