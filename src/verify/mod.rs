//! Solution verification on top of [`Engine::execute`].
//!
//! A challenge names a language, an optional entry function and a list of
//! cases. Script and Python solutions get a driver call appended per case;
//! compiled solutions run as-is and are judged on their stdout.

use crate::config::types::ExecutionResult;
use crate::engine::{Engine, Language};
use crate::sandbox::ContextExtensions;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entry point assumed for script challenges that do not name one
pub const DEFAULT_ENTRY: &str = "main";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Exact text match against the expected value's display form
    Strict,
    /// Whitespace-trimmed match, numeric equality, or case-insensitive booleans
    #[default]
    Loose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: Vec<Value>,
    pub expected: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub language: Language,
    #[serde(default)]
    pub function_name: Option<String>,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseOutcome {
    pub input: Vec<Value>,
    pub expected: Value,
    /// Observed value, or `Error: <message>` when the run failed
    pub actual: Option<String>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub cases: Vec<CaseOutcome>,
}

/// Full program for one case
pub fn driver_source(language: Language, code: &str, function_name: Option<&str>, input: &[Value]) -> String {
    let args = || {
        input
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    match (language, function_name) {
        (Language::JavaScript, name) => {
            format!("{}\n{}({});", code, name.unwrap_or(DEFAULT_ENTRY), args())
        }
        (Language::Python, Some(name)) => format!("{}\nprint({}({}))", code, name, args()),
        _ => code.to_string(),
    }
}

/// What a case is judged on: the sandbox result, or the joined stdout
fn observed(language: Language, result: &ExecutionResult) -> Option<String> {
    if language.is_in_process() {
        result.result().map(str::to_string)
    } else {
        Some(result.logs().join("").trim().to_string())
    }
}

/// Display form of an expected value. Strings compare without quotes.
fn expected_text(expected: &Value) -> String {
    match expected {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn matches(actual: &str, expected: &Value, mode: ComparisonMode) -> bool {
    let expected = expected_text(expected);
    match mode {
        ComparisonMode::Strict => actual == expected,
        ComparisonMode::Loose => {
            let (actual, expected) = (actual.trim(), expected.trim());
            if actual == expected {
                return true;
            }
            if let (Ok(a), Ok(e)) = (actual.parse::<f64>(), expected.parse::<f64>()) {
                return a == e;
            }
            let is_bool = |s: &str| s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false");
            is_bool(actual) && is_bool(expected) && actual.eq_ignore_ascii_case(expected)
        }
    }
}

/// Run every case and report which passed. All cases run even after a failure.
pub fn verify_solution(engine: &Engine, challenge: &Challenge, code: &str, mode: ComparisonMode) -> VerificationReport {
    let extensions = ContextExtensions::new();
    let mut cases = Vec::with_capacity(challenge.cases.len());

    for case in &challenge.cases {
        let source = driver_source(
            challenge.language,
            code,
            challenge.function_name.as_deref(),
            &case.input,
        );
        let result = engine.execute_language(&source, challenge.language, &extensions);

        let (actual, passed) = if result.success() {
            let actual = observed(challenge.language, &result);
            let passed = actual
                .as_deref()
                .map(|actual| matches(actual, &case.expected, mode))
                .unwrap_or(false);
            (actual, passed)
        } else {
            (Some(format!("Error: {}", result.error().unwrap_or_default())), false)
        };

        log::debug!(
            "Case {:?} -> {:?} ({})",
            case.input,
            actual,
            if passed { "passed" } else { "failed" }
        );
        cases.push(CaseOutcome {
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual,
            passed,
        });
    }

    VerificationReport {
        passed: cases.iter().all(|c| c.passed),
        cases,
    }
}
