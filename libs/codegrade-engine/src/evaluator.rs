/// Output Evaluator - Language-Agnostic Comparison Logic
///
/// **Core Responsibility:**
/// Decide whether one execution produced the expected output, and turn the
/// caller's serialized test cases into stdin payloads and expectations.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about language runtimes
/// - Pure functions: (execution result, expected output) → status
///
/// **Normalization Rules (Applied to All Languages):**
/// - Trim leading and trailing whitespace: YES
/// - Case sensitivity: YES (exact match required)
/// - Internal whitespace: preserved, must match
/// - Floating-point tolerance: NO

use codegrade_common::types::{ExecutionResult, LegacyTestCase, StructuredTestCase};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    WrongAnswer,
    RuntimeError,
    TimeLimitExceeded,
}

impl CaseStatus {
    pub fn describe(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "passed",
            CaseStatus::WrongAnswer => "wrong answer",
            CaseStatus::RuntimeError => "runtime error",
            CaseStatus::TimeLimitExceeded => "time limit exceeded",
        }
    }
}

pub fn normalize_output(output: &str) -> &str {
    output.trim()
}

pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize_output(actual) == normalize_output(expected)
}

/// Status of one test-case run
///
/// Priority: timeout, then any exit other than 0 (including launcher
/// failures), then output comparison.
pub fn evaluate_case(result: &ExecutionResult, expected: &str) -> CaseStatus {
    if result.timed_out {
        CaseStatus::TimeLimitExceeded
    } else if result.exit_code != Some(0) {
        CaseStatus::RuntimeError
    } else if outputs_match(&result.stdout, expected) {
        CaseStatus::Passed
    } else {
        CaseStatus::WrongAnswer
    }
}

/// Text form of a JSON value as shown to students and fed to programs
///
/// Strings lose their quotes, lists print as `[a, b]`.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", items.join(", "))
        }
        other => other.to_string(),
    }
}

/// Stdin payload for a test-case input: lists become one element per line
pub fn stdin_for(input: &Value) -> String {
    match input {
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(render_value).collect::<Vec<_>>().join("\n"),
        other => render_value(other),
    }
}

pub fn parse_structured(json: &str) -> serde_json::Result<Vec<StructuredTestCase>> {
    serde_json::from_str(json)
}

pub fn parse_legacy(json: &str) -> serde_json::Result<Vec<LegacyTestCase>> {
    serde_json::from_str(json)
}

/// Legacy inputs are ordered scalars, one per line
pub fn legacy_stdin(case: &LegacyTestCase) -> String {
    case.input.iter().map(render_value).collect::<Vec<_>>().join("\n")
}
