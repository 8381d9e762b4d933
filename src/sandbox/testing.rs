use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{FileDescriptor, Result, run_files};

/// How a test case's expected output is matched against actual output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    #[default]
    Equals,
    Contains,
}

fn default_true() -> bool {
    true
}

/// A structured test case: stdin in, expected stdout out.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub expected_output: String,
    #[serde(default)]
    pub comparison: Comparison,
    #[serde(default = "default_true")]
    pub strip_output: bool,
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
}

/// Per-case grading record, one for every case actually attempted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TestCaseResult {
    pub name: String,
    pub stdin: Option<String>,
    pub expected_output: String,
    pub actual_output: String,
    pub comparison: Comparison,
    pub strip_output: bool,
    pub exit_code: i32,
    pub timed_out: bool,
    pub stderr: String,
    pub duration: f64,
    pub passed: bool,
}

/// Pure comparison between actual and expected output.
pub fn output_matches(actual: &str, expected: &str, comparison: Comparison, strip: bool) -> bool {
    let (actual, expected) = if strip {
        (actual.trim(), expected.trim())
    } else {
        (actual, expected)
    };
    match comparison {
        Comparison::Equals => actual == expected,
        Comparison::Contains => actual.contains(expected),
    }
}

/// Runs a sanitized manifest against a list of test cases in order.
///
/// The manifest is sanitized once by the caller and reused across every case.
/// A timeout or nonzero exit fails the case regardless of its output. When a
/// failing case has `stop_on_failure` set (the default), remaining cases are
/// not attempted and the result list reflects only the attempted ones. An
/// empty case list passes unconditionally.
pub async fn run_test_cases(
    files: &[FileDescriptor],
    entrypoint: &str,
    cases: &[TestCase],
    time_limit: Duration,
) -> Result<(bool, Vec<TestCaseResult>)> {
    if cases.is_empty() {
        return Ok((true, Vec::new()));
    }

    let mut results = Vec::with_capacity(cases.len());
    let mut all_passed = true;

    for (index, case) in cases.iter().enumerate() {
        let name = case
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("case_{}", index + 1));

        let execution = run_files(files, entrypoint, case.stdin.as_deref(), time_limit).await?;

        let passed = !execution.timed_out
            && execution.exit_code == 0
            && output_matches(
                &execution.stdout,
                &case.expected_output,
                case.comparison,
                case.strip_output,
            );

        results.push(TestCaseResult {
            name,
            stdin: case.stdin.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: execution.stdout,
            comparison: case.comparison,
            strip_output: case.strip_output,
            exit_code: execution.exit_code,
            timed_out: execution.timed_out,
            stderr: execution.stderr,
            duration: execution.duration,
            passed,
        });

        if !passed {
            all_passed = false;
            if case.stop_on_failure {
                break;
            }
        }
    }

    Ok((all_passed, results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_comparison_with_strip() {
        assert!(output_matches("5\n", "5", Comparison::Equals, true));
        assert!(output_matches("  5  ", "5", Comparison::Equals, true));
        assert!(!output_matches("5\n", "5", Comparison::Equals, false));
        assert!(!output_matches("6", "5", Comparison::Equals, true));
    }

    #[test]
    fn contains_comparison() {
        assert!(output_matches("total: 42 items", "42", Comparison::Contains, true));
        assert!(!output_matches("nothing here", "42", Comparison::Contains, true));
        // Strip applies to both sides before the substring check.
        assert!(output_matches("42", " 42 ", Comparison::Contains, true));
    }

    #[test]
    fn test_case_defaults() {
        let case: TestCase = serde_json::from_str(r#"{"expected_output": "ok"}"#).unwrap();
        assert_eq!(case.comparison, Comparison::Equals);
        assert!(case.strip_output);
        assert!(case.stop_on_failure);
        assert!(case.stdin.is_none());
    }

    #[test]
    fn unknown_comparison_is_rejected() {
        let result: std::result::Result<TestCase, _> =
            serde_json::from_str(r#"{"expected_output": "", "comparison": "regex"}"#);
        assert!(result.is_err());
    }
}
