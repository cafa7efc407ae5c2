//! Test-suite results as reported by the CI test publisher.
//!
//! These are read-only inputs to reconciliation. The JSON shape mirrors what
//! JUnit-style report collectors emit after parsing XML reports.

use serde::{Deserialize, Serialize};

/// Outcome of one test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    #[serde(alias = "PASSED")]
    Passed,
    #[serde(alias = "SKIPPED")]
    Skipped,
    #[serde(alias = "FAILED")]
    Failed,
    /// Passed now, failed in the previous build.
    #[serde(alias = "FIXED")]
    Fixed,
    /// Failed now, passed in the previous build.
    #[serde(alias = "REGRESSION")]
    Regression,
}

impl CaseStatus {
    #[must_use]
    pub fn is_passed(self) -> bool {
        matches!(self, Self::Passed | Self::Fixed)
    }

    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed | Self::Regression)
    }
}

/// One executed test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    /// Fully-qualified name, e.g. `com.acme.LoginTest.validPassword`.
    pub full_name: String,
    /// Short name shown in reports; derived from `full_name` when absent.
    #[serde(default)]
    pub display_name: String,
    pub status: CaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack_trace: Option<String>,
}

impl TestCaseOutcome {
    /// Build a case whose display name is the last segment of `full_name`.
    #[must_use]
    pub fn new(full_name: impl Into<String>, status: CaseStatus) -> Self {
        let full_name = full_name.into();
        let display_name = short_name(&full_name).to_string();
        Self {
            full_name,
            display_name,
            status,
            stdout: None,
            stderr: None,
            error_stack_trace: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    #[must_use]
    pub fn with_output(mut self, stdout: Option<&str>, stderr: Option<&str>) -> Self {
        self.stdout = stdout.map(String::from);
        self.stderr = stderr.map(String::from);
        self
    }

    #[must_use]
    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.error_stack_trace = Some(trace.into());
        self
    }
}

/// Segment after the last `.` or `#` separator.
fn short_name(full_name: &str) -> &str {
    full_name
        .rsplit(|c: char| c == '.' || c == '#')
        .next()
        .unwrap_or(full_name)
}

/// One test suite with its captured streams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteResult {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default)]
    pub cases: Vec<TestCaseOutcome>,
}

/// All suites reported for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    #[serde(default)]
    pub suites: Vec<SuiteResult>,
}

impl TestResults {
    #[must_use]
    pub fn new(suites: Vec<SuiteResult>) -> Self {
        Self { suites }
    }

    /// Fill in display names left empty by the report producer.
    pub fn normalize(&mut self) {
        for case in self.suites.iter_mut().flat_map(|s| s.cases.iter_mut()) {
            if case.display_name.is_empty() {
                case.display_name = short_name(&case.full_name).to_string();
            }
        }
    }

    /// Every case across every suite, in report order.
    pub fn cases(&self) -> impl Iterator<Item = &TestCaseOutcome> {
        self.suites.iter().flat_map(|suite| suite.cases.iter())
    }

    /// Cases that passed (including ones that were fixed in this run).
    pub fn passed_cases(&self) -> impl Iterator<Item = &TestCaseOutcome> {
        self.cases().filter(|case| case.status.is_passed())
    }

    /// Cases that failed (including regressions).
    pub fn failed_cases(&self) -> impl Iterator<Item = &TestCaseOutcome> {
        self.cases().filter(|case| case.status.is_failed())
    }

    /// (passed, failed, skipped) counts.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for case in self.cases() {
            match case.status {
                CaseStatus::Passed | CaseStatus::Fixed => counts.0 += 1,
                CaseStatus::Failed | CaseStatus::Regression => counts.1 += 1,
                CaseStatus::Skipped => counts.2 += 1,
            }
        }
        counts
    }
}
