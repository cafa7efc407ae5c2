//! Infers a job's pass/fail status by matching its name against test cases.
//!
//! A test case is a match for a job named `N` when any of these hold,
//! checked in order:
//!
//! 1. `N` equals the case's fully-qualified name
//! 2. `N` contains the case's display name
//! 3. the case's fully-qualified name contains `N` as a whole word
//!
//! The first matching case decides: `Passed`/`Fixed` means the job passed,
//! any other status means it failed. Every case is scanned first; only if
//! none matches are the passed cases scanned on their own.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::{debug, trace, warn};

use crate::job_record::JobRecord;
use crate::test_results::{TestCaseOutcome, TestResults};

/// Upper bound on the compiled size of a job-name pattern.
const NAME_PATTERN_SIZE_LIMIT: usize = 1 << 20;

static LEADING_WORD_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w").unwrap());
static TRAILING_WORD_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w$").unwrap());

/// Matches job names against one run's test results.
#[derive(Debug, Clone, Copy)]
pub struct NameMatcher<'a> {
    results: Option<&'a TestResults>,
}

impl<'a> NameMatcher<'a> {
    #[must_use]
    pub fn new(results: Option<&'a TestResults>) -> Self {
        Self { results }
    }

    /// `Some(true)` if the matching case passed, `Some(false)` if it did
    /// not, `None` when nothing matched or inference does not apply (no
    /// results, name unknown, status already set).
    #[must_use]
    pub fn infer(&self, job: &JobRecord) -> Option<bool> {
        let results = self.results?;
        if job.status().is_some() {
            return None;
        }
        let name = job.name()?;

        let whole_word = match whole_word_pattern(name) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                warn!(
                    job_id = job.job_id(),
                    error = %err,
                    "Could not build job name pattern; whole-word matching disabled for this job"
                );
                None
            }
        };
        let is_match = |case: &&TestCaseOutcome| case_matches(name, whole_word.as_ref(), case);

        if let Some(case) = results.cases().find(is_match) {
            trace!(job_id = job.job_id(), case = %case.full_name, "Matched test case");
            return Some(case.status.is_passed());
        }

        debug!(
            job_id = job.job_id(),
            "No matches with suites, attempting passed tests"
        );
        results
            .passed_cases()
            .find(is_match)
            .map(|case| case.status.is_passed())
    }
}

fn case_matches(name: &str, whole_word: Option<&Regex>, case: &TestCaseOutcome) -> bool {
    name == case.full_name
        || (!case.display_name.is_empty() && name.contains(case.display_name.as_str()))
        || whole_word.is_some_and(|pattern| pattern.is_match(&case.full_name))
}

/// Literal pattern for `name`, bounded by `\b` on each side that begins or
/// ends with a word character.
pub fn whole_word_pattern(name: &str) -> Result<Regex, regex::Error> {
    let leading = if LEADING_WORD_CHAR.is_match(name) {
        r"\b"
    } else {
        ""
    };
    let trailing = if TRAILING_WORD_CHAR.is_match(name) {
        r"\b"
    } else {
        ""
    };
    RegexBuilder::new(&format!("{leading}{}{trailing}", regex::escape(name)))
        .size_limit(NAME_PATTERN_SIZE_LIMIT)
        .build()
}
