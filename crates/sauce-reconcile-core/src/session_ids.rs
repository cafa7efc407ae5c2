//! Session id extraction from build and test output.
//!
//! Sauce Labs client bindings print one marker line per remote session:
//!
//! ```text
//! SauceOnDemandSessionID=2f9c1a7e04b54c4d8a1c job-name=LoginTest
//! ```
//!
//! Every line carrying that marker yields a [`SessionReference`]. Lines
//! without it are not errors; they produce nothing.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Marker line printed by Sauce client bindings. The job label is optional
/// and separated from the id by exactly one character.
static SESSION_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SauceOnDemandSessionID=([0-9a-fA-F]+(?:-[0-9a-fA-F]+)*)(?:.job-name=(.*))?")
        .unwrap()
});

/// One occurrence of a session marker in a log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReference {
    /// Remote job id (Sauce calls it the session id).
    pub session_id: String,
    /// Human-readable label printed after `job-name=`, if any.
    pub job_name: Option<String>,
    /// Whether the line came from the build's own console output rather
    /// than captured test output.
    pub from_standard_output: bool,
}

/// Parse a single line. Returns `None` when the line carries no marker.
#[must_use]
pub fn parse_line(line: &str, from_standard_output: bool) -> Option<SessionReference> {
    let captures = SESSION_ID_PATTERN.captures(line)?;
    let session_id = captures.get(1)?.as_str().to_string();
    let job_name = captures
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
        .map(String::from);

    Some(SessionReference {
        session_id,
        job_name,
        from_standard_output,
    })
}

/// Extract every session reference from `texts`, in input order.
///
/// Each text is split on `\n` and `\r`. `None` entries (streams that were
/// never captured) are skipped. Duplicates are kept; callers key on
/// `session_id` when they need uniqueness.
pub fn extract<'a, I>(from_standard_output: bool, texts: I) -> Vec<SessionReference>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut found = Vec::new();
    for text in texts.into_iter().flatten() {
        for line in text.split(['\n', '\r']) {
            if let Some(reference) = parse_line(line, from_standard_output) {
                trace!(job_id = %reference.session_id, "Extracted session id");
                found.push(reference);
            }
        }
    }
    found
}
