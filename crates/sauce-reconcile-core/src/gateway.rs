//! Collaborator interfaces consumed by the reconciliation engine.
//!
//! The engine never talks HTTP, reads files, or knows about the host CI
//! system directly. Everything outside the reconciliation logic comes in
//! through one of these traits:
//!
//! - [`RemoteJobGateway`]: fetch and update remote jobs
//! - [`RunLogSource`]: the run's raw console output
//! - [`TestSuiteSource`]: parsed test-suite results, if any were published
//! - [`RunContext`]: build identity, user-visible listener, job persistence

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Cursor};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{GatewayError, Result};
use crate::job_record::{Changeset, JobSet};
use crate::test_results::TestResults;

/// Job details as stored by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJob {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(
        rename = "custom-data",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub custom_data: BTreeMap<String, String>,
}

/// The REST API sends `"custom-data": null` for jobs that never had any.
fn null_as_empty<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Access to remote job records.
///
/// Implementations block the caller. Timeouts and retries, if any, belong
/// to the implementation.
pub trait RemoteJobGateway {
    fn job_details(&self, job_id: &str) -> std::result::Result<RemoteJob, GatewayError>;

    fn update_job(&self, job_id: &str, changes: &Changeset)
    -> std::result::Result<(), GatewayError>;
}

impl<G: RemoteJobGateway + ?Sized> RemoteJobGateway for &G {
    fn job_details(&self, job_id: &str) -> std::result::Result<RemoteJob, GatewayError> {
        (**self).job_details(job_id)
    }

    fn update_job(
        &self,
        job_id: &str,
        changes: &Changeset,
    ) -> std::result::Result<(), GatewayError> {
        (**self).update_job(job_id, changes)
    }
}

impl<G: RemoteJobGateway + ?Sized> RemoteJobGateway for Box<G> {
    fn job_details(&self, job_id: &str) -> std::result::Result<RemoteJob, GatewayError> {
        (**self).job_details(job_id)
    }

    fn update_job(
        &self,
        job_id: &str,
        changes: &Changeset,
    ) -> std::result::Result<(), GatewayError> {
        (**self).update_job(job_id, changes)
    }
}

/// Gateway that reads through `inner` (when present) but only records
/// updates instead of sending them.
#[derive(Debug)]
pub struct DryRunGateway<G> {
    inner: Option<G>,
    recorded: RefCell<Vec<(String, Changeset)>>,
}

impl<G: RemoteJobGateway> DryRunGateway<G> {
    #[must_use]
    pub fn new(inner: Option<G>) -> Self {
        Self {
            inner,
            recorded: RefCell::new(Vec::new()),
        }
    }

    /// Updates that would have been sent, in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<(String, Changeset)> {
        self.recorded.borrow().clone()
    }
}

impl<G: RemoteJobGateway> RemoteJobGateway for DryRunGateway<G> {
    fn job_details(&self, job_id: &str) -> std::result::Result<RemoteJob, GatewayError> {
        match &self.inner {
            Some(inner) => inner.job_details(job_id),
            None => Err(GatewayError::NotFound(format!(
                "{job_id} (dry run without credentials)"
            ))),
        }
    }

    fn update_job(
        &self,
        job_id: &str,
        changes: &Changeset,
    ) -> std::result::Result<(), GatewayError> {
        info!(
            job_id,
            fields = ?changes.field_names(),
            "Dry run: skipping Sauce REST update"
        );
        self.recorded
            .borrow_mut()
            .push((job_id.to_string(), changes.clone()));
        Ok(())
    }
}

/// The run's raw console output.
///
/// `open` hands out a fresh reader; the engine drops it on every exit path.
pub trait RunLogSource {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>>;
}

impl RunLogSource for str {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        Ok(Box::new(Cursor::new(self.as_bytes())))
    }
}

impl RunLogSource for String {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        self.as_str().open()
    }
}

/// Parsed test-suite results. `None` means the run published no results
/// (for example because it was aborted before tests finished).
pub trait TestSuiteSource {
    fn test_results(&self) -> Option<TestResults>;
}

impl TestSuiteSource for TestResults {
    fn test_results(&self) -> Option<TestResults> {
        Some(self.clone())
    }
}

impl TestSuiteSource for Option<TestResults> {
    fn test_results(&self) -> Option<TestResults> {
        self.clone()
    }
}

/// Host-side view of the run being reconciled.
pub trait RunContext {
    /// Build label written into each job's `build` field.
    fn sanitized_build_identifier(&self) -> String;

    /// Persist the aggregate job list into run-scoped storage.
    fn save_jobs(&mut self, jobs: &JobSet) -> Result<()>;

    /// Write a user-visible progress line to the run's listener.
    fn println(&mut self, message: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl RemoteJobGateway for Fixed {
        fn job_details(&self, job_id: &str) -> std::result::Result<RemoteJob, GatewayError> {
            Ok(RemoteJob {
                id: job_id.to_string(),
                name: Some("remote".into()),
                ..RemoteJob::default()
            })
        }

        fn update_job(
            &self,
            _job_id: &str,
            _changes: &Changeset,
        ) -> std::result::Result<(), GatewayError> {
            panic!("dry run must not forward updates");
        }
    }

    #[test]
    fn remote_job_accepts_null_custom_data() {
        let job: RemoteJob = serde_json::from_str(
            r#"{"id":"abc","name":"Login","build":null,"passed":null,"custom-data":null}"#,
        )
        .unwrap();
        assert!(job.custom_data.is_empty());
        assert_eq!(job.name.as_deref(), Some("Login"));
        assert!(job.passed.is_none());
    }

    #[test]
    fn remote_job_ignores_unknown_fields() {
        let job: RemoteJob = serde_json::from_str(
            r#"{"id":"abc","browser":"chrome","passed":true,"custom-data":{"k":"v"}}"#,
        )
        .unwrap();
        assert_eq!(job.passed, Some(true));
        assert_eq!(job.custom_data.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn dry_run_reads_through_and_records_writes() {
        let gateway = DryRunGateway::new(Some(Fixed));
        assert_eq!(
            gateway.job_details("abc").unwrap().name.as_deref(),
            Some("remote")
        );
        let changes = Changeset {
            passed: Some(true),
            ..Changeset::default()
        };
        gateway.update_job("abc", &changes).unwrap();
        assert_eq!(gateway.recorded(), vec![("abc".to_string(), changes)]);
    }

    #[test]
    fn dry_run_without_inner_reports_not_found() {
        let gateway: DryRunGateway<Fixed> = DryRunGateway::new(None);
        assert!(matches!(
            gateway.job_details("abc"),
            Err(GatewayError::NotFound(_))
        ));
    }

    #[test]
    fn string_log_source_yields_lines() {
        let log = String::from("one\ntwo\n");
        let lines: Vec<_> = log.open().unwrap().lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines, ["one", "two"]);
    }
}
