//! One reconciliation pass over a finished CI run.
//!
//! The engine reads the run's console output and published test results,
//! finds every Sauce session those reference, and brings each remote job up
//! to date:
//!
//! 1. resolve a [`JobRecord`] per session (prior state first, then a fresh
//!    record populated from the remote service)
//! 2. fill the write-once fields (`name`, `status`, `build`)
//! 3. attach the configured visibility and, for failed jobs, the failing
//!    test's stack trace
//! 4. push the accumulated changeset, then persist the job list
//!
//! Every collaborator failure is downgraded to a warning; a pass always
//! returns an outcome.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, debug_span, info, warn};

use crate::config::ReconcileOptions;
use crate::gateway::{RemoteJobGateway, RunContext, RunLogSource, TestSuiteSource};
use crate::job_record::{FAILURE_MESSAGE_KEY, JobRecord, JobSet, JobStatus, TrackedField};
use crate::name_matcher::NameMatcher;
use crate::session_ids::{self, SessionReference};
use crate::test_results::TestResults;

/// Listener line written when a pass begins.
pub const STARTING_MESSAGE: &str = "Starting Sauce Labs test publisher";

/// Listener line written when a pass ends.
pub const FINISHED_MESSAGE: &str = "Finished Sauce Labs test publisher";

/// Listener line written when the run references no Sauce jobs at all.
pub const NO_SESSIONS_MESSAGE: &str =
    "The Sauce OnDemand plugin is configured, but no session IDs were found in the test output.";

/// Result of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    /// Every known job for the run, prior ones first, in first-seen order.
    pub jobs: JobSet,
    /// Session references found, duplicates included.
    pub references_found: usize,
    /// Jobs first seen in this pass.
    pub jobs_created: usize,
    /// Updates the gateway accepted.
    pub updates_sent: usize,
    /// Updates the gateway rejected.
    pub updates_failed: usize,
    /// Whether the job list reached run storage.
    pub persisted: bool,
    /// Build label of the first resolved job, or the run's own identifier
    /// when no job was resolved.
    pub build_name: String,
}

impl ReconcileOutcome {
    /// `true` when the run has any Sauce jobs attached.
    #[must_use]
    pub fn has_results(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// `true` when at least one remote update went through.
    #[must_use]
    pub fn updates_applied(&self) -> bool {
        self.updates_sent > 0
    }
}

/// Stack traces of failed tests, looked up by job name.
#[derive(Debug, Default)]
struct FailureTraces {
    by_full_name: HashMap<String, String>,
    by_display_name: HashMap<String, String>,
}

impl FailureTraces {
    fn collect(results: &TestResults) -> Self {
        let mut traces = Self::default();
        for case in results.failed_cases() {
            let trace = case
                .error_stack_trace
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_string();
            traces
                .by_display_name
                .insert(case.display_name.clone(), trace.clone());
            traces.by_full_name.insert(case.full_name.clone(), trace);
        }
        traces
    }

    fn lookup(&self, job_name: &str) -> Option<&str> {
        self.by_full_name
            .get(job_name)
            .or_else(|| self.by_display_name.get(job_name))
            .map(String::as_str)
    }

    fn len(&self) -> usize {
        self.by_full_name.len()
    }
}

/// Reconciles one run at a time against a [`RemoteJobGateway`].
#[derive(Debug)]
pub struct ReconciliationEngine<G> {
    gateway: G,
    options: ReconcileOptions,
}

impl<G: RemoteJobGateway> ReconciliationEngine<G> {
    #[must_use]
    pub fn new(gateway: G, options: ReconcileOptions) -> Self {
        Self { gateway, options }
    }

    /// Run a full pass. `prior_jobs` is what earlier passes over this run
    /// persisted; pass an empty set for a first pass.
    pub fn reconcile(
        &self,
        run: &mut dyn RunContext,
        prior_jobs: JobSet,
        log: &dyn RunLogSource,
        suites: &dyn TestSuiteSource,
    ) -> ReconcileOutcome {
        run.println(STARTING_MESSAGE);
        let outcome = self.process(run, prior_jobs, log, suites);
        if !outcome.has_results() {
            run.println(NO_SESSIONS_MESSAGE);
        }
        run.println(FINISHED_MESSAGE);
        outcome
    }

    fn process(
        &self,
        run: &mut dyn RunContext,
        prior_jobs: JobSet,
        log: &dyn RunLogSource,
        suites: &dyn TestSuiteSource,
    ) -> ReconcileOutcome {
        let results = suites.test_results();
        let results = results.as_ref();
        if let Some(results) = results {
            let (passed, failed, skipped) = results.counts();
            debug!(passed, failed, skipped, "Test results available");
        }

        let references = collect_references(log, results);
        let failures = match results {
            Some(results) if self.collects_diagnostics() => FailureTraces::collect(results),
            _ => FailureTraces::default(),
        };
        debug!(
            references = references.len(),
            failed_tests = failures.len(),
            "Collected session references"
        );

        let build_identifier = run.sanitized_build_identifier();
        let matcher = NameMatcher::new(results);
        let mut outcome = ReconcileOutcome {
            jobs: prior_jobs,
            references_found: references.len(),
            ..ReconcileOutcome::default()
        };
        let mut build_name: Option<String> = None;

        for reference in &references {
            let _span = debug_span!("reconcile_job", job_id = %reference.session_id).entered();

            let (record, created) = outcome
                .jobs
                .get_or_insert_with(&reference.session_id, || {
                    self.resolve_new(&reference.session_id)
                });
            if created {
                outcome.jobs_created += 1;
            }

            self.apply_reference(
                record,
                reference,
                &matcher,
                &build_identifier,
                results.is_some(),
                &failures,
            );

            let changes = record.take_changes();
            if !changes.is_empty() {
                debug!(fields = ?changes.field_names(), "Performing Sauce REST update");
                match self.gateway.update_job(record.job_id(), &changes) {
                    Ok(()) => outcome.updates_sent += 1,
                    Err(err) => {
                        warn!(
                            job_id = record.job_id(),
                            error = %err,
                            "Unable to update job information"
                        );
                        outcome.updates_failed += 1;
                    }
                }
            }

            if build_name.is_none() {
                build_name = record.build().map(String::from);
            }
        }

        outcome.build_name = build_name.unwrap_or(build_identifier);

        if outcome.has_results() {
            match run.save_jobs(&outcome.jobs) {
                Ok(()) => outcome.persisted = true,
                Err(err) => warn!(error = %err, "Unable to save run state"),
            }
        }

        info!(
            jobs = outcome.jobs.len(),
            created = outcome.jobs_created,
            updated = outcome.updates_sent,
            failed = outcome.updates_failed,
            "Reconciliation pass complete"
        );
        outcome
    }

    fn collects_diagnostics(&self) -> bool {
        !self.options.disable_usage_stats
    }

    /// Blank record populated from the remote service when it answers.
    fn resolve_new(&self, job_id: &str) -> JobRecord {
        let mut record = JobRecord::new(job_id);
        match self.gateway.job_details(job_id) {
            Ok(remote) => record.populate(&remote),
            Err(err) => warn!(job_id, error = %err, "Unable to get job details"),
        }
        record
    }

    fn apply_reference(
        &self,
        record: &mut JobRecord,
        reference: &SessionReference,
        matcher: &NameMatcher<'_>,
        build_identifier: &str,
        has_results: bool,
        failures: &FailureTraces,
    ) {
        // Name first: inference only considers jobs with a known name.
        if let Some(label) = &reference.job_name {
            record.set_if_unset(TrackedField::Name(label.clone()));
        }

        if let Some(passed) = matcher.infer(record) {
            record.set_if_unset(TrackedField::Status(JobStatus::from_passed(passed)));
        }

        if !build_identifier.is_empty() {
            record.set_if_unset(TrackedField::Build(build_identifier.to_string()));
        }

        if let Some(visibility) = self.options.visibility {
            record.record_visibility(visibility);
        }

        let failed = record.status() == Some(JobStatus::Failed);
        if self.collects_diagnostics() && has_results && failed {
            self.attach_failure_message(record, failures);
        }
    }

    /// Merge the remote custom data with the failing test's stack trace.
    /// Queued only when it adds something the service does not have yet.
    fn attach_failure_message(&self, record: &mut JobRecord, failures: &FailureTraces) {
        let remote = match self.gateway.job_details(record.job_id()) {
            Ok(remote) => remote.custom_data,
            Err(err) => {
                warn!(
                    job_id = record.job_id(),
                    error = %err,
                    "Unable to get job details for custom data"
                );
                BTreeMap::new()
            }
        };

        let mut merged = remote.clone();
        let trace = record
            .name()
            .and_then(|name| failures.lookup(name))
            .filter(|trace| !trace.is_empty());
        if let Some(trace) = trace {
            merged.insert(FAILURE_MESSAGE_KEY.to_string(), trace.to_string());
        }
        if merged != remote {
            record.record_custom_data(merged);
        }
    }
}

/// Session references from the run log, then from every suite and case
/// stream of `results`.
///
/// A log that cannot be opened contributes nothing; a read error part way
/// through keeps the references found before it.
pub fn collect_references(
    log: &dyn RunLogSource,
    results: Option<&TestResults>,
) -> Vec<SessionReference> {
    let mut references = read_log_references(log);

    let Some(results) = results else {
        return references;
    };
    for suite in &results.suites {
        let _span = debug_span!("scan_suite", suite = %suite.name).entered();
        references.extend(session_ids::extract(
            false,
            [suite.stdout.as_deref(), suite.stderr.as_deref()],
        ));
        for case in &suite.cases {
            if case.stdout != suite.stdout {
                references.extend(session_ids::extract(false, [case.stdout.as_deref()]));
            }
            if case.stderr != suite.stderr {
                references.extend(session_ids::extract(false, [case.stderr.as_deref()]));
            }
        }
    }
    references
}

fn read_log_references(log: &dyn RunLogSource) -> Vec<SessionReference> {
    let mut reader = match log.open() {
        Ok(reader) => reader,
        Err(err) => {
            warn!(error = %err, "Unable to open run log");
            return Vec::new();
        }
    };

    let mut references = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                references.extend(session_ids::extract(true, [Some(line.as_ref())]));
            }
            Err(err) => {
                warn!(
                    error = %err,
                    kept = references.len(),
                    "Error reading run log; keeping session ids read so far"
                );
                break;
            }
        }
    }
    references
}
