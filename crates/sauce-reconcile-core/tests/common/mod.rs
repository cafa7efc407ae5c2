//! Shared test infrastructure for sauce-reconcile-core integration tests.
//!
//! Import from integration test files with:
//! ```ignore
//! mod common;
//! use common::{FakeGateway, RecordingRun};
//! ```

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use sauce_reconcile_core::error::{GatewayError, StateError};
use sauce_reconcile_core::gateway::{RemoteJob, RemoteJobGateway, RunContext};
use sauce_reconcile_core::job_record::{Changeset, JobSet};
use sauce_reconcile_core::test_results::{SuiteResult, TestCaseOutcome, TestResults};

// ---------------------------------------------------------------------------
// FakeGateway: in-memory remote job service
// ---------------------------------------------------------------------------

/// Remote job service kept in memory. Updates are applied to the stored
/// jobs so a second pass sees what the first one wrote.
#[derive(Default)]
pub struct FakeGateway {
    jobs: RefCell<HashMap<String, RemoteJob>>,
    unreachable: RefCell<HashSet<String>>,
    reject_updates: Cell<bool>,
    updates: RefCell<Vec<(String, Changeset)>>,
    lookups: Cell<usize>,
}

impl FakeGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a remote job.
    pub fn with_job(self, job: RemoteJob) -> Self {
        self.jobs.borrow_mut().insert(job.id.clone(), job);
        self
    }

    /// Make lookups of `job_id` fail with a transport error.
    pub fn unreachable(self, job_id: &str) -> Self {
        self.unreachable.borrow_mut().insert(job_id.to_string());
        self
    }

    /// Make every update fail.
    pub fn rejecting_updates(self) -> Self {
        self.reject_updates.set(true);
        self
    }

    /// Every update received, in order.
    pub fn updates(&self) -> Vec<(String, Changeset)> {
        self.updates.borrow().clone()
    }

    /// Drop recorded updates (remote state is kept).
    pub fn clear_updates(&self) {
        self.updates.borrow_mut().clear();
    }

    pub fn lookups(&self) -> usize {
        self.lookups.get()
    }

    pub fn remote(&self, job_id: &str) -> Option<RemoteJob> {
        self.jobs.borrow().get(job_id).cloned()
    }
}

impl RemoteJobGateway for FakeGateway {
    fn job_details(&self, job_id: &str) -> Result<RemoteJob, GatewayError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.unreachable.borrow().contains(job_id) {
            return Err(GatewayError::Transport("connection reset".into()));
        }
        self.jobs
            .borrow()
            .get(job_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(job_id.to_string()))
    }

    fn update_job(&self, job_id: &str, changes: &Changeset) -> Result<(), GatewayError> {
        self.updates
            .borrow_mut()
            .push((job_id.to_string(), changes.clone()));
        if self.reject_updates.get() {
            return Err(GatewayError::Unauthorized(401));
        }

        let mut jobs = self.jobs.borrow_mut();
        let job = jobs.entry(job_id.to_string()).or_insert_with(|| RemoteJob {
            id: job_id.to_string(),
            ..RemoteJob::default()
        });
        if let Some(passed) = changes.passed {
            job.passed = Some(passed);
        }
        if let Some(name) = &changes.name {
            job.name = Some(name.clone());
        }
        if let Some(build) = &changes.build {
            job.build = Some(build.clone());
        }
        if let Some(data) = &changes.custom_data {
            job.custom_data.clone_from(data);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingRun: run context that keeps everything in memory
// ---------------------------------------------------------------------------

pub struct RecordingRun {
    pub build_identifier: String,
    pub lines: Vec<String>,
    pub saved: Option<JobSet>,
    pub fail_save: bool,
}

impl RecordingRun {
    #[must_use]
    pub fn new(build_identifier: &str) -> Self {
        Self {
            build_identifier: build_identifier.to_string(),
            lines: Vec::new(),
            saved: None,
            fail_save: false,
        }
    }
}

impl RunContext for RecordingRun {
    fn sanitized_build_identifier(&self) -> String {
        self.build_identifier.clone()
    }

    fn save_jobs(&mut self, jobs: &JobSet) -> sauce_reconcile_core::Result<()> {
        if self.fail_save {
            return Err(StateError::WriteFailed("memory".into(), "disk full".into()).into());
        }
        self.saved = Some(jobs.clone());
        Ok(())
    }

    fn println(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Single-suite results.
pub fn suite(cases: Vec<TestCaseOutcome>) -> TestResults {
    TestResults::new(vec![SuiteResult {
        name: "suite".to_string(),
        cases,
        ..SuiteResult::default()
    }])
}

pub fn remote(job_id: &str) -> RemoteJob {
    RemoteJob {
        id: job_id.to_string(),
        ..RemoteJob::default()
    }
}

pub fn custom_data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
