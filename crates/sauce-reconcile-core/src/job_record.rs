//! Reconciled local view of remote Sauce Labs jobs.
//!
//! A [`JobRecord`] tracks what is known about one remote job and which
//! fields this pass wants to publish. `status`, `name` and `build` are
//! write-once: [`JobRecord::set_if_unset`] is the only way to assign them,
//! so a value confirmed by the server (or set by an earlier pass) is never
//! replaced by a later inference.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gateway::RemoteJob;

/// Custom-data key carrying the stack trace of the matching failed test.
pub const FAILURE_MESSAGE_KEY: &str = "FAILURE_MESSAGE";

/// Pass/fail verdict published to the remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Passed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn from_passed(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }

    #[must_use]
    pub fn is_passed(self) -> bool {
        self == Self::Passed
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("Passed"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Who may view a job on Sauce Labs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobVisibility {
    #[serde(rename = "public")]
    Public,
    #[serde(rename = "public restricted")]
    PublicRestricted,
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "team")]
    Team,
}

impl JobVisibility {
    pub const ALL: [Self; 4] = [Self::Public, Self::PublicRestricted, Self::Private, Self::Team];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::PublicRestricted => "public restricted",
            Self::Private => "private",
            Self::Team => "team",
        }
    }

    /// Parse a configured value. The empty string means "leave the
    /// service default alone" and maps to `None`.
    pub fn parse_optional(value: &str) -> Result<Option<Self>, ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(trimmed))
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidVisibility(value.to_string()))
    }
}

impl fmt::Display for JobVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobVisibility {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_optional(s)?.ok_or_else(|| ConfigError::InvalidVisibility(s.to_string()))
    }
}

/// Minimal partial update for one remote job.
///
/// Serializes with the field names the Sauce REST API expects; unset
/// fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(rename = "public", default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<JobVisibility>,
    #[serde(rename = "custom-data", default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<BTreeMap<String, String>>,
}

impl Changeset {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passed.is_none()
            && self.name.is_none()
            && self.build.is_none()
            && self.visibility.is_none()
            && self.custom_data.is_none()
    }

    /// Wire names of the fields present, in a stable order.
    #[must_use]
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.passed.is_some() {
            names.push("passed");
        }
        if self.name.is_some() {
            names.push("name");
        }
        if self.build.is_some() {
            names.push("build");
        }
        if self.visibility.is_some() {
            names.push("public");
        }
        if self.custom_data.is_some() {
            names.push("custom-data");
        }
        names
    }
}

/// A write-once field together with the value to assign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedField {
    Status(JobStatus),
    Name(String),
    Build(String),
}

/// Local view of one remote job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    job_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    build: Option<String>,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    visibility: Option<JobVisibility>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    custom_data: BTreeMap<String, String>,
    #[serde(skip)]
    changes: Changeset,
}

impl JobRecord {
    /// Blank record with nothing known beyond the id.
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            name: None,
            build: None,
            status: None,
            visibility: None,
            custom_data: BTreeMap::new(),
            changes: Changeset::default(),
        }
    }

    /// Adopt values already stored on the server. Nothing here is queued
    /// for publishing; these are the values later inference must not touch.
    pub fn populate(&mut self, remote: &RemoteJob) {
        if self.status.is_none() {
            self.status = remote.passed.map(JobStatus::from_passed);
        }
        if self.name.is_none() {
            self.name = remote.name.clone().filter(|n| !n.is_empty());
        }
        if self.build.is_none() {
            self.build = remote.build.clone().filter(|b| !b.is_empty());
        }
        for (key, value) in &remote.custom_data {
            self.custom_data
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> Option<JobStatus> {
        self.status
    }

    #[must_use]
    pub fn visibility(&self) -> Option<JobVisibility> {
        self.visibility
    }

    #[must_use]
    pub fn custom_data(&self) -> &BTreeMap<String, String> {
        &self.custom_data
    }

    #[must_use]
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    #[must_use]
    pub fn has_build(&self) -> bool {
        self.build.is_some()
    }

    /// Assign a write-once field if it has no value yet.
    ///
    /// Returns `true` when the field changed; the change is also queued in
    /// the pending changeset. Returns `false` (and queues nothing) when the
    /// field already holds a value.
    pub fn set_if_unset(&mut self, field: TrackedField) -> bool {
        match field {
            TrackedField::Status(status) => {
                if self.status.is_some() {
                    return false;
                }
                self.status = Some(status);
                self.changes.passed = Some(status.is_passed());
            }
            TrackedField::Name(name) => {
                if self.name.is_some() {
                    return false;
                }
                self.changes.name = Some(name.clone());
                self.name = Some(name);
            }
            TrackedField::Build(build) => {
                if self.build.is_some() {
                    return false;
                }
                self.changes.build = Some(build.clone());
                self.build = Some(build);
            }
        }
        true
    }

    /// Queue a visibility update. Unlike the tracked fields this is sent on
    /// every pass.
    pub fn record_visibility(&mut self, visibility: JobVisibility) {
        self.visibility = Some(visibility);
        self.changes.visibility = Some(visibility);
    }

    /// Replace custom data with `data` and queue it for publishing.
    pub fn record_custom_data(&mut self, data: BTreeMap<String, String>) {
        self.custom_data.clone_from(&data);
        self.changes.custom_data = Some(data);
    }

    /// Changes queued since the last call.
    #[must_use]
    pub fn pending_changes(&self) -> &Changeset {
        &self.changes
    }

    /// Drain the queued changes, leaving an empty changeset behind.
    pub fn take_changes(&mut self) -> Changeset {
        std::mem::take(&mut self.changes)
    }
}

/// Insertion-ordered collection of job records keyed by job id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<JobRecord>", into = "Vec<JobRecord>")]
pub struct JobSet {
    records: Vec<JobRecord>,
    index: HashMap<String, usize>,
}

impl JobSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn contains(&self, job_id: &str) -> bool {
        self.index.contains_key(job_id)
    }

    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<&JobRecord> {
        self.index.get(job_id).map(|&i| &self.records[i])
    }

    /// Insert or replace a record, keeping the original position when the
    /// id is already present.
    pub fn insert(&mut self, record: JobRecord) -> &mut JobRecord {
        let position = match self.index.get(record.job_id()) {
            Some(&i) => {
                self.records[i] = record;
                i
            }
            None => {
                let i = self.records.len();
                self.index.insert(record.job_id().to_string(), i);
                self.records.push(record);
                i
            }
        };
        &mut self.records[position]
    }

    /// Return the record for `job_id`, creating it with `create` on first
    /// sight. The boolean is `true` when the record was created.
    pub fn get_or_insert_with<F>(&mut self, job_id: &str, create: F) -> (&mut JobRecord, bool)
    where
        F: FnOnce() -> JobRecord,
    {
        if let Some(&i) = self.index.get(job_id) {
            return (&mut self.records[i], false);
        }
        (self.insert(create()), true)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.records.iter()
    }
}

impl From<Vec<JobRecord>> for JobSet {
    fn from(records: Vec<JobRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }
}

impl From<JobSet> for Vec<JobRecord> {
    fn from(set: JobSet) -> Self {
        set.records
    }
}

impl FromIterator<JobRecord> for JobSet {
    fn from_iter<T: IntoIterator<Item = JobRecord>>(iter: T) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}
