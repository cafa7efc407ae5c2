//! Run-scoped persistence of reconciled jobs.
//!
//! The job list for a run is stored as one JSON document next to the build
//! artifacts. A later pass over the same run loads it back as the prior job
//! set, which is what makes repeated passes idempotent.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StateError};
use crate::gateway::RunContext;
use crate::job_record::JobSet;

const RUN_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunStateDocument {
    version: u32,
    #[serde(default)]
    jobs: JobSet,
}

/// JSON file holding the job list of one run.
#[derive(Debug, Clone)]
pub struct RunStateFile {
    path: PathBuf,
}

impl RunStateFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored jobs. A missing file is an empty set.
    pub fn load(&self) -> Result<JobSet> {
        if !self.path.exists() {
            return Ok(JobSet::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| StateError::ReadFailed(self.path.display().to_string(), e.to_string()))?;
        let document: RunStateDocument =
            serde_json::from_str(&content).map_err(|e| StateError::Corrupt(e.to_string()))?;
        debug!(
            path = %self.path.display(),
            jobs = document.jobs.len(),
            "Loaded run state"
        );
        Ok(document.jobs)
    }

    /// Write the jobs atomically (temp file, then rename).
    pub fn save(&self, jobs: &JobSet) -> Result<()> {
        let display = self.path.display().to_string();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StateError::WriteFailed(display.clone(), e.to_string()))?;
            }
        }

        let document = RunStateDocument {
            version: RUN_STATE_VERSION,
            jobs: jobs.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| StateError::WriteFailed(tmp_path.display().to_string(), e.to_string()))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StateError::WriteFailed(display, e.to_string()))?;
        Ok(())
    }
}

/// Turn a human build name into the label stored in each job's `build`
/// field: `"checkout-app #42"` becomes `"checkout-app-42"`.
///
/// Characters outside `[A-Za-z0-9._-]` become `-`, runs of `-` collapse,
/// and leading/trailing `-` are dropped.
#[must_use]
pub fn sanitize_build_identifier(display_name: &str) -> String {
    let mut sanitized = String::with_capacity(display_name.len());
    for c in display_name.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '-'
        };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.trim_matches('-').to_string()
}

/// [`RunContext`] backed by a state file and a writer for listener output.
#[derive(Debug)]
pub struct FileRunContext<W> {
    build_identifier: String,
    state: RunStateFile,
    listener: W,
}

impl<W: Write> FileRunContext<W> {
    /// `build_display_name` is sanitized once, up front.
    pub fn new(build_display_name: &str, state: RunStateFile, listener: W) -> Self {
        Self {
            build_identifier: sanitize_build_identifier(build_display_name),
            state,
            listener,
        }
    }

    pub fn into_listener(self) -> W {
        self.listener
    }
}

impl<W: Write> RunContext for FileRunContext<W> {
    fn sanitized_build_identifier(&self) -> String {
        self.build_identifier.clone()
    }

    fn save_jobs(&mut self, jobs: &JobSet) -> Result<()> {
        self.state.save(jobs)
    }

    fn println(&mut self, message: &str) {
        if let Err(err) = writeln!(self.listener, "{message}") {
            debug!(error = %err, "Listener write failed");
        }
    }
}
