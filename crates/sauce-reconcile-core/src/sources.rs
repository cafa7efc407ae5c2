//! File-backed run inputs: the console log and a JSON test report.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::gateway::{RunLogSource, TestSuiteSource};
use crate::test_results::TestResults;

/// Console log stored as a plain text file.
#[derive(Debug, Clone)]
pub struct FileLogSource {
    path: PathBuf,
}

impl FileLogSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunLogSource for FileLogSource {
    fn open(&self) -> io::Result<Box<dyn BufRead + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Test suites loaded from a JSON document of the form
/// `{"suites": [{"name": .., "stdout": .., "cases": [..]}]}`.
#[derive(Debug, Clone, Default)]
pub struct JsonTestResults {
    results: Option<TestResults>,
}

impl JsonTestResults {
    /// A run that published no test results.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// Parse a report from JSON text. Missing display names are derived
    /// from the full names.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut results: TestResults = serde_json::from_str(text)?;
        results.normalize();
        Ok(Self {
            results: Some(results),
        })
    }

    /// Read and parse the report at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let loaded = Self::from_json(&text)?;
        if let Some(results) = &loaded.results {
            debug!(
                path = %path.display(),
                suites = results.suites.len(),
                "Loaded test results"
            );
        }
        Ok(loaded)
    }
}

impl TestSuiteSource for JsonTestResults {
    fn test_results(&self) -> Option<TestResults> {
        self.results.clone()
    }
}
