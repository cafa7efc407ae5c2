//! sauce-reconcile-core: Core library for sauce-reconcile
//!
//! This crate correlates a finished CI run with the Sauce Labs sessions it
//! started, and publishes what the run learned (pass/fail, job name, build
//! label, failure diagnostics) back to the remote jobs.
//!
//! # Architecture
//!
//! ```text
//! Run log ─┐
//!          ├→ Session id extraction → Job resolution → Name matching
//! Results ─┘                                              ↓
//!                              Run state ← Persist ← Changeset → REST gateway
//! ```
//!
//! # Modules
//!
//! - `session_ids`: Session marker extraction from log text
//! - `test_results`: Test suite and case outcome types
//! - `job_record`: Write-once job records, changesets, ordered job sets
//! - `name_matcher`: Job name to test case matching for status inference
//! - `engine`: The reconciliation pass
//! - `gateway`: Collaborator traits (remote jobs, log, results, run context)
//! - `sources`: File-backed log and test-result sources
//! - `state`: File-backed run state and build identifier sanitizing
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod job_record;
pub mod logging;
pub mod name_matcher;
pub mod session_ids;
pub mod sources;
pub mod state;
pub mod test_results;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
