//! Error types for sauce-reconcile-core

use std::fmt::Write;
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sauce-reconcile-core
#[derive(Error, Debug)]
pub enum Error {
    /// Remote job service errors
    #[error("Sauce REST error: {0}")]
    Gateway(#[from] GatewayError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Run state persistence errors
    #[error("Run state error: {0}")]
    State(#[from] StateError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Gateway(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::State(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the log and results files exist and are readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .command("Validate JSON", "python -m json.tool < results.json")
                    .alternative("Check for trailing commas or invalid UTF-8."),
            ),
        }
    }
}

/// Errors raised by a [`crate::gateway::RemoteJobGateway`] implementation.
///
/// The reconciliation engine never propagates these; each one is logged and
/// the pass continues.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Credentials were rejected
    #[error("Sauce Labs rejected the credentials (HTTP {0})")]
    Unauthorized(u16),

    /// Job id unknown to the service
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Connection or protocol failure
    #[error("Request failed: {0}")]
    Transport(String),

    /// Response body did not decode
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// I/O failure inside the gateway
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Unauthorized(_) => {
                Remediation::new("Check the Sauce Labs username and access key.")
                    .command("Show username", "echo $SAUCE_USERNAME")
                    .alternative("Regenerate the access key in the Sauce Labs user settings.")
            }
            Self::NotFound(_) => Remediation::new(
                "The session id was not found. Verify the job ran under the configured account.",
            )
            .alternative("Jobs started by another user are only visible to team members."),
            Self::Transport(_) | Self::Io(_) => Remediation::new(
                "Could not reach Sauce Labs. Check network access and the REST endpoint.",
            )
            .command("Show endpoint", "echo $SAUCE_REST_ENDPOINT")
            .alternative("Use --dry-run to reconcile without contacting the service."),
            Self::Decode(_) => Remediation::new(
                "Sauce Labs returned an unexpected payload; verify the REST endpoint.",
            )
            .alternative("Point SAUCE_REST_ENDPOINT at the data center that ran the jobs."),
        }
    }
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Invalid job visibility: {0}")]
    InvalidVisibility(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => {
                Remediation::new(format!("Create the config file or pass a valid path: {path}"))
                    .alternative("Omit --config to use built-in defaults.")
            }
            Self::ReadFailed(path, _) => {
                Remediation::new(format!("Check permissions for the config file: {path}"))
                    .command("Inspect", format!("ls -la \"{path}\""))
            }
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax in the config file.")
                .alternative(
                    "Compare against the documented keys: visibility, disable_usage_stats, \
                     [rest], [logging].",
                ),
            Self::InvalidVisibility(_) => Remediation::new(
                "Use one of: public, public restricted, private, team (or leave empty).",
            ),
        }
    }
}

/// Run state persistence errors
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read run state {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to write run state {0}: {1}")]
    WriteFailed(String, String),

    #[error("Run state is corrupt: {0}")]
    Corrupt(String),
}

impl StateError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::ReadFailed(path, _) | Self::WriteFailed(path, _) => {
                Remediation::new(format!("Check that the state file is accessible: {path}"))
                    .alternative("Ensure the build workspace directory is writable.")
            }
            Self::Corrupt(_) => Remediation::new(
                "Delete the run state file; the next pass rebuilds it from Sauce Labs.",
            ),
        }
    }
}
