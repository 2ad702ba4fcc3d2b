//! Error types for the hostflow controller.
//!
//! Stage-level failures never escape the sequencer as errors: they are folded
//! into a failed [`StageResult`](crate::stages::StageResult) and logged. The
//! types here are used by the helpers the stages are built from.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for hostflow operations.
#[derive(Debug, Error)]
pub enum HostflowError {
    /// The host executable could not be launched.
    #[error("Failed to launch '{executable}': {source}")]
    Launch {
        /// The executable that was launched.
        executable: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A host invocation did not exit within its timeout.
    #[error("Stage '{stage}' timed out after {}s", timeout.as_secs_f64())]
    Timeout {
        /// The stage name.
        stage: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The host exited with a non-zero status.
    #[error("Stage '{stage}' failed with exit code {}", exit_code.map_or_else(|| "<signal>".to_string(), |c| c.to_string()))]
    HostFailed {
        /// The stage name.
        stage: String,
        /// The exit code, if the process exited normally.
        exit_code: Option<i32>,
    },

    /// Persisted version content is not `major.minor.patch`.
    #[error("Malformed build version '{content}': {reason}")]
    MalformedVersion {
        /// The offending content.
        content: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A build artifact expected on disk is missing.
    #[error("Missing artifact: {}", path.display())]
    MissingArtifact {
        /// The path that was checked.
        path: PathBuf,
    },

    /// Distribution of artifacts failed.
    #[error("Distribution error: {0}")]
    Distribution(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostflowError {
    /// Creates a malformed version error.
    #[must_use]
    pub fn malformed_version(content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedVersion {
            content: content.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing artifact error.
    #[must_use]
    pub fn missing_artifact(path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact { path: path.into() }
    }

    /// Returns a short machine-readable kind, used in run reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launch { .. } => "launch",
            Self::Timeout { .. } => "timeout",
            Self::HostFailed { .. } => "host_failed",
            Self::MalformedVersion { .. } => "malformed_version",
            Self::MissingArtifact { .. } => "missing_artifact",
            Self::Distribution(_) => "distribution",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = HostflowError> = std::result::Result<T, E>;
