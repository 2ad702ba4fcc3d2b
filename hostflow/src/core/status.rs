//! Stage status and identifier enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed stages of a release pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    /// Create the host project (skipped when it already exists).
    CreateProject,
    /// Copy the automation entry points into the project.
    DeployAutomation,
    /// Install dependencies, configure the project and set up the scene.
    ConfigureAndSetup,
    /// Build every configured target.
    Build,
    /// Bump the persisted build version.
    IncrementVersion,
    /// Verify the built artifacts.
    SmokeTest,
    /// Copy verified artifacts to the distribution sink.
    Distribute,
}

impl StageId {
    /// All stages in execution order.
    pub const ORDER: [Self; 7] = [
        Self::CreateProject,
        Self::DeployAutomation,
        Self::ConfigureAndSetup,
        Self::Build,
        Self::IncrementVersion,
        Self::SmokeTest,
        Self::Distribute,
    ];

    /// Returns the kebab-case stage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProject => "create-project",
            Self::DeployAutomation => "deploy-automation",
            Self::ConfigureAndSetup => "configure-and-setup",
            Self::Build => "build",
            Self::IncrementVersion => "increment-version",
            Self::SmokeTest => "smoke-test",
            Self::Distribute => "distribute",
        }
    }

    /// Returns the snake_case stem used for per-stage log files.
    #[must_use]
    pub fn log_stem(&self) -> String {
        self.as_str().replace('-', "_")
    }

    /// Whether a failure of this stage halts the pipeline.
    ///
    /// The build stage only runs when requested, but once it runs its
    /// failure is fatal.
    #[must_use]
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            Self::CreateProject | Self::DeployAutomation | Self::ConfigureAndSetup | Self::Build
        )
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is pending execution.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Ok,
    /// Stage was not executed.
    Skip,
    /// Stage failed.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip | Self::Fail)
    }

    /// Returns true if the stage ran and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if the stage ran and failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}
