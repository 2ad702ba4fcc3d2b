//! Host invocation.
//!
//! Every host-backed stage is exactly one batch-mode launch of the host
//! executable. [`HostInvocation`] describes the launch; a [`HostInvoker`]
//! performs it and folds every outcome (exit code, timeout, launch error)
//! into a [`StageResult`].

mod process;

pub use process::ProcessHostInvoker;

use crate::errors::{HostflowError, Result};
use crate::stages::{Stage, StageResult};
use async_trait::async_trait;
use std::path::PathBuf;

/// Entry point methods on the automation class.
pub mod entry_points {
    /// Installs dependencies, applies configuration and builds the scene.
    pub const SETUP_PROJECT: &str = "SetupProject";
    /// Builds one target.
    pub const PERFORM_BUILD: &str = "PerformBuild";
    /// Writes the bumped version into the project.
    pub const APPLY_BUILD_VERSION: &str = "ApplyBuildVersion";
}

/// How the host is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Create a new project at the project path.
    CreateProject {
        /// Host version to create the project with.
        host_version: String,
    },
    /// Open the project and execute one entry point.
    ExecuteMethod {
        /// Fully qualified entry point, e.g. `BuildAutomation.SetupProject`.
        entry_point: String,
    },
}

/// A single batch-mode host launch.
#[derive(Debug, Clone)]
pub struct HostInvocation {
    /// Stage this launch belongs to (timeout and log file come from here).
    pub stage: Stage,
    /// Project directory.
    pub project_path: PathBuf,
    /// Launch mode.
    pub mode: LaunchMode,
    /// Stage-specific arguments appended after the fixed flags.
    pub extra_args: Vec<String>,
    /// Build target, for per-target build launches.
    pub target: Option<String>,
}

impl HostInvocation {
    /// Describes a project creation launch.
    #[must_use]
    pub fn create_project(stage: &Stage, project_path: impl Into<PathBuf>, host_version: impl Into<String>) -> Self {
        Self {
            stage: stage.clone(),
            project_path: project_path.into(),
            mode: LaunchMode::CreateProject {
                host_version: host_version.into(),
            },
            extra_args: Vec::new(),
            target: None,
        }
    }

    /// Describes a launch executing the stage's entry point.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the stage has no entry point.
    pub fn execute_method(stage: &Stage, project_path: impl Into<PathBuf>) -> Result<Self> {
        let entry_point = stage.entry_point.clone().ok_or_else(|| {
            HostflowError::Config(format!("stage '{}' has no host entry point", stage.name()))
        })?;
        Ok(Self {
            stage: stage.clone(),
            project_path: project_path.into(),
            mode: LaunchMode::ExecuteMethod { entry_point },
            extra_args: Vec::new(),
            target: None,
        })
    }

    /// Appends extra arguments.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the build target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Entry point executed by this launch, if any.
    #[must_use]
    pub fn entry_point(&self) -> Option<&str> {
        match &self.mode {
            LaunchMode::ExecuteMethod { entry_point } => Some(entry_point),
            LaunchMode::CreateProject { .. } => None,
        }
    }

    /// Host log for this launch. Per-target launches get their own file.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        match &self.target {
            Some(target) => self.stage.target_log_file(target),
            None => self.stage.log_file.clone(),
        }
    }

    /// Controller-side capture of this launch's stdout/stderr.
    #[must_use]
    pub fn capture_log(&self) -> PathBuf {
        match &self.target {
            Some(target) => self.stage.target_capture_log(target),
            None => self.stage.capture_log(),
        }
    }

    /// Full argument vector passed to the host executable.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let project = self.project_path.display().to_string();
        let log_file = self.log_file().display().to_string();

        let mut args: Vec<String> = match &self.mode {
            LaunchMode::CreateProject { host_version } => vec![
                "-quit".into(),
                "-batchmode".into(),
                "-createProject".into(),
                project,
                "-logFile".into(),
                log_file,
                "-version".into(),
                host_version.clone(),
            ],
            LaunchMode::ExecuteMethod { entry_point } => vec![
                "-batchmode".into(),
                "-quit".into(),
                "-projectPath".into(),
                project,
                "-executeMethod".into(),
                entry_point.clone(),
                "-logFile".into(),
                log_file,
            ],
        };
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Value following `flag` in the extra arguments.
    #[must_use]
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        flag_value(&self.extra_args, flag)
    }
}

/// Returns the argument following the first occurrence of `flag`.
#[must_use]
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Runs host invocations.
///
/// Implementations never return errors: launch failures, timeouts and
/// non-zero exits all come back as a failed [`StageResult`] that keeps the
/// exit code or OS error for diagnostics.
#[async_trait]
pub trait HostInvoker: Send + Sync {
    /// Runs one invocation to completion or timeout.
    async fn invoke(&self, invocation: &HostInvocation) -> StageResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageId;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;

    fn stage(id: StageId) -> Stage {
        Stage::new(id, Path::new("/p/Game/Logs"), Duration::from_secs(1))
    }

    #[test]
    fn test_create_project_args() {
        let inv = HostInvocation::create_project(&stage(StageId::CreateProject), "/p/Game", "2023.2.14f1");
        assert_eq!(
            inv.args(),
            vec![
                "-quit",
                "-batchmode",
                "-createProject",
                "/p/Game",
                "-logFile",
                "/p/Game/Logs/host_create_project.log",
                "-version",
                "2023.2.14f1",
            ]
        );
        assert!(inv.entry_point().is_none());
    }

    #[test]
    fn test_execute_method_args() {
        let stage = stage(StageId::Build).with_entry_point("BuildAutomation.PerformBuild");
        let inv = HostInvocation::execute_method(&stage, "/p/Game")
            .unwrap()
            .with_args(["-buildTarget", "Android"])
            .with_target("Android");

        let args = inv.args();
        assert_eq!(&args[..2], &["-batchmode", "-quit"]);
        let exec = args.iter().position(|a| a == "-executeMethod").unwrap();
        assert_eq!(args[exec + 1], "BuildAutomation.PerformBuild");
        assert_eq!(args.iter().filter(|a| *a == "-executeMethod").count(), 1);
        assert_eq!(&args[args.len() - 2..], &["-buildTarget", "Android"]);
        assert_eq!(inv.entry_point(), Some("BuildAutomation.PerformBuild"));
        assert_eq!(inv.arg_value("-buildTarget"), Some("Android"));
        assert_eq!(inv.arg_value("-buildOutput"), None);
        assert_eq!(flag_value(&args, "-logFile"), Some("/p/Game/Logs/host_build_Android.log"));
        assert_eq!(inv.capture_log(), PathBuf::from("/p/Game/Logs/cmd_build_Android.log"));
    }

    #[test]
    fn test_flag_value_at_end() {
        let args = vec!["-a".to_string(), "1".to_string(), "-b".to_string()];
        assert_eq!(flag_value(&args, "-a"), Some("1"));
        assert_eq!(flag_value(&args, "-b"), None);
    }

    #[test]
    fn test_execute_method_requires_entry_point() {
        let result = HostInvocation::execute_method(&stage(StageId::SmokeTest), "/p/Game");
        assert!(matches!(result, Err(HostflowError::Config(_))));
    }
}
