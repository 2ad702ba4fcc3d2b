//! Stage definitions.
//!
//! A [`Stage`] is one discrete step of the release pipeline. Stages are
//! built once per run from the configuration and never mutated afterwards.

mod result;

pub use result::StageResult;

use crate::core::StageId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A single pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Which stage this is.
    pub id: StageId,
    /// Host entry point executed by this stage, if it invokes the host.
    pub entry_point: Option<String>,
    /// Whether a failure halts the pipeline.
    pub required: bool,
    /// Upper bound on a single host invocation.
    pub timeout: Duration,
    /// The host's own log file for this stage.
    pub log_file: PathBuf,
}

impl Stage {
    /// Creates a stage with logs under `log_dir`.
    ///
    /// The log file is named after the stage so that no two stages share one.
    #[must_use]
    pub fn new(id: StageId, log_dir: &Path, timeout: Duration) -> Self {
        Self {
            id,
            entry_point: None,
            required: id.is_halting(),
            timeout,
            log_file: log_dir.join(format!("host_{}.log", id.log_stem())),
        }
    }

    /// Sets the host entry point.
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    /// Overrides whether the stage is required.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    /// Path of the controller-side capture of stdout/stderr, next to the host log.
    #[must_use]
    pub fn capture_log(&self) -> PathBuf {
        self.sibling_log("cmd", None)
    }

    /// Host log for one build target: `host_<stage>_<target>.log`.
    #[must_use]
    pub fn target_log_file(&self, target: &str) -> PathBuf {
        self.sibling_log("host", Some(target))
    }

    /// Capture log for one build target: `cmd_<stage>_<target>.log`.
    #[must_use]
    pub fn target_capture_log(&self, target: &str) -> PathBuf {
        self.sibling_log("cmd", Some(target))
    }

    fn sibling_log(&self, prefix: &str, target: Option<&str>) -> PathBuf {
        let file = match target {
            Some(target) => format!("{prefix}_{}_{}.log", self.id.log_stem(), sanitize(target)),
            None => format!("{prefix}_{}.log", self.id.log_stem()),
        };
        match self.log_file.parent() {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }
}

fn sanitize(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_logs_are_unique_per_stage() {
        let dir = Path::new("/proj/Logs");
        let mut seen = std::collections::HashSet::new();
        for id in StageId::ORDER {
            let stage = Stage::new(id, dir, Duration::from_secs(1));
            assert!(seen.insert(stage.log_file.clone()));
            assert!(seen.insert(stage.capture_log()));
        }
    }

    #[test]
    fn test_stage_defaults() {
        let stage = Stage::new(StageId::Build, Path::new("Logs"), Duration::from_secs(600))
            .with_entry_point("BuildAutomation.PerformBuild");

        assert_eq!(stage.name(), "build");
        assert!(stage.required);
        assert_eq!(stage.log_file, PathBuf::from("Logs/host_build.log"));
        assert_eq!(stage.capture_log(), PathBuf::from("Logs/cmd_build.log"));
        assert_eq!(stage.entry_point.as_deref(), Some("BuildAutomation.PerformBuild"));
    }

    #[test]
    fn test_target_logs_are_unique_per_target() {
        let stage = Stage::new(StageId::Build, Path::new("Logs"), Duration::from_secs(600));

        assert_eq!(stage.target_log_file("Android"), PathBuf::from("Logs/host_build_Android.log"));
        assert_eq!(
            stage.target_capture_log("StandaloneWindows64"),
            PathBuf::from("Logs/cmd_build_StandaloneWindows64.log")
        );
        assert_ne!(stage.target_log_file("Android"), stage.log_file);
        assert_eq!(stage.target_log_file("iOS/arm64"), PathBuf::from("Logs/host_build_iOS_arm64.log"));
    }

    #[test]
    fn test_optional_stage() {
        let stage = Stage::new(StageId::SmokeTest, Path::new("Logs"), Duration::from_secs(10));
        assert!(!stage.required);
        assert!(stage.entry_point.is_none());
    }
}
