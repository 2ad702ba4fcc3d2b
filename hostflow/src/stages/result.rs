//! Stage result type.

use super::Stage;
use crate::core::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of one stage (or one build target of the build stage).
///
/// Produced once and never mutated by the sequencer afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage this result belongs to.
    pub stage: Stage,
    /// Stage status.
    pub status: StageStatus,
    /// Build target, for per-target results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Process exit code, when a process ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Error message if failed, reason if skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stage-specific details (verification report, copied files, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub data: HashMap<String, serde_json::Value>,
}

impl StageResult {
    fn new(stage: &Stage, status: StageStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            stage: stage.clone(),
            status,
            target: None,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            ended_at: Utc::now(),
            error: None,
            data: HashMap::new(),
        }
    }

    /// Creates a completed stage result.
    #[must_use]
    pub fn completed(stage: &Stage, started_at: DateTime<Utc>) -> Self {
        Self::new(stage, StageStatus::Ok, started_at)
    }

    /// Creates a failed stage result.
    #[must_use]
    pub fn failed(stage: &Stage, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        let mut result = Self::new(stage, StageStatus::Fail, started_at);
        result.error = Some(error.into());
        result
    }

    /// Creates a result for a stage that was not executed.
    #[must_use]
    pub fn skipped(stage: &Stage, reason: impl Into<String>) -> Self {
        let mut result = Self::new(stage, StageStatus::Skip, Utc::now());
        result.error = Some(reason.into());
        result
    }

    /// Sets the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Sets the captured output.
    #[must_use]
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Sets the build target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Adds a data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.stage.name()
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Returns true if the stage ran and succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage ran and failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Returns true if the stage was executed at all.
    #[must_use]
    pub fn executed(&self) -> bool {
        !matches!(self.status, StageStatus::Skip | StageStatus::Pending)
    }

    /// Last `lines` lines of stdout and stderr, for failure logs.
    #[must_use]
    pub fn output_tail(&self, lines: usize) -> String {
        fn tail(text: &str, lines: usize) -> String {
            let all: Vec<&str> = text.lines().collect();
            all[all.len().saturating_sub(lines)..].join("\n")
        }

        format!(
            "STDOUT:\n{}\nSTDERR:\n{}",
            tail(&self.stdout, lines),
            tail(&self.stderr, lines)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageId;
    use std::path::Path;
    use std::time::Duration;

    fn stage(id: StageId) -> Stage {
        Stage::new(id, Path::new("Logs"), Duration::from_secs(5))
    }

    #[test]
    fn test_stage_result_completed() {
        let result = StageResult::completed(&stage(StageId::Build), Utc::now())
            .with_exit_code(Some(0))
            .with_target("Android");

        assert_eq!(result.name(), "build");
        assert!(result.succeeded());
        assert!(result.executed());
        assert_eq!(result.target.as_deref(), Some("Android"));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_stage_result_failed() {
        let result = StageResult::failed(&stage(StageId::ConfigureAndSetup), Utc::now(), "exit code 1")
            .with_exit_code(Some(1));

        assert!(!result.succeeded());
        assert!(result.is_failure());
        assert_eq!(result.exit_code, Some(1));
    }

    #[test]
    fn test_stage_result_skipped() {
        let result = StageResult::skipped(&stage(StageId::SmokeTest), "run-smoke-tests not set");
        assert!(!result.executed());
        assert!(!result.succeeded());
        assert!(!result.is_failure());
    }

    #[test]
    fn test_stage_result_duration() {
        let started = Utc::now();
        std::thread::sleep(Duration::from_millis(10));
        let result = StageResult::completed(&stage(StageId::Build), started);

        assert!(result.duration_ms() >= 10.0);
    }

    #[test]
    fn test_output_tail() {
        let result = StageResult::failed(&stage(StageId::Build), Utc::now(), "boom")
            .with_output("a\nb\nc\nd", "e");
        let tail = result.output_tail(2);
        assert!(tail.contains("c\nd"));
        assert!(!tail.contains("a\n"));
        assert!(tail.contains("STDERR:\ne"));
    }

    #[test]
    fn test_stage_result_serialization() {
        let result = StageResult::completed(&stage(StageId::Build), Utc::now())
            .with_data("artifact", serde_json::json!("Builds/v0.1.0/Android/Game.apk"));

        let json = serde_json::to_string(&result).unwrap();
        let deserialized: StageResult = serde_json::from_str(&json).unwrap();

        assert_eq!(result.stage, deserialized.stage);
        assert_eq!(result.status, deserialized.status);
        assert_eq!(result.data, deserialized.data);
    }
}
