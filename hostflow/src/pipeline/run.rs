//! The record of one controller run.

use crate::artifacts::{DistributionReport, VerificationReport};
use crate::config::PipelineFlags;
use crate::core::{StageId, StageStatus};
use crate::errors::Result;
use crate::stages::StageResult;
use crate::version::BuildVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Everything a run did, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run id.
    pub run_id: Uuid,
    /// Project name.
    pub project: String,
    /// Flags the run was started with.
    pub flags: PipelineFlags,
    /// Version the build stage built.
    pub built_version: BuildVersion,
    /// Persisted version after the run.
    pub final_version: BuildVersion,
    /// Stage results. Per-target stages contribute one entry per target.
    pub results: Vec<StageResult>,
    /// Required stage whose failure halted the run.
    pub halted_at: Option<StageId>,
    /// Smoke-test findings, if smoke tests ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    /// Distribution outcome, if distribution ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<DistributionReport>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Starts a run record.
    #[must_use]
    pub fn new(project: impl Into<String>, flags: PipelineFlags, version: BuildVersion) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            project: project.into(),
            flags,
            built_version: version,
            final_version: version,
            results: Vec::new(),
            halted_at: None,
            verification: None,
            distribution: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Appends a result.
    pub fn record(&mut self, result: StageResult) {
        self.results.push(result);
    }

    /// Marks the run finished.
    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Results recorded for `stage`.
    #[must_use]
    pub fn results_for(&self, stage: StageId) -> Vec<&StageResult> {
        self.results.iter().filter(|r| r.stage.id == stage).collect()
    }

    /// Aggregate status of `stage`.
    ///
    /// `Fail` if any of its results failed, `Ok` if all succeeded, `Skip` if
    /// it was skipped and `Pending` if nothing was recorded.
    #[must_use]
    pub fn status_of(&self, stage: StageId) -> StageStatus {
        let results = self.results_for(stage);
        if results.is_empty() {
            StageStatus::Pending
        } else if results.iter().any(|r| r.is_failure()) {
            StageStatus::Fail
        } else if results.iter().all(|r| r.succeeded()) {
            StageStatus::Ok
        } else {
            StageStatus::Skip
        }
    }

    /// Returns true if `stage` was executed.
    #[must_use]
    pub fn executed(&self, stage: StageId) -> bool {
        self.results_for(stage).iter().any(|r| r.executed())
    }

    /// Returns true if no executed stage failed.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.results.iter().any(StageResult::is_failure)
    }

    /// Process exit code: 1 if any executed stage failed, else 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.succeeded())
    }

    /// Total run time in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64
    }

    /// One human-readable line per result.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        self.results
            .iter()
            .map(|r| {
                let name = match &r.target {
                    Some(target) => format!("{} [{target}]", r.name()),
                    None => r.name().to_string(),
                };
                let detail = match (&r.status, &r.error) {
                    (StageStatus::Ok, _) => format!("{:.0} ms", r.duration_ms()),
                    (_, Some(reason)) => reason.clone(),
                    (_, None) => String::new(),
                };
                format!("{name:<28} {:<5} {detail}", r.status.to_string())
            })
            .collect()
    }

    /// Serializes the run as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the JSON report to `path`, creating parent directories.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
