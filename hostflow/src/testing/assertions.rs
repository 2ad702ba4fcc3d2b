//! Assertions over pipeline runs.

use crate::core::{StageId, StageStatus};
use crate::pipeline::PipelineRun;

/// Asserts the aggregate status of a stage.
pub fn assert_stage_status(run: &PipelineRun, stage: StageId, expected: StageStatus) {
    let actual = run.status_of(stage);
    assert_eq!(
        actual,
        expected,
        "Expected {stage} to be {expected}, got {actual}. Results:\n{}",
        run.summary_lines().join("\n")
    );
}

/// Asserts that none of `stages` executed.
pub fn assert_not_executed(run: &PipelineRun, stages: &[StageId]) {
    for stage in stages {
        assert!(
            !run.executed(*stage),
            "Expected {stage} not to execute. Results:\n{}",
            run.summary_lines().join("\n")
        );
    }
}

/// Asserts the run's exit code.
pub fn assert_exit_code(run: &PipelineRun, expected: i32) {
    assert_eq!(
        run.exit_code(),
        expected,
        "Unexpected exit code. Results:\n{}",
        run.summary_lines().join("\n")
    );
}
