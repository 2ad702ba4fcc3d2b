//! Which stages run, given the flags and what has happened so far.

use super::PipelineRun;
use crate::config::PipelineFlags;
use crate::core::{StageId, StageStatus};

/// Decision for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// Execute the stage.
    Run,
    /// Record the stage as skipped, with the reason.
    Skip(String),
}

impl Gate {
    fn skip(reason: &str) -> Self {
        Self::Skip(reason.to_string())
    }
}

/// Decides whether `stage` runs.
///
/// Halting on a failed required stage is the sequencer's job; this only
/// covers flags and prerequisites:
///
/// - create, deploy and configure always run;
/// - build runs when `run_build` is set;
/// - increment-version and smoke-test need their flag and a successful build;
/// - distribute needs its flag, a successful build and, when smoke tests
///   were requested, successful smoke tests.
#[must_use]
pub fn gate(stage: StageId, flags: &PipelineFlags, run: &PipelineRun) -> Gate {
    let build_ok = run.status_of(StageId::Build) == StageStatus::Ok;
    match stage {
        StageId::CreateProject | StageId::DeployAutomation | StageId::ConfigureAndSetup => Gate::Run,
        StageId::Build if !flags.run_build => Gate::skip("run-build not set"),
        StageId::Build => Gate::Run,
        StageId::IncrementVersion if !flags.increment_version => Gate::skip("increment-version not set"),
        StageId::SmokeTest if !flags.run_smoke_tests => Gate::skip("run-smoke-tests not set"),
        StageId::Distribute if !flags.distribute_builds => Gate::skip("distribute-builds not set"),
        StageId::IncrementVersion | StageId::SmokeTest | StageId::Distribute if !build_ok => {
            Gate::skip("build did not succeed")
        }
        StageId::Distribute
            if flags.run_smoke_tests && run.status_of(StageId::SmokeTest) != StageStatus::Ok =>
        {
            Gate::skip("smoke tests did not succeed")
        }
        StageId::IncrementVersion | StageId::SmokeTest | StageId::Distribute => Gate::Run,
    }
}
