//! End-to-end pipeline scenarios against a scripted host.

use hostflow::artifacts::ArtifactVerifier;
use hostflow::config::{BuildTarget, DistributionConfig, PipelineConfig, PipelineFlags};
use hostflow::core::{StageId, StageStatus};
use hostflow::events::CollectingEventSink;
use hostflow::pipeline::{PipelineRun, StageSequencer};
use hostflow::testing::{
    assert_exit_code, assert_not_executed, assert_stage_status, ScriptedHostInvoker, ScriptedOutcome,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(root: &Path, flags: PipelineFlags) -> PipelineConfig {
    let source = root.join("BuildAutomation.cs");
    std::fs::write(&source, "public static class BuildAutomation {}").unwrap();
    PipelineConfig::new()
        .with_project_root(root)
        .with_project_name("RubeGoldbergVR")
        .with_automation_source(source)
        .with_version_file(root.join("build_version.txt"))
        .with_settle_delay(Duration::ZERO)
        .with_targets(vec![BuildTarget::standalone_windows(), BuildTarget::android()])
        .with_distribution(DistributionConfig::from_lookup(|_| None))
        .with_flags(flags)
}

async fn run(config: PipelineConfig, invoker: Arc<ScriptedHostInvoker>) -> PipelineRun {
    StageSequencer::new(config, invoker)
        .with_verifier(ArtifactVerifier::new(Duration::from_millis(100)).with_launch_probe(false))
        .run()
        .await
}

fn all_flags() -> PipelineFlags {
    PipelineFlags {
        run_build: true,
        increment_version: true,
        run_smoke_tests: true,
        distribute_builds: true,
    }
}

#[tokio::test]
async fn test_no_build_means_no_later_stages() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: false,
        ..all_flags()
    };
    let invoker = Arc::new(ScriptedHostInvoker::simulating_host());

    let run = run(config(dir.path(), flags), invoker.clone()).await;

    assert_exit_code(&run, 0);
    assert_not_executed(
        &run,
        &[StageId::Build, StageId::IncrementVersion, StageId::SmokeTest, StageId::Distribute],
    );
    assert_eq!(invoker.call_count(StageId::Build), 0);
    assert!(!dir.path().join("build_version.txt").exists());
}

#[tokio::test]
async fn test_build_failure_halts_with_exit_one() {
    let dir = TempDir::new().unwrap();
    let invoker = Arc::new(
        ScriptedHostInvoker::simulating_host().with_target_outcome(
            StageId::Build,
            "Android",
            ScriptedOutcome::Fail {
                exit_code: 2,
                stderr: "Gradle build failed".to_string(),
            },
        ),
    );
    let sink = Arc::new(CollectingEventSink::new());

    let run = StageSequencer::new(config(dir.path(), all_flags()), invoker.clone())
        .with_event_sink(sink.clone())
        .run()
        .await;

    assert_exit_code(&run, 1);
    assert_stage_status(&run, StageId::Build, StageStatus::Fail);
    assert_not_executed(&run, &[StageId::IncrementVersion, StageId::SmokeTest, StageId::Distribute]);
    assert_eq!(run.halted_at, Some(StageId::Build));
    assert_eq!(invoker.call_count(StageId::Build), 2);
    assert_eq!(invoker.call_count(StageId::IncrementVersion), 0);
    assert_eq!(sink.events_of_type("pipeline.failed").len(), 1);
    assert_eq!(sink.events_of_type("stage.failed").len(), 1);
}

#[tokio::test]
async fn test_required_stage_timeout_halts() {
    let dir = TempDir::new().unwrap();
    let invoker = Arc::new(
        ScriptedHostInvoker::simulating_host().with_outcome(StageId::ConfigureAndSetup, ScriptedOutcome::TimeOut),
    );

    let run = run(config(dir.path(), all_flags()), invoker.clone()).await;

    assert_exit_code(&run, 1);
    assert_eq!(run.halted_at, Some(StageId::ConfigureAndSetup));
    assert_eq!(invoker.call_count(StageId::Build), 0);
}

#[tokio::test]
async fn test_missing_artifact_fails_smoke_test() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: true,
        run_smoke_tests: true,
        distribute_builds: true,
        ..Default::default()
    };
    // The host reports success but leaves no artifacts behind.
    let invoker = Arc::new(ScriptedHostInvoker::simulating_host().with_effect(StageId::Build, |_| {}));

    let run = run(config(dir.path(), flags), invoker).await;

    assert_exit_code(&run, 1);
    assert_stage_status(&run, StageId::Build, StageStatus::Ok);
    assert_stage_status(&run, StageId::SmokeTest, StageStatus::Fail);
    assert_stage_status(&run, StageId::Distribute, StageStatus::Skip);
    let verification = run.verification.as_ref().unwrap();
    assert_eq!(verification.failed_targets(), vec!["StandaloneWindows64", "Android"]);
}

#[tokio::test]
async fn test_one_missing_artifact_is_independent_of_other_target() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: true,
        run_smoke_tests: true,
        ..Default::default()
    };
    let cfg = config(dir.path(), flags);
    let apk = cfg
        .build_dir(&hostflow::version::BuildVersion::DEFAULT)
        .join("Android")
        .join("RubeGoldbergVR.apk");
    let simulate = ScriptedHostInvoker::simulating_host();
    let invoker = Arc::new(simulate);

    // Build everything, then remove one artifact before verifying again.
    let first = run(cfg.clone(), invoker.clone()).await;
    assert_exit_code(&first, 0);
    std::fs::remove_file(&apk).unwrap();

    let report = ArtifactVerifier::new(Duration::from_millis(100))
        .with_launch_probe(false)
        .verify(
            &cfg.build_dir(&hostflow::version::BuildVersion::DEFAULT),
            &cfg.project_name,
            &cfg.targets,
        )
        .await;
    assert!(!report.succeeded());
    assert_eq!(report.failed_targets(), vec!["Android"]);
    assert!(report.checks[0].passed());
}

#[tokio::test]
async fn test_unset_distribution_mode_is_a_successful_no_op() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: true,
        distribute_builds: true,
        ..Default::default()
    };

    let run = run(config(dir.path(), flags), Arc::new(ScriptedHostInvoker::simulating_host())).await;

    assert_exit_code(&run, 0);
    assert_stage_status(&run, StageId::Distribute, StageStatus::Ok);
    let distribution = run.distribution.as_ref().unwrap();
    assert!(distribution.copied.is_empty());
    assert!(distribution.destination.is_none());
}

#[tokio::test]
async fn test_end_to_end_new_project_two_targets() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: true,
        increment_version: true,
        run_smoke_tests: true,
        distribute_builds: false,
    };
    let cfg = config(dir.path(), flags);
    assert!(!cfg.project_path().exists());
    let invoker = Arc::new(ScriptedHostInvoker::simulating_host());

    let run = run(cfg.clone(), invoker.clone()).await;

    assert_exit_code(&run, 0);
    assert_eq!(
        invoker.invoked_stages(),
        vec![
            StageId::CreateProject,
            StageId::ConfigureAndSetup,
            StageId::Build,
            StageId::Build,
            StageId::IncrementVersion,
        ]
    );
    assert_stage_status(&run, StageId::SmokeTest, StageStatus::Ok);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("build_version.txt")).unwrap(),
        "0.1.1"
    );
    assert_eq!(
        std::fs::read_to_string(cfg.project_version_path()).unwrap(),
        "0.1.1"
    );
    assert_eq!(run.built_version.to_string(), "0.1.0");
    assert_eq!(run.final_version.to_string(), "0.1.1");

    let builds: Vec<_> = invoker
        .invocations()
        .into_iter()
        .filter(|i| i.stage.id == StageId::Build)
        .collect();
    assert_eq!(builds[0].arg_value("-buildTarget"), Some("StandaloneWindows64"));
    assert_eq!(builds[1].arg_value("-buildTarget"), Some("Android"));
    assert!(builds[1].arg_value("-buildOutput").unwrap().ends_with("v0.1.0/Android"));
}

#[tokio::test]
async fn test_rerun_skips_creation_and_rebuilds() {
    let dir = TempDir::new().unwrap();
    let flags = PipelineFlags {
        run_build: true,
        increment_version: true,
        ..Default::default()
    };
    let cfg = config(dir.path(), flags);
    let invoker = Arc::new(ScriptedHostInvoker::simulating_host());

    let first = run(cfg.clone(), invoker.clone()).await;
    let second = run(cfg.clone(), invoker.clone()).await;

    assert_exit_code(&first, 0);
    assert_exit_code(&second, 0);
    assert_stage_status(&second, StageId::CreateProject, StageStatus::Skip);
    assert_eq!(invoker.call_count(StageId::CreateProject), 1);
    assert_eq!(invoker.call_count(StageId::Build), 4);
    assert_eq!(second.built_version.to_string(), "0.1.1");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("build_version.txt")).unwrap(),
        "0.1.2"
    );
    assert!(cfg.project_path().join("Builds/v0.1.1/Android/RubeGoldbergVR.apk").is_file());
}

#[tokio::test]
async fn test_report_is_written() {
    let dir = TempDir::new().unwrap();
    let cfg = config(dir.path(), PipelineFlags::default());

    let run = run(cfg.clone(), Arc::new(ScriptedHostInvoker::simulating_host())).await;
    let path = cfg.log_dir().join("pipeline_run.json");
    run.write_report(&path).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["project"], "RubeGoldbergVR");
    assert_eq!(json["results"].as_array().unwrap().len(), 7);
    assert_eq!(json["results"][0]["stage"]["id"], "create-project");
}
