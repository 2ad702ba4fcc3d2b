//! The stage sequencer.
//!
//! Stages run strictly one after another in [`StageId::ORDER`]. Each
//! host-backed stage is one host launch (one per target for builds), and a
//! later stage never starts before the previous launch has exited or been
//! abandoned.

use super::gating::{gate, Gate};
use super::PipelineRun;
use crate::artifacts::{ArtifactVerifier, Distributor};
use crate::config::PipelineConfig;
use crate::core::StageId;
use crate::errors::HostflowError;
use crate::events::{noop_sink, SharedEventSink};
use crate::host::{entry_points, HostInvocation, HostInvoker};
use crate::stages::{Stage, StageResult};
use crate::version::VersionStore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Lines of captured output included in failure logs.
const FAILURE_TAIL_LINES: usize = 20;

/// Runs the release pipeline for one configuration.
pub struct StageSequencer {
    config: PipelineConfig,
    invoker: Arc<dyn HostInvoker>,
    events: SharedEventSink,
    versions: VersionStore,
    verifier: ArtifactVerifier,
}

impl std::fmt::Debug for StageSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSequencer")
            .field("config", &self.config)
            .field("versions", &self.versions)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl StageSequencer {
    /// Creates a sequencer launching the host through `invoker`.
    #[must_use]
    pub fn new(config: PipelineConfig, invoker: Arc<dyn HostInvoker>) -> Self {
        let versions = VersionStore::new(config.version_file.clone());
        let verifier = ArtifactVerifier::new(config.probe_grace);
        Self {
            config,
            invoker,
            events: noop_sink(),
            versions,
            verifier,
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }

    /// Replaces the artifact verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: ArtifactVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// The configuration this sequencer runs.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The stage list, in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        let log_dir = self.config.log_dir();
        let timeouts = &self.config.timeouts;
        StageId::ORDER
            .iter()
            .map(|&id| {
                let (timeout, method) = match id {
                    StageId::CreateProject => (timeouts.create_project, None),
                    StageId::ConfigureAndSetup => (timeouts.configure, Some(entry_points::SETUP_PROJECT)),
                    StageId::Build => (timeouts.build, Some(entry_points::PERFORM_BUILD)),
                    StageId::IncrementVersion => {
                        (timeouts.increment_version, Some(entry_points::APPLY_BUILD_VERSION))
                    }
                    StageId::SmokeTest => (self.config.probe_grace, None),
                    StageId::DeployAutomation | StageId::Distribute => (Duration::ZERO, None),
                };
                let stage = Stage::new(id, &log_dir, timeout);
                match method {
                    Some(method) => stage.with_entry_point(self.config.entry_point(method)),
                    None => stage,
                }
            })
            .collect()
    }

    /// Runs every stage and returns the run record.
    ///
    /// Never fails: every problem ends up as a failed [`StageResult`], and
    /// [`PipelineRun::exit_code`] is the only failure signal.
    pub async fn run(&self) -> PipelineRun {
        let flags = self.config.flags;
        let mut run = PipelineRun::new(&self.config.project_name, flags, self.versions.load());

        info!(
            run_id = %run.run_id,
            project = %run.project,
            version = %run.built_version,
            ?flags,
            "Pipeline started"
        );
        self.events
            .emit(
                "pipeline.started",
                Some(json!({
                    "run_id": run.run_id,
                    "project": run.project,
                    "version": run.built_version,
                })),
            )
            .await;

        for stage in self.stages() {
            let decision = match run.halted_at {
                Some(halted) => Gate::Skip(format!("halted after {halted} failed")),
                None if stage.id == StageId::CreateProject && self.config.project_path().exists() => {
                    Gate::Skip("project already exists".to_string())
                }
                None => gate(stage.id, &flags, &run),
            };

            if let Gate::Skip(reason) = decision {
                info!(stage = stage.name(), %reason, "Stage skipped");
                self.events
                    .emit("stage.skipped", Some(json!({"stage": stage.name(), "reason": reason})))
                    .await;
                run.record(StageResult::skipped(&stage, reason));
                continue;
            }

            info!(stage = stage.name(), "Stage started");
            self.events
                .emit("stage.started", Some(json!({"stage": stage.name()})))
                .await;

            for result in self.execute(&stage, &mut run).await {
                self.report(&result).await;
                if result.is_failure() && stage.required {
                    run.halted_at = Some(stage.id);
                }
                run.record(result);
            }
        }

        run.finish();
        if let Some(stage) = run.halted_at {
            error!(%stage, run_id = %run.run_id, "Pipeline halted");
        }
        let event = if run.succeeded() {
            "pipeline.completed"
        } else {
            "pipeline.failed"
        };
        info!(
            run_id = %run.run_id,
            exit_code = run.exit_code(),
            duration_ms = run.duration_ms(),
            version = %run.final_version,
            "Pipeline finished"
        );
        self.events
            .emit(
                event,
                Some(json!({
                    "run_id": run.run_id,
                    "exit_code": run.exit_code(),
                    "halted_at": run.halted_at,
                    "version": run.final_version,
                })),
            )
            .await;
        run
    }

    async fn report(&self, result: &StageResult) {
        let payload = json!({
            "stage": result.name(),
            "target": result.target,
            "exit_code": result.exit_code,
            "duration_ms": result.duration_ms(),
            "error": result.error,
        });
        if result.is_failure() {
            error!(
                stage = result.name(),
                target = result.target.as_deref(),
                exit_code = ?result.exit_code,
                error = result.error.as_deref().unwrap_or_default(),
                output = %result.output_tail(FAILURE_TAIL_LINES),
                "Stage failed"
            );
            self.events.emit("stage.failed", Some(payload)).await;
        } else {
            info!(
                stage = result.name(),
                target = result.target.as_deref(),
                duration_ms = result.duration_ms(),
                "Stage completed"
            );
            self.events.emit("stage.completed", Some(payload)).await;
        }
    }

    async fn execute(&self, stage: &Stage, run: &mut PipelineRun) -> Vec<StageResult> {
        match stage.id {
            StageId::CreateProject => {
                let invocation = HostInvocation::create_project(
                    stage,
                    self.config.project_path(),
                    &self.config.host_version,
                );
                vec![self.invoker.invoke(&invocation).await]
            }
            StageId::DeployAutomation => vec![self.deploy(stage).await],
            StageId::ConfigureAndSetup => {
                let result = match self.host_invocation(stage) {
                    Ok(invocation) => {
                        let invocation = invocation.with_args(self.config.optimizations.to_host_args());
                        self.invoker.invoke(&invocation).await
                    }
                    Err(e) => StageResult::failed(stage, Utc::now(), e.to_string()),
                };
                vec![result]
            }
            StageId::Build => self.build(stage, run).await,
            StageId::IncrementVersion => vec![self.increment_version(stage, run).await],
            StageId::SmokeTest => vec![self.smoke_test(stage, run).await],
            StageId::Distribute => vec![self.distribute(stage, run)],
        }
    }

    fn host_invocation(&self, stage: &Stage) -> crate::errors::Result<HostInvocation> {
        HostInvocation::execute_method(stage, self.config.project_path())
    }

    /// Copies the automation entry points into the project, then waits for
    /// the host to notice them.
    async fn deploy(&self, stage: &Stage) -> StageResult {
        let started_at = Utc::now();
        let source = &self.config.automation_source;
        let Some(file_name) = source.file_name() else {
            return StageResult::failed(
                stage,
                started_at,
                HostflowError::Config(format!("invalid automation source '{}'", source.display())).to_string(),
            );
        };
        let dest_dir = self.config.project_path().join("Assets").join("Editor");
        let dest = dest_dir.join(file_name);

        let copied = std::fs::create_dir_all(&dest_dir).and_then(|()| std::fs::copy(source, &dest));
        if let Err(e) = copied {
            return StageResult::failed(
                stage,
                started_at,
                format!("could not deploy '{}': {e}", source.display()),
            );
        }
        info!(
            source = %source.display(),
            dest = %dest.display(),
            settle_secs = self.config.settle_delay.as_secs_f64(),
            "Automation entry points deployed"
        );
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
        StageResult::completed(stage, started_at).with_data("deployed_to", json!(dest))
    }

    /// Builds each target in order. The first failing target stops the rest.
    async fn build(&self, stage: &Stage, run: &PipelineRun) -> Vec<StageResult> {
        let project = &self.config.project_name;
        let version = run.built_version;
        let build_dir = self.config.build_dir(&version);
        let mut results = Vec::new();

        for target in &self.config.targets {
            let output_dir = build_dir.join(&target.name);
            let mut args = vec![
                "-buildTarget".to_string(),
                target.host_target.clone(),
                "-buildVersion".to_string(),
                version.to_string(),
                "-buildOutput".to_string(),
                output_dir.display().to_string(),
                "-buildArtifact".to_string(),
                target.artifact_name(project),
            ];
            if let Some(data_dir) = target.data_dir_name(project) {
                args.extend(["-buildDataDir".to_string(), data_dir]);
            }

            let result = match self.host_invocation(stage) {
                Ok(invocation) => {
                    let invocation = invocation.with_args(args).with_target(&target.name);
                    info!(target = %target.name, output = %output_dir.display(), "Building target");
                    self.invoker.invoke(&invocation).await
                }
                Err(e) => StageResult::failed(stage, Utc::now(), e.to_string()).with_target(&target.name),
            };
            let failed = result.is_failure();
            results.push(result.with_data("output_dir", json!(output_dir)));
            if failed {
                warn!(target = %target.name, "Build failed, remaining targets not built");
                break;
            }
        }
        results
    }

    /// Bumps the patch version, lets the host apply it through
    /// `-versionFile`, then persists the value the host wrote. Nothing is
    /// written before the host succeeds.
    async fn increment_version(&self, stage: &Stage, run: &mut PipelineRun) -> StageResult {
        let started_at = Utc::now();
        let current = run.built_version;
        let next = match current.next_patch() {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, %current, "Build version left unchanged");
                return StageResult::failed(stage, started_at, e.to_string());
            }
        };

        let project_copy = self.config.project_version_path();
        let invocation = match self.host_invocation(stage) {
            Ok(invocation) => invocation.with_args([
                "-buildVersion".to_string(),
                next.to_string(),
                "-versionFile".to_string(),
                project_copy.display().to_string(),
            ]),
            Err(e) => return StageResult::failed(stage, started_at, e.to_string()),
        };
        let result = self.invoker.invoke(&invocation).await;
        if result.is_failure() {
            return result;
        }

        match self.versions.sync_from_project(&project_copy, next) {
            Ok(saved) => {
                info!(from = %current, to = %saved, "Build version incremented");
                run.final_version = saved;
                result.with_data("version", json!(saved))
            }
            Err(e) => StageResult::failed(stage, started_at, e.to_string()),
        }
    }

    async fn smoke_test(&self, stage: &Stage, run: &mut PipelineRun) -> StageResult {
        let started_at = Utc::now();
        let build_dir = self.config.build_dir(&run.built_version);
        let report = self
            .verifier
            .verify(&build_dir, &self.config.project_name, &self.config.targets)
            .await;

        let data = serde_json::to_value(&report).unwrap_or_default();
        let result = if report.succeeded() {
            StageResult::completed(stage, started_at)
        } else {
            let failed = report.failed_targets().join(", ");
            StageResult::failed(stage, started_at, format!("verification failed for: {failed}"))
        };
        run.verification = Some(report);
        result.with_data("verification", data)
    }

    fn distribute(&self, stage: &Stage, run: &mut PipelineRun) -> StageResult {
        let started_at = Utc::now();
        let build_dir = self.config.build_dir(&run.built_version);
        let distributor = Distributor::new(self.config.distribution.clone());

        match distributor.distribute(&build_dir, &self.config.project_name, &self.config.targets) {
            Ok(report) => {
                let data = serde_json::to_value(&report).unwrap_or_default();
                let result = if report.succeeded() {
                    StageResult::completed(stage, started_at)
                } else {
                    StageResult::failed(
                        stage,
                        started_at,
                        format!(
                            "{} missing artifacts, {} copy errors",
                            report.missing.len(),
                            report.errors.len()
                        ),
                    )
                };
                run.distribution = Some(report);
                result.with_data("distribution", data)
            }
            Err(e) => StageResult::failed(stage, started_at, e.to_string()),
        }
    }
}
