//! Scripted doubles for the host and its package API.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::StageId;
use crate::errors::HostflowError;
use crate::host::{HostInvocation, HostInvoker, LaunchMode};
use crate::install::{InstallState, PackageClient, RequestHandle};
use crate::stages::StageResult;

/// What a scripted host launch does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Exit 0.
    Succeed,
    /// Exit with a non-zero code and the given stderr.
    Fail {
        /// Exit code.
        exit_code: i32,
        /// Captured stderr.
        stderr: String,
    },
    /// Never finish within the stage timeout.
    TimeOut,
}

impl ScriptedOutcome {
    /// A failure with exit code 1.
    #[must_use]
    pub fn fail(stderr: impl Into<String>) -> Self {
        Self::Fail {
            exit_code: 1,
            stderr: stderr.into(),
        }
    }
}

type Effect = Arc<dyn Fn(&HostInvocation) + Send + Sync>;

/// A [`HostInvoker`] that returns scripted outcomes and records every
/// invocation.
///
/// Outcomes are keyed by stage, optionally narrowed to one build target.
/// Unscripted launches succeed. Effects registered for a stage run on
/// successful launches, so tests can leave the files a real host would.
#[derive(Default)]
pub struct ScriptedHostInvoker {
    outcomes: HashMap<(StageId, Option<String>), ScriptedOutcome>,
    effects: HashMap<StageId, Effect>,
    invocations: Mutex<Vec<HostInvocation>>,
}

impl std::fmt::Debug for ScriptedHostInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHostInvoker")
            .field("outcomes", &self.outcomes)
            .field("invocations", &self.invocations.lock().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedHostInvoker {
    /// Creates an invoker where every launch succeeds and does nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an invoker that leaves the files a real host would: the
    /// project directory, build artifacts and the project version copy.
    #[must_use]
    pub fn simulating_host() -> Self {
        Self::new()
            .with_effect(StageId::CreateProject, |inv| {
                let _ = std::fs::create_dir_all(&inv.project_path);
            })
            .with_effect(StageId::Build, |inv| write_build_output(inv))
            .with_effect(StageId::IncrementVersion, |inv| {
                if let (Some(version), Some(path)) = (inv.arg_value("-buildVersion"), inv.arg_value("-versionFile")) {
                    let _ = std::fs::write(path, version);
                }
            })
    }

    /// Scripts the outcome of every launch for `stage`.
    #[must_use]
    pub fn with_outcome(mut self, stage: StageId, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert((stage, None), outcome);
        self
    }

    /// Scripts the outcome of launches for `stage` building `target`.
    #[must_use]
    pub fn with_target_outcome(mut self, stage: StageId, target: impl Into<String>, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert((stage, Some(target.into())), outcome);
        self
    }

    /// Runs `effect` on each successful launch for `stage`.
    #[must_use]
    pub fn with_effect(mut self, stage: StageId, effect: impl Fn(&HostInvocation) + Send + Sync + 'static) -> Self {
        self.effects.insert(stage, Arc::new(effect));
        self
    }

    /// Every invocation received, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<HostInvocation> {
        self.invocations.lock().clone()
    }

    /// Stages invoked, in order, one entry per launch.
    #[must_use]
    pub fn invoked_stages(&self) -> Vec<StageId> {
        self.invocations.lock().iter().map(|i| i.stage.id).collect()
    }

    /// Number of launches for `stage`.
    #[must_use]
    pub fn call_count(&self, stage: StageId) -> usize {
        self.invocations.lock().iter().filter(|i| i.stage.id == stage).count()
    }

    fn outcome_for(&self, invocation: &HostInvocation) -> ScriptedOutcome {
        let id = invocation.stage.id;
        invocation
            .target
            .as_ref()
            .and_then(|t| self.outcomes.get(&(id, Some(t.clone()))))
            .or_else(|| self.outcomes.get(&(id, None)))
            .cloned()
            .unwrap_or(ScriptedOutcome::Succeed)
    }
}

#[async_trait]
impl HostInvoker for ScriptedHostInvoker {
    async fn invoke(&self, invocation: &HostInvocation) -> StageResult {
        self.invocations.lock().push(invocation.clone());
        let stage = &invocation.stage;
        let started_at = Utc::now();

        let result = match self.outcome_for(invocation) {
            ScriptedOutcome::Succeed => {
                if let Some(effect) = self.effects.get(&stage.id) {
                    effect(invocation);
                }
                let stdout = match &invocation.mode {
                    LaunchMode::CreateProject { host_version } => format!("created project with {host_version}"),
                    LaunchMode::ExecuteMethod { entry_point } => format!("executed {entry_point}"),
                };
                StageResult::completed(stage, started_at)
                    .with_exit_code(Some(0))
                    .with_output(stdout, "")
            }
            ScriptedOutcome::Fail { exit_code, stderr } => {
                let err = HostflowError::HostFailed {
                    stage: stage.name().to_string(),
                    exit_code: Some(exit_code),
                };
                StageResult::failed(stage, started_at, err.to_string())
                    .with_exit_code(Some(exit_code))
                    .with_output("", stderr)
            }
            ScriptedOutcome::TimeOut => {
                let err = HostflowError::Timeout {
                    stage: stage.name().to_string(),
                    timeout: stage.timeout,
                };
                StageResult::failed(stage, started_at, err.to_string())
            }
        };

        match &invocation.target {
            Some(target) => result.with_target(target.clone()),
            None => result,
        }
    }
}

fn write_build_output(inv: &HostInvocation) {
    let (Some(output), Some(artifact)) = (inv.arg_value("-buildOutput"), inv.arg_value("-buildArtifact")) else {
        return;
    };
    let output = Path::new(output);
    let _ = std::fs::create_dir_all(output);
    let _ = std::fs::write(output.join(artifact), b"artifact");
    if let Some(data_dir) = inv.arg_value("-buildDataDir") {
        let data_dir = output.join(data_dir);
        let _ = std::fs::create_dir_all(&data_dir);
        let _ = std::fs::write(data_dir.join("globalgamemanagers"), b"data");
    }
}

/// A [`PackageClient`] that completes each request after a fixed number of
/// polls.
#[derive(Debug)]
pub struct ScriptedPackageClient {
    polls_until_done: usize,
    failing: HashSet<String>,
    requests: Vec<(String, usize)>,
    latency: Duration,
}

impl Default for ScriptedPackageClient {
    fn default() -> Self {
        Self {
            polls_until_done: 1,
            failing: HashSet::new(),
            requests: Vec::new(),
            latency: Duration::ZERO,
        }
    }
}

impl ScriptedPackageClient {
    /// Creates a client whose requests finish on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests report done on the `polls`-th poll.
    #[must_use]
    pub fn with_polls_until_done(mut self, polls: usize) -> Self {
        self.polls_until_done = polls.max(1);
        self
    }

    /// Requests for `package` finish as failed.
    #[must_use]
    pub fn failing(mut self, package: impl Into<String>) -> Self {
        self.failing.insert(package.into());
        self
    }

    /// Blocks each poll for `latency`, to mimic a slow host API.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Packages requested so far, in order.
    #[must_use]
    pub fn added(&self) -> Vec<String> {
        self.requests.iter().map(|(p, _)| p.clone()).collect()
    }
}

impl PackageClient for ScriptedPackageClient {
    fn add(&mut self, package: &str) -> RequestHandle {
        self.requests.push((package.to_string(), 0));
        RequestHandle((self.requests.len() - 1) as u64)
    }

    fn poll(&mut self, handle: RequestHandle) -> InstallState {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let Some((package, polls)) = usize::try_from(handle.0)
            .ok()
            .and_then(|i| self.requests.get_mut(i))
        else {
            return InstallState::Failed(format!("unknown request {}", handle.0));
        };
        *polls += 1;
        if *polls < self.polls_until_done {
            InstallState::Pending
        } else if self.failing.contains(package.as_str()) {
            InstallState::Failed(format!("{package} could not be resolved"))
        } else {
            InstallState::Completed
        }
    }
}
