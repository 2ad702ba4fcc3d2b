//! Smoke-test checklist for built artifacts.

use crate::config::BuildTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

/// How a launch probe ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum ProbeOutcome {
    /// Exited with status 0 inside the grace period.
    ExitedCleanly,
    /// Exited non-zero inside the grace period.
    ExitedWithCode(Option<i32>),
    /// Still running when the grace period ended; it was killed.
    StillRunning,
    /// Could not be started.
    LaunchFailed(String),
}

/// Checklist result for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCheck {
    /// Target name.
    pub target: String,
    /// Expected artifact path.
    pub artifact: PathBuf,
    /// Whether the artifact exists.
    pub artifact_present: bool,
    /// Expected data directory, for targets that have one.
    pub data_dir: Option<PathBuf>,
    /// Whether the data directory exists.
    pub data_dir_present: Option<bool>,
    /// Launch probe result, for the probed target.
    pub probe: Option<ProbeOutcome>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
}

impl TargetCheck {
    /// Returns true if every existence check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.artifact_present && self.data_dir_present != Some(false)
    }
}

/// Results for every target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// One entry per target, in build order.
    pub checks: Vec<TargetCheck>,
}

impl VerificationReport {
    /// Returns true if every target passed its existence checks.
    ///
    /// Launch probe anomalies never fail verification.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.checks.iter().all(TargetCheck::passed)
    }

    /// Targets that failed.
    #[must_use]
    pub fn failed_targets(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed())
            .map(|c| c.target.as_str())
            .collect()
    }

    /// Count of warnings across targets.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.checks.iter().map(|c| c.warnings.len()).sum()
    }
}

/// Runs the smoke-test checklist over a version's build directory.
#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    grace: Duration,
    launch_probe: bool,
}

impl ArtifactVerifier {
    /// Creates a verifier giving probed artifacts `grace` to exit.
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            launch_probe: true,
        }
    }

    /// Enables or disables the launch probe.
    #[must_use]
    pub fn with_launch_probe(mut self, enabled: bool) -> Self {
        self.launch_probe = enabled;
        self
    }

    /// Checks every target under `build_dir/<target>`. A failing target
    /// never stops the remaining checks.
    pub async fn verify(&self, build_dir: &Path, project: &str, targets: &[BuildTarget]) -> VerificationReport {
        let mut report = VerificationReport::default();
        for target in targets {
            let check = self.check_target(&build_dir.join(&target.name), project, target).await;
            if check.passed() {
                info!(target = %check.target, warnings = check.warnings.len(), "Target verified");
            } else {
                error!(target = %check.target, artifact = %check.artifact.display(), "Target verification failed");
            }
            report.checks.push(check);
        }
        report
    }

    async fn check_target(&self, dir: &Path, project: &str, target: &BuildTarget) -> TargetCheck {
        let artifact = dir.join(target.artifact_name(project));
        let artifact_present = artifact.is_file();
        let mut warnings = Vec::new();
        if !artifact_present {
            warn!(target = %target.name, path = %artifact.display(), "Artifact missing");
        }

        let data_dir = target.data_dir_name(project).map(|d| dir.join(d));
        let data_dir_present = data_dir.as_ref().map(|d| {
            let present = d.is_dir();
            if !present {
                warn!(target = %target.name, path = %d.display(), "Data directory missing");
            } else if is_empty_dir(d) {
                warn!(target = %target.name, path = %d.display(), "Data directory is empty");
                warnings.push(format!("data directory {} is empty", d.display()));
            }
            present
        });

        let probe = if self.launch_probe && target.launch_probe && artifact_present {
            let outcome = self.probe(&artifact).await;
            match &outcome {
                ProbeOutcome::ExitedWithCode(code) => {
                    warnings.push(format!("launch probe exited with {code:?}"));
                }
                ProbeOutcome::LaunchFailed(reason) => {
                    warnings.push(format!("launch probe could not start: {reason}"));
                }
                ProbeOutcome::ExitedCleanly | ProbeOutcome::StillRunning => {}
            }
            Some(outcome)
        } else {
            None
        };

        TargetCheck {
            target: target.name.clone(),
            artifact,
            artifact_present,
            data_dir,
            data_dir_present,
            probe,
            warnings,
        }
    }

    async fn probe(&self, artifact: &Path) -> ProbeOutcome {
        info!(path = %artifact.display(), grace_secs = self.grace.as_secs_f64(), "Launching artifact");
        let mut child = match Command::new(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(path = %artifact.display(), error = %e, "Launch probe could not start");
                return ProbeOutcome::LaunchFailed(e.to_string());
            }
        };

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) if status.success() => ProbeOutcome::ExitedCleanly,
            Ok(Ok(status)) => {
                warn!(path = %artifact.display(), exit_code = ?status.code(), "Launch probe exited non-zero");
                ProbeOutcome::ExitedWithCode(status.code())
            }
            Ok(Err(e)) => {
                warn!(path = %artifact.display(), error = %e, "Launch probe wait failed");
                ProbeOutcome::LaunchFailed(e.to_string())
            }
            Err(_) => {
                info!(path = %artifact.display(), "Artifact still running after grace period, stopping it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Could not stop launch probe");
                }
                ProbeOutcome::StillRunning
            }
        }
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map_or(true, |mut entries| entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn populate(dir: &Path, target: &BuildTarget, project: &str, with_data: bool) {
        let out = dir.join(&target.name);
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join(target.artifact_name(project)), b"bin").unwrap();
        if let Some(data) = target.data_dir_name(project) {
            std::fs::create_dir_all(out.join(&data)).unwrap();
            if with_data {
                std::fs::write(out.join(data).join("level0"), b"x").unwrap();
            }
        }
    }

    fn verifier() -> ArtifactVerifier {
        ArtifactVerifier::new(Duration::from_millis(200)).with_launch_probe(false)
    }

    #[tokio::test]
    async fn test_all_present() {
        let dir = TempDir::new().unwrap();
        let targets = vec![BuildTarget::standalone_windows(), BuildTarget::android()];
        for t in &targets {
            populate(dir.path(), t, "Game", true);
        }

        let report = verifier().verify(dir.path(), "Game", &targets).await;

        assert!(report.succeeded());
        assert_eq!(report.checks.len(), 2);
        assert_eq!(report.warning_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_only_that_target() {
        let dir = TempDir::new().unwrap();
        let targets = vec![BuildTarget::standalone_windows(), BuildTarget::android()];
        populate(dir.path(), &targets[0], "Game", true);

        let report = verifier().verify(dir.path(), "Game", &targets).await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_targets(), vec!["Android"]);
        assert!(report.checks[0].passed());
    }

    #[tokio::test]
    async fn test_empty_data_dir_is_warning() {
        let dir = TempDir::new().unwrap();
        let targets = vec![BuildTarget::standalone_windows()];
        populate(dir.path(), &targets[0], "Game", false);

        let report = verifier().verify(dir.path(), "Game", &targets).await;

        assert!(report.succeeded());
        assert_eq!(report.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_launch_failure_is_warning() {
        let dir = TempDir::new().unwrap();
        let targets = vec![BuildTarget::standalone_windows()];
        populate(dir.path(), &targets[0], "Game", true);

        // Not executable, so the probe cannot start it.
        let report = ArtifactVerifier::new(Duration::from_millis(200))
            .verify(dir.path(), "Game", &targets)
            .await;

        assert!(report.succeeded());
        assert!(matches!(report.checks[0].probe, Some(ProbeOutcome::LaunchFailed(_))));
        assert_eq!(report.warning_count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_non_zero_exit_is_warning() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mut target = BuildTarget::standalone_windows();
        target.artifact = "{project}.sh".to_string();
        target.data_dir = None;
        let out = dir.path().join(&target.name);
        std::fs::create_dir_all(&out).unwrap();
        let script = out.join("Game.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let report = ArtifactVerifier::new(Duration::from_secs(5))
            .verify(dir.path(), "Game", &[target])
            .await;

        assert!(report.succeeded());
        assert!(matches!(
            report.checks[0].probe,
            Some(ProbeOutcome::ExitedWithCode(Some(2))) | Some(ProbeOutcome::LaunchFailed(_))
        ));
    }
}
