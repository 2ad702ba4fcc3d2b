//! Hostflow emulator - a stand-in batch-mode host
//!
//! Understands the same flags as the real host for the entry points the
//! controller calls, and leaves behind the files the real host would. Used
//! for local dry runs and the CLI end-to-end tests.
//!
//! Environment:
//! - `HOSTFLOW_EMULATOR_FAIL_TARGET`: build target that fails to build
//! - `HOSTFLOW_EMULATOR_FAIL_PACKAGES`: comma-separated packages that fail to install

use anyhow::{bail, Context, Result};
use hostflow::host::{entry_points, flag_value};
use hostflow::install::{EditorLoop, InstallQueue, InstallReport, SetupPhases, SetupSequence, DEFAULT_PACKAGES};
use hostflow::testing::ScriptedPackageClient;
use hostflow::version::{write_version, BuildVersion};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const MAX_SETUP_FRAMES: u64 = 10_000;
const POLL_LATENCY: Duration = Duration::from_millis(5);

struct EmulatedPhases {
    project: PathBuf,
    switches: Vec<String>,
}

impl SetupPhases for EmulatedPhases {
    fn configure(&mut self, installs: &InstallReport) -> Result<(), String> {
        let settings = serde_json::json!({
            "installed": installs.installed(),
            "failed": installs.failed,
            "switches": self.switches,
        });
        let dir = self.project.join("ProjectSettings");
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        std::fs::write(dir.join("hostflow_setup.json"), settings.to_string()).map_err(|e| e.to_string())
    }

    fn setup_scene(&mut self) -> Result<(), String> {
        let dir = self.project.join("Assets").join("Scenes");
        std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
        std::fs::write(dir.join("Main.unity"), "%YAML 1.1\n").map_err(|e| e.to_string())
    }
}

fn required<'a>(args: &'a [String], flag: &str) -> Result<&'a str> {
    flag_value(args, flag).with_context(|| format!("missing {flag}"))
}

fn setup_project(project: &Path, args: &[String]) -> Result<i32> {
    let failing = std::env::var("HOSTFLOW_EMULATOR_FAIL_PACKAGES").unwrap_or_default();
    let client = failing
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .fold(
            ScriptedPackageClient::new()
                .with_polls_until_done(3)
                .with_latency(POLL_LATENCY),
            ScriptedPackageClient::failing,
        );

    let switches = args
        .iter()
        .skip_while(|a| !a.starts_with("-skip"))
        .cloned()
        .collect();

    let mut editor = EditorLoop::new();
    let progress = SetupSequence::schedule(
        &mut editor,
        InstallQueue::new(DEFAULT_PACKAGES),
        Box::new(client),
        Box::new(EmulatedPhases {
            project: project.to_path_buf(),
            switches,
        }),
    );
    let outcome = editor.run_until_exit(MAX_SETUP_FRAMES);
    info!(frames = outcome.frames, phases = ?progress.lock().phases, "Setup finished");
    match outcome.exit_code {
        Some(code) => Ok(code),
        None => bail!("setup did not finish within {MAX_SETUP_FRAMES} frames"),
    }
}

fn perform_build(args: &[String]) -> Result<i32> {
    let target = required(args, "-buildTarget")?;
    let output = PathBuf::from(required(args, "-buildOutput")?);
    let artifact = required(args, "-buildArtifact")?;
    let version: BuildVersion = required(args, "-buildVersion")?.parse()?;

    if std::env::var("HOSTFLOW_EMULATOR_FAIL_TARGET").is_ok_and(|t| t == target) {
        error!(target, "Build failed: scripted failure");
        return Ok(1);
    }

    std::fs::create_dir_all(&output)?;
    std::fs::write(output.join(artifact), format!("{target} {version}\n"))?;
    if let Some(data_dir) = flag_value(args, "-buildDataDir") {
        let data_dir = output.join(data_dir);
        std::fs::create_dir_all(&data_dir)?;
        std::fs::write(data_dir.join("globalgamemanagers"), version.to_string())?;
    }
    info!(target, %version, output = %output.display(), "Build succeeded");
    Ok(0)
}

fn apply_build_version(args: &[String]) -> Result<i32> {
    let version: BuildVersion = required(args, "-buildVersion")?.parse()?;
    let file = PathBuf::from(required(args, "-versionFile")?);
    write_version(&file, &version)?;
    info!(%version, path = %file.display(), "Build version applied");
    Ok(0)
}

fn run(args: &[String]) -> Result<i32> {
    if let Some(project) = flag_value(args, "-createProject") {
        let version = flag_value(args, "-version").unwrap_or("unknown");
        std::fs::create_dir_all(Path::new(project).join("Assets"))?;
        info!(project, version, "Project created");
        return Ok(0);
    }

    let project = PathBuf::from(required(args, "-projectPath")?);
    if !project.is_dir() {
        bail!("project path {} does not exist", project.display());
    }
    let entry_point = required(args, "-executeMethod")?;
    let method = entry_point.rsplit('.').next().unwrap_or(entry_point);
    info!(entry_point, "Executing method");

    match method {
        entry_points::SETUP_PROJECT => setup_project(&project, args),
        entry_points::PERFORM_BUILD => perform_build(args),
        entry_points::APPLY_BUILD_VERSION => apply_build_version(args),
        other => bail!("unknown entry point method '{other}'"),
    }
}

fn write_host_log(path: &Path, args: &[String]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("hostflow-emulator {}\n", args.join(" ")))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).with_ansi(false).init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    if let Some(log_file) = flag_value(&args, "-logFile") {
        if let Err(e) = write_host_log(Path::new(log_file), &args) {
            warn!(path = log_file, error = %e, "Could not write host log");
        }
    }

    match run(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Emulated host failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_log_write_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let args = vec!["-batchmode".to_string()];

        let log = dir.path().join("Logs").join("host_build_Android.log");
        write_host_log(&log, &args).unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "hostflow-emulator -batchmode\n");

        let blocked = dir.path().join("file");
        std::fs::write(&blocked, "").unwrap();
        assert!(write_host_log(&blocked.join("host.log"), &args).is_err());
    }
}
