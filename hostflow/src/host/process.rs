//! Host invoker backed by a real child process.

use super::{HostInvocation, HostInvoker};
use crate::errors::HostflowError;
use crate::stages::StageResult;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Launches the host executable as a child process.
///
/// A launch that outlives its timeout is abandoned, not killed: the
/// controller records a failure with whatever output arrived so far and
/// moves on while the orphaned host may keep running until something
/// external stops it. Its pipes stay drained in the background.
#[derive(Debug, Clone)]
pub struct ProcessHostInvoker {
    executable: PathBuf,
    leading_args: Vec<String>,
    capture_log: bool,
}

impl ProcessHostInvoker {
    /// Creates an invoker for `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            leading_args: Vec::new(),
            capture_log: true,
        }
    }

    /// Arguments placed before the host flags, for wrapper launchers.
    #[must_use]
    pub fn with_leading_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the per-stage `cmd_*.log` capture file.
    #[must_use]
    pub fn with_capture_log(mut self, enabled: bool) -> Self {
        self.capture_log = enabled;
        self
    }

    /// Returns the host executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl HostInvoker for ProcessHostInvoker {
    async fn invoke(&self, invocation: &HostInvocation) -> StageResult {
        let stage = &invocation.stage;
        let started_at = Utc::now();
        let args = invocation.args();

        info!(
            stage = stage.name(),
            target = invocation.target.as_deref(),
            executable = %self.executable.display(),
            args = %args.join(" "),
            "Invoking host"
        );

        let log_file = invocation.log_file();
        if let Some(dir) = log_file.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), error = %e, "Could not create log directory");
            }
        }

        let mut command = Command::new(&self.executable);
        command
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                let err = HostflowError::Launch {
                    executable: self.executable.clone(),
                    source,
                };
                error!(stage = stage.name(), error = %err, "Host launch failed");
                let result = StageResult::failed(stage, started_at, err.to_string());
                return with_target(result, invocation);
            }
        };

        let stdout = PipeReader::spawn(child.stdout.take());
        let stderr = PipeReader::spawn(child.stderr.take());

        let result = match tokio::time::timeout(stage.timeout, child.wait()).await {
            Err(_) => {
                let err = HostflowError::Timeout {
                    stage: stage.name().to_string(),
                    timeout: stage.timeout,
                };
                error!(stage = stage.name(), error = %err, "Host invocation abandoned");
                StageResult::failed(stage, started_at, err.to_string())
                    .with_output(stdout.snapshot(), stderr.snapshot())
            }
            Ok(Err(e)) => {
                error!(stage = stage.name(), error = %e, "Failed waiting for host");
                StageResult::failed(stage, started_at, HostflowError::Io(e).to_string())
                    .with_output(stdout.snapshot(), stderr.snapshot())
            }
            Ok(Ok(status)) => {
                let stdout = stdout.finish().await;
                let stderr = stderr.finish().await;
                let exit_code = status.code();

                let result = if status.success() {
                    debug!(stage = stage.name(), "Host exited cleanly");
                    StageResult::completed(stage, started_at)
                } else {
                    let err = HostflowError::HostFailed {
                        stage: stage.name().to_string(),
                        exit_code,
                    };
                    StageResult::failed(stage, started_at, err.to_string())
                };
                result.with_exit_code(exit_code).with_output(stdout, stderr)
            }
        };

        let result = with_target(result, invocation);
        if self.capture_log {
            write_capture_log(&invocation.capture_log(), &result);
        }
        result
    }
}

fn with_target(result: StageResult, invocation: &HostInvocation) -> StageResult {
    match &invocation.target {
        Some(target) => result.with_target(target.clone()),
        None => result,
    }
}

/// Drains one child pipe into a shared buffer until EOF.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl PipeReader {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0_u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Output received so far. The reader keeps draining in the background.
    fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Waits for EOF and returns everything the pipe produced.
    async fn finish(mut self) -> String {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Pipe reader stopped unexpectedly");
            }
        }
        self.snapshot()
    }
}

/// Writes captured stdout/stderr next to the host's own log, replacing any
/// capture left by a previous run.
fn write_capture_log(path: &Path, result: &StageResult) {
    let suffix = if result.succeeded() { "" } else { " (Error)" };
    let mut content = String::new();
    if let Some(target) = &result.target {
        content.push_str(&format!("TARGET: {target}\n"));
    }
    content.push_str(&format!("STDOUT{suffix}:\n{}\nSTDERR{suffix}:\n{}\n", result.stdout, result.stderr));

    match std::fs::write(path, content) {
        Ok(()) => debug!(path = %path.display(), "Wrote command capture log"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not write command capture log"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::{StageId, StageStatus};
    use crate::stages::Stage;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn script_invoker(dir: &TempDir, body: &str) -> ProcessHostInvoker {
        let script = dir.path().join("host.sh");
        std::fs::write(&script, body).unwrap();
        ProcessHostInvoker::new("/bin/sh").with_leading_args([script.display().to_string()])
    }

    fn invocation(dir: &TempDir, timeout: Duration) -> HostInvocation {
        let logs = dir.path().join("Game").join("Logs");
        let stage = Stage::new(StageId::ConfigureAndSetup, &logs, timeout)
            .with_entry_point("BuildAutomation.SetupProject");
        HostInvocation::execute_method(&stage, dir.path().join("Game")).unwrap()
    }

    #[tokio::test]
    async fn test_success_captures_output() {
        let dir = TempDir::new().unwrap();
        let invoker = script_invoker(&dir, "echo \"args: $*\"\necho warn >&2\nexit 0\n");
        let inv = invocation(&dir, Duration::from_secs(10));

        let result = invoker.invoke(&inv).await;

        assert!(result.succeeded(), "{result:?}");
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("-executeMethod BuildAutomation.SetupProject"));
        assert!(result.stderr.contains("warn"));

        let capture = std::fs::read_to_string(inv.capture_log()).unwrap();
        assert!(capture.starts_with("STDOUT:\n"));
        assert!(capture.contains("STDERR:\nwarn"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let dir = TempDir::new().unwrap();
        let invoker = script_invoker(&dir, "echo broken\nexit 3\n");
        let inv = invocation(&dir, Duration::from_secs(10));

        let result = invoker.invoke(&inv).await;

        assert_eq!(result.status, StageStatus::Fail);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.error.as_deref().unwrap().contains("exit code 3"));
        let capture = std::fs::read_to_string(inv.capture_log()).unwrap();
        assert!(capture.contains("STDOUT (Error):\nbroken"));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let dir = TempDir::new().unwrap();
        let invoker = script_invoker(&dir, "echo importing assets\necho slow >&2\nsleep 5\n");
        let inv = invocation(&dir, Duration::from_millis(500));

        let start = Instant::now();
        let result = invoker.invoke(&inv).await;

        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(result.is_failure());
        assert!(result.exit_code.is_none());
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        assert!(result.stdout.contains("importing assets"));
        assert!(result.stderr.contains("slow"));
        let capture = std::fs::read_to_string(inv.capture_log()).unwrap();
        assert!(capture.contains("STDOUT (Error):\nimporting assets"));
    }

    #[tokio::test]
    async fn test_build_targets_get_their_own_logs_across_runs() {
        let dir = TempDir::new().unwrap();
        let invoker = script_invoker(&dir, "echo \"args: $*\"\n");
        let logs = dir.path().join("Game").join("Logs");
        let stage = Stage::new(StageId::Build, &logs, Duration::from_secs(10))
            .with_entry_point("BuildAutomation.PerformBuild");
        let targets = ["StandaloneWindows64", "Android"];

        for _ in 0..2 {
            for target in targets {
                let inv = HostInvocation::execute_method(&stage, dir.path().join("Game"))
                    .unwrap()
                    .with_target(target);
                assert!(invoker.invoke(&inv).await.succeeded());
            }
        }

        for target in targets {
            let capture = std::fs::read_to_string(logs.join(format!("cmd_build_{target}.log"))).unwrap();
            assert_eq!(capture.matches("TARGET:").count(), 1);
            assert_eq!(capture.matches("STDOUT:").count(), 1);
            assert!(capture.contains(&format!("host_build_{target}.log")));
        }
        assert!(!logs.join("cmd_build.log").exists());
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let invoker = ProcessHostInvoker::new(dir.path().join("no-such-host"));
        let inv = invocation(&dir, Duration::from_secs(1)).with_target("Android");

        let result = invoker.invoke(&inv).await;

        assert!(result.is_failure());
        assert!(result.exit_code.is_none());
        assert_eq!(result.target.as_deref(), Some("Android"));
        assert!(result.error.as_deref().unwrap().contains("Failed to launch"));
    }
}
