//! The configure-and-setup sequence run inside one host invocation.
//!
//! The install queue is driven by frame ticks. Once it drains it
//! unregisters itself and hands off to a deferred call that configures the
//! project, which in turn defers scene setup, which requests exit.

use super::editor_loop::{EditorLoop, TickControl};
use super::queue::{InstallQueue, InstallReport, PackageClient, QueueState, QueueStep};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Project-side work performed after dependencies are installed.
pub trait SetupPhases: Send {
    /// Applies project configuration. Receives the install outcome.
    ///
    /// # Errors
    ///
    /// Returns a message describing why configuration failed.
    fn configure(&mut self, installs: &InstallReport) -> Result<(), String>;

    /// Builds the scene content.
    ///
    /// # Errors
    ///
    /// Returns a message describing why scene setup failed.
    fn setup_scene(&mut self) -> Result<(), String>;
}

/// Phases of the setup sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupPhase {
    /// Installing dependencies.
    Installing,
    /// Applying project configuration.
    Configuring,
    /// Building scene content.
    SceneSetup,
    /// Finished successfully.
    Completed,
    /// A phase failed.
    Failed,
}

/// Observable progress of a scheduled sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupProgress {
    /// Phases entered, in order.
    pub phases: Vec<SetupPhase>,
    /// Install outcome, once the queue drained.
    pub installs: Option<InstallReport>,
    /// Failure message from the phase that failed.
    pub error: Option<String>,
}

impl SetupProgress {
    /// The phase most recently entered.
    #[must_use]
    pub fn current(&self) -> Option<SetupPhase> {
        self.phases.last().copied()
    }

    fn enter(&mut self, phase: SetupPhase) {
        info!(?phase, "Setup phase");
        self.phases.push(phase);
    }
}

/// Shared handle to [`SetupProgress`].
pub type SharedProgress = Arc<Mutex<SetupProgress>>;

/// Wires the install queue and the follow-up phases into an [`EditorLoop`].
pub struct SetupSequence;

impl SetupSequence {
    /// Schedules the sequence on `editor` and returns its progress handle.
    ///
    /// The queue is started on the first tick. The loop's exit code becomes
    /// 0 after scene setup, or 1 if configuration or scene setup fails.
    pub fn schedule(
        editor: &mut EditorLoop,
        mut queue: InstallQueue,
        mut client: Box<dyn PackageClient>,
        phases: Box<dyn SetupPhases>,
    ) -> SharedProgress {
        let progress: SharedProgress = Arc::new(Mutex::new(SetupProgress::default()));
        progress.lock().enter(SetupPhase::Installing);

        let tick_progress = progress.clone();
        let mut phases = Some(phases);
        editor.subscribe(move |ctx| {
            let step = if queue.state() == QueueState::Idle {
                queue.start(client.as_mut())
            } else {
                queue.tick(client.as_mut())
            };
            if !matches!(step, QueueStep::Drained | QueueStep::Finished) {
                return TickControl::Continue;
            }

            let report = queue.report();
            tick_progress.lock().installs = Some(report.clone());
            let Some(mut phases) = phases.take() else {
                return TickControl::Unregister;
            };

            let progress = tick_progress.clone();
            ctx.delay_call(move |ctx| {
                progress.lock().enter(SetupPhase::Configuring);
                if let Err(e) = phases.configure(&report) {
                    fail(&progress, "configure", e);
                    ctx.exit(1);
                    return;
                }

                ctx.delay_call(move |ctx| {
                    progress.lock().enter(SetupPhase::SceneSetup);
                    if let Err(e) = phases.setup_scene() {
                        fail(&progress, "scene setup", e);
                        ctx.exit(1);
                        return;
                    }
                    progress.lock().enter(SetupPhase::Completed);
                    ctx.exit(0);
                });
            });
            TickControl::Unregister
        });

        progress
    }
}

fn fail(progress: &SharedProgress, phase: &str, message: String) {
    error!(phase, error = %message, "Setup phase failed");
    let mut progress = progress.lock();
    progress.error = Some(message);
    progress.enter(SetupPhase::Failed);
}
