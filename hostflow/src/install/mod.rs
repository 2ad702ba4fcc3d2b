//! Host-side dependency installation.
//!
//! The host only offers a non-blocking request/poll package API and a
//! periodic tick, so installation is an [`InstallQueue`] state machine
//! driven by an [`EditorLoop`]. [`SetupSequence`] chains the drained queue
//! into the configuration and scene setup phases. Hosts that expose futures
//! can use [`install_sequentially`] instead.

mod editor_loop;
mod queue;
mod sequential;
mod setup;

pub use editor_loop::{EditorLoop, FrameContext, LoopOutcome, SubscriptionId, TickControl};
#[cfg(test)]
pub use queue::MockPackageClient;
pub use queue::{
    InstallQueue, InstallReport, InstallRequest, InstallState, PackageClient, QueueState, QueueStep,
    RequestHandle,
};
pub use sequential::{install_sequentially, PackageInstaller, PollingInstaller};
pub use setup::{SetupPhase, SetupPhases, SetupProgress, SetupSequence, SharedProgress};

/// Packages installed by the setup entry point, in order.
pub const DEFAULT_PACKAGES: [&str; 2] = [
    "com.unity.xr.interaction.toolkit@2.3.1",
    "com.unity.xr.openxr@1.9.0",
];
