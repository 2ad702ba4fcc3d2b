//! # Hostflow
//!
//! A release pipeline controller for editor hosts that can run one named
//! entry point per unattended batch launch.
//!
//! Hostflow drives a project through a fixed sequence of stages:
//!
//! - **Create** the project if it does not exist yet
//! - **Deploy** the automation entry points into it
//! - **Configure and set up** the project (dependency installs, settings, scene)
//! - **Build** every configured target
//! - **Increment** the persisted build version
//! - **Smoke test** the built artifacts
//! - **Distribute** them to a configured sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hostflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::new()
//!     .with_project_name("RubeGoldbergVR")
//!     .with_flags(PipelineFlags { run_build: true, ..Default::default() });
//!
//! let invoker = Arc::new(ProcessHostInvoker::new(&config.host_executable));
//! let run = StageSequencer::new(config, invoker).run().await;
//! std::process::exit(run.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod artifacts;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod host;
pub mod install;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactVerifier, DistributionReport, Distributor, VerificationReport};
    pub use crate::config::{
        BuildTarget, DistributionConfig, DistributionMode, OptimizationSwitches, PipelineConfig,
        PipelineFlags, StageTimeouts,
    };
    pub use crate::core::{StageId, StageStatus};
    pub use crate::errors::{HostflowError, Result};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, SharedEventSink};
    pub use crate::host::{HostInvocation, HostInvoker, ProcessHostInvoker};
    pub use crate::install::{
        EditorLoop, InstallQueue, InstallReport, PackageClient, SetupPhases, SetupSequence,
        DEFAULT_PACKAGES,
    };
    pub use crate::pipeline::{PipelineRun, StageSequencer};
    pub use crate::stages::{Stage, StageResult};
    pub use crate::version::{BuildVersion, VersionStore};
}
