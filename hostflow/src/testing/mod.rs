//! Testing utilities for hostflow pipelines.
//!
//! This module provides:
//! - A scripted host that records invocations and can leave build output
//! - A scripted package client for the install queue
//! - Assertions over pipeline runs

mod assertions;
mod mocks;

pub use assertions::{assert_exit_code, assert_not_executed, assert_stage_status};
pub use mocks::{ScriptedHostInvoker, ScriptedOutcome, ScriptedPackageClient};
