//! Core domain model types for hostflow.
//!
//! - Stage identifiers in pipeline order
//! - Stage status enum

mod status;

pub use status::{StageId, StageStatus};
