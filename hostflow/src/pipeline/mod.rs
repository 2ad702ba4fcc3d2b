//! Pipeline execution.
//!
//! [`StageSequencer`] walks the fixed stage order, [`gate`] decides which
//! optional stages run, and [`PipelineRun`] records the outcome.

mod gating;
mod run;
mod sequencer;

pub use gating::{gate, Gate};
pub use run::PipelineRun;
pub use sequencer::StageSequencer;
