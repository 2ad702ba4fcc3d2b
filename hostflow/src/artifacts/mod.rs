//! Post-build verification and distribution.

mod distributor;
mod verifier;

pub use distributor::{DistributionReport, Distributor};
pub use verifier::{ArtifactVerifier, ProbeOutcome, TargetCheck, VerificationReport};
