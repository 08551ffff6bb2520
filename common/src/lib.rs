pub mod types;
pub mod utils;

pub use types::*;

use ethers::types::Address;
use thiserror::Error;

/// Failures raised while deploying or auditing a fleet
#[derive(Error, Debug)]
pub enum FleetError {
    /// A created resource does not satisfy its post-condition
    #[error("verification failed for {resource}: {check} returned {actual:?}, expected {expected:?}")]
    VerificationFailure {
        resource: String,
        check: String,
        expected: Address,
        actual: Address,
    },
    /// A configuration read-back returned a value other than the one set
    #[error("verification failed for {resource}: {check} returned {actual}, expected {expected}")]
    StateMismatch {
        resource: String,
        check: String,
        expected: String,
        actual: String,
    },
    /// The ledger rejected, reverted or never included a transaction
    #[error("submission failed at {step}: {reason}")]
    SubmissionFailure { step: String, reason: String },
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),
    #[error("resource {name} is a {actual}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: ResourceKind,
        actual: ResourceKind,
    },
    #[error("{resource} depends on {dependency}, which is not deployed")]
    MissingDependency { resource: String, dependency: String },
    #[error("deployment belongs to network {expected}, ledger reports {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },
    #[error("no creation code for artifact {0}")]
    MissingArtifact(String),
    #[error("read of {call} failed: {reason}")]
    Query { call: String, reason: String },
    #[error("malformed return data from {call}: {reason}")]
    Decode { call: String, reason: String },
}

impl FleetError {
    /// Whether the run must stop and be resumed by the operator
    pub fn halts_run(&self) -> bool {
        matches!(
            self,
            Self::VerificationFailure { .. } | Self::StateMismatch { .. } | Self::SubmissionFailure { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back_mismatches_halt_the_run() {
        let err = FleetError::StateMismatch {
            resource: "RentableLogic".to_string(),
            check: "paused()".to_string(),
            expected: "true".to_string(),
            actual: "false".to_string(),
        };
        assert!(err.halts_run());
        assert!(err.to_string().contains("paused() returned false"));
        assert!(!FleetError::UnknownResource("Ghost".to_string()).halts_run());
    }
}
