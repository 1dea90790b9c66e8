//! # Case Error Types
//!
//! Structured error hierarchy for the case state machine. State machine
//! rejections carry the case id, the state at the time of failure and the
//! reason, so operators can diagnose a rejected call without inspecting logs.

use kabal_core::{BehandlingId, ErrorKind, FlowState, ValidationError};
use thiserror::Error;

/// Errors arising from case operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BehandlingError {
    /// The caller's expected version does not match the stored version.
    #[error("behandling {behandling_id} was modified concurrently: expected version {expected}, found {actual}")]
    ConcurrentModification {
        /// The case identifier.
        behandling_id: BehandlingId,
        /// The version the caller based its change on.
        expected: u64,
        /// The version currently stored.
        actual: u64,
    },

    /// The case is finalized and accepts no further status-affecting change.
    #[error("behandling {behandling_id} is already finalized")]
    Avsluttet {
        /// The case identifier.
        behandling_id: BehandlingId,
    },

    /// The case is registered as erroneous and accepts no further change.
    #[error("behandling {behandling_id} is registered as erroneous")]
    Feilregistrert {
        /// The case identifier.
        behandling_id: BehandlingId,
    },

    /// A co-signer is required but missing or has not returned the case.
    #[error("behandling {behandling_id} lacks a co-signer decision: {reason}")]
    ManglerMedunderskriver {
        /// The case identifier.
        behandling_id: BehandlingId,
        /// Why the co-signer requirement is not met.
        reason: String,
    },

    /// The co-signer currently holds the case.
    #[error("behandling {behandling_id} is with the co-signer")]
    MedunderskriverHarSaken {
        /// The case identifier.
        behandling_id: BehandlingId,
    },

    /// The medical advisor currently holds the case.
    #[error("behandling {behandling_id} is with the medical advisor")]
    RolHarSaken {
        /// The case identifier.
        behandling_id: BehandlingId,
    },

    /// A hand-off flow transition is not valid from the current flow state.
    #[error("invalid {flow} transition for behandling {behandling_id} from {from} to {to}")]
    InvalidFlowTransition {
        /// The case identifier.
        behandling_id: BehandlingId,
        /// Which flow ("medunderskriver" or "rol").
        flow: &'static str,
        /// The current flow state.
        from: FlowState,
        /// The attempted flow state.
        to: FlowState,
    },

    /// A field may not be changed in the case's current situation.
    #[error("illegal update of behandling {behandling_id}: {reason}")]
    IllegalUpdate {
        /// The case identifier.
        behandling_id: BehandlingId,
        /// Why the update is rejected.
        reason: String,
    },

    /// The operation is not permitted in the case's current state.
    #[error("illegal operation {operation} on behandling {behandling_id}: {reason}")]
    IllegalOperation {
        /// The case identifier.
        behandling_id: BehandlingId,
        /// The attempted operation.
        operation: &'static str,
        /// Why the operation is rejected.
        reason: String,
    },

    /// Input failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A domain primitive failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl BehandlingError {
    /// The error-kind category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Self::Invalid { .. } | Self::Validation(_) => ErrorKind::Validation,
            Self::Avsluttet { .. }
            | Self::Feilregistrert { .. }
            | Self::ManglerMedunderskriver { .. }
            | Self::MedunderskriverHarSaken { .. }
            | Self::RolHarSaken { .. }
            | Self::InvalidFlowTransition { .. }
            | Self::IllegalUpdate { .. }
            | Self::IllegalOperation { .. } => ErrorKind::StateConflict,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
