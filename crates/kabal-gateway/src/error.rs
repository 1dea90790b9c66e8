//! Collaborator error types.

use kabal_core::ErrorKind;
use thiserror::Error;

/// Errors from external collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The collaborator could not be reached or timed out. Retryable.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        /// The collaborator.
        service: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// The collaborator refused the request. Not retryable.
    #[error("{service} rejected the request: {reason}")]
    Rejected {
        /// The collaborator.
        service: &'static str,
        /// Why it was refused.
        reason: String,
    },

    /// The collaborator has no record for the key.
    #[error("{service} has no record for {key}")]
    NotFound {
        /// The collaborator.
        service: &'static str,
        /// The key looked up.
        key: String,
    },
}

impl GatewayError {
    /// Whether retrying the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// The error-kind category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unavailable { .. } | Self::Rejected { .. } => ErrorKind::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        let unavailable = GatewayError::Unavailable {
            service: "arkiv",
            reason: "timeout".into(),
        };
        let rejected = GatewayError::Rejected {
            service: "arkiv",
            reason: "bad metadata".into(),
        };
        assert!(unavailable.is_transient());
        assert!(!rejected.is_transient());
        assert_eq!(rejected.kind(), ErrorKind::Collaborator);
        assert_eq!(format!("{unavailable}"), "arkiv unavailable: timeout");
    }
}
