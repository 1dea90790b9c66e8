//! # Error Hierarchy
//!
//! The error-kind taxonomy shared by every subsystem, and the validation
//! errors raised by identifier and party constructors.
//!
//! Errors are structured with `thiserror`. No `Box<dyn Error>`, no
//! `.unwrap()` outside tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category an error belongs to.
///
/// The core only reports the kind; mapping a kind to a transport status
/// (400, 409, 404, 502 …) is the responsibility of the excluded HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed input or a failed precondition on the input itself.
    /// Rejected before any mutation; safe to retry once the input is fixed.
    Validation,
    /// The record is in a state that does not permit the operation
    /// (finalized case, missing co-signer, archived document …).
    StateConflict,
    /// The caller's expected version does not match the stored version.
    ConcurrentModification,
    /// An external collaborator failed or was unreachable.
    Collaborator,
    /// The referenced case, document or comment does not exist.
    NotFound,
}

impl ErrorKind {
    /// The canonical string name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::StateConflict => "STATE_CONFLICT",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::Collaborator => "COLLABORATOR",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors for domain primitive newtypes.
///
/// Each variant carries the rejected input so that operators can diagnose
/// bad data without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// NAV ident is not one uppercase letter followed by six digits.
    #[error("invalid NAV ident: \"{0}\" (expected one uppercase letter and 6 digits)")]
    InvalidNavIdent(String),

    /// Person identifier is not 11 digits.
    #[error("invalid person identifier: \"{0}\" (expected 11 digits)")]
    InvalidPersonIdent(String),

    /// Organization number is not 9 digits.
    #[error("invalid organization number: \"{0}\" (expected 9 digits)")]
    InvalidOrganisasjonsnummer(String),

    /// A representative must be identified by a party id or by name.
    #[error("prosessfullmektig needs a party id or a name")]
    EmptyProsessfullmektig,

    /// A required text field was empty.
    #[error("field {0} must be non-empty")]
    EmptyField(&'static str),
}

impl ValidationError {
    /// Validation errors are always [`ErrorKind::Validation`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
