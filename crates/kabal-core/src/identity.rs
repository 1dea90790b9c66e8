//! # Identity Newtypes
//!
//! Identifier newtypes for the case core. UUID-based identifiers
//! ([`BehandlingId`], [`DokumentId`], [`KommentarId`], [`MottakId`]) are
//! always valid by construction. [`NavIdent`] is validated at construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a case (behandling). Immutable for the life of the case.
    BehandlingId,
    "behandling"
);

uuid_id!(
    /// Identifier of a document under work. Documents persist independently
    /// of their owning case and are queryable by this id.
    DokumentId,
    "dokument"
);

uuid_id!(
    /// Identifier of a comment on a smart document.
    KommentarId,
    "kommentar"
);

uuid_id!(
    /// Identifier of an inbound intake record.
    MottakId,
    "mottak"
);

// ---------------------------------------------------------------------------
// NAV ident (validated at construction)
// ---------------------------------------------------------------------------

/// Employee identifier of a case officer, co-signer or medical advisor.
///
/// Format: one uppercase ASCII letter followed by six digits, e.g. `Z994488`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NavIdent(String);

impl NavIdent {
    /// Create a NAV ident, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidNavIdent`] if the value is not one
    /// uppercase letter followed by six digits.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let mut chars = s.chars();
        let letter_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase());
        let digits: Vec<char> = chars.collect();
        if !letter_ok || digits.len() != 6 || !digits.iter().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidNavIdent(s));
        }
        Ok(Self(s))
    }

    /// Access the ident string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NavIdent {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NavIdent> for String {
    fn from(value: NavIdent) -> Self {
        value.0
    }
}

impl std::fmt::Display for NavIdent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
