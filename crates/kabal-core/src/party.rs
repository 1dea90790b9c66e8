//! # Parties
//!
//! Value objects for the parties of a case: the person or organization the
//! case concerns ([`SakenGjelder`]), the appealing party ([`Klager`]) and an
//! optional representative ([`Prosessfullmektig`]).
//!
//! Parties are owned by the case that embeds them. They are resolved against
//! the person and organization registries by the surrounding service before
//! they reach the core; only the shape of the identifier is checked here.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Whether a [`PartId`] refers to a person or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartIdType {
    /// A natural person, identified by an 11-digit national identity number.
    Person,
    /// An organization, identified by a 9-digit organization number.
    Virksomhet,
}

impl PartIdType {
    /// The canonical string name of this party type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Virksomhet => "VIRKSOMHET",
        }
    }
}

impl std::fmt::Display for PartIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a person or organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPartId")]
pub struct PartId {
    #[serde(rename = "type")]
    part_type: PartIdType,
    value: String,
}

#[derive(Deserialize)]
struct RawPartId {
    #[serde(rename = "type")]
    part_type: PartIdType,
    value: String,
}

impl TryFrom<RawPartId> for PartId {
    type Error = ValidationError;

    fn try_from(raw: RawPartId) -> Result<Self, Self::Error> {
        match raw.part_type {
            PartIdType::Person => Self::person(raw.value),
            PartIdType::Virksomhet => Self::virksomhet(raw.value),
        }
    }
}

impl PartId {
    /// A person reference.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPersonIdent`] unless the value is
    /// exactly 11 digits.
    pub fn person(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if !is_digits(&s, 11) {
            return Err(ValidationError::InvalidPersonIdent(s));
        }
        Ok(Self {
            part_type: PartIdType::Person,
            value: s,
        })
    }

    /// An organization reference.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidOrganisasjonsnummer`] unless the
    /// value is exactly 9 digits.
    pub fn virksomhet(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if !is_digits(&s, 9) {
            return Err(ValidationError::InvalidOrganisasjonsnummer(s));
        }
        Ok(Self {
            part_type: PartIdType::Virksomhet,
            value: s,
        })
    }

    /// Whether this reference is a person or an organization.
    pub fn part_type(&self) -> PartIdType {
        self.part_type
    }

    /// The identifier value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this reference points at a person.
    pub fn is_person(&self) -> bool {
        self.part_type == PartIdType::Person
    }
}

impl std::fmt::Display for PartId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.part_type, self.value)
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}

/// The party the case concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SakenGjelder {
    /// Reference to the person or organization.
    pub part_id: PartId,
    /// Whether this party receives copies of outgoing letters.
    pub skal_motta_kopi: bool,
}

/// The appealing party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Klager {
    /// Reference to the person or organization.
    pub part_id: PartId,
    /// Whether this party receives copies of outgoing letters.
    pub skal_motta_kopi: bool,
}

impl Klager {
    /// Whether the appealing party is also the party the case concerns.
    pub fn is_saken_gjelder(&self, saken_gjelder: &SakenGjelder) -> bool {
        self.part_id == saken_gjelder.part_id
    }
}

/// A representative acting on behalf of the appealing party.
///
/// Either registered in a registry (`part_id`) or known only by name and
/// address, e.g. a foreign lawyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prosessfullmektig {
    /// Registry reference, when one exists.
    pub part_id: Option<PartId>,
    /// Name, when the representative has no registry reference.
    pub navn: Option<String>,
}

impl Prosessfullmektig {
    /// Create a representative.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyProsessfullmektig`] when neither a
    /// party id nor a non-blank name is given.
    pub fn new(part_id: Option<PartId>, navn: Option<String>) -> Result<Self, ValidationError> {
        let navn = navn.filter(|n| !n.trim().is_empty());
        if part_id.is_none() && navn.is_none() {
            return Err(ValidationError::EmptyProsessfullmektig);
        }
        Ok(Self { part_id, navn })
    }
}
