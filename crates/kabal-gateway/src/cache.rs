//! # Person and Egen-Ansatt Caches
//!
//! Registry lookups are expensive and the registries publish change events,
//! so the service keeps injectable caches that are filled on a miss,
//! upserted from events and cleared on demand. Both caches are cheap to
//! clone and share one underlying map.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::collaborator::PersonRegister;
use crate::error::GatewayError;

/// A person as cached from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// National identity number.
    pub foedselsnummer: String,
    /// Full name.
    pub navn: String,
    /// Confidential address.
    pub fortrolig: bool,
    /// Strictly confidential address.
    pub strengt_fortrolig: bool,
    /// Date of death.
    pub doedsdato: Option<NaiveDate>,
}

impl Person {
    /// Whether access to the person needs a special clearance.
    pub fn har_beskyttelsesbehov(&self) -> bool {
        self.fortrolig || self.strengt_fortrolig
    }
}

/// Cache of registry persons keyed by national identity number.
#[derive(Debug, Clone, Default)]
pub struct PersonCache {
    inner: Arc<RwLock<HashMap<String, Person>>>,
}

impl PersonCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cached person, if present.
    pub fn get(&self, foedselsnummer: &str) -> Option<Person> {
        self.inner.read().get(foedselsnummer).cloned()
    }

    /// A cached person, fetched from `register` and cached on a miss.
    pub fn get_or_fetch(
        &self,
        foedselsnummer: &str,
        register: &dyn PersonRegister,
    ) -> Result<Person, GatewayError> {
        if let Some(person) = self.get(foedselsnummer) {
            return Ok(person);
        }
        let person = register.hent_person(foedselsnummer)?;
        self.upsert(person.clone());
        Ok(person)
    }

    /// Insert or replace a person, e.g. from a registry change event.
    pub fn upsert(&self, person: Person) {
        self.inner.write().insert(person.foedselsnummer.clone(), person);
    }

    /// Drop one person.
    pub fn remove(&self, foedselsnummer: &str) -> Option<Person> {
        self.inner.write().remove(foedselsnummer)
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Number of cached persons.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A shielding period for an employee of the agency (egen ansatt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skjerming {
    /// Start of the period.
    pub skjermet_fra: DateTime<Utc>,
    /// End of the period; open-ended when `None`.
    pub skjermet_til: Option<DateTime<Utc>>,
}

impl Skjerming {
    /// Whether the period covers `at`.
    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        self.skjermet_fra <= at && self.skjermet_til.map_or(true, |til| at < til)
    }
}

/// Cache of shielded employees keyed by national identity number.
#[derive(Debug, Clone, Default)]
pub struct EgenAnsattCache {
    inner: Arc<RwLock<HashMap<String, Skjerming>>>,
}

impl EgenAnsattCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the person is a shielded employee at `at`.
    pub fn is_egen_ansatt(&self, foedselsnummer: &str, at: DateTime<Utc>) -> bool {
        self.inner
            .read()
            .get(foedselsnummer)
            .is_some_and(|s| s.is_active(at))
    }

    /// Insert or replace a shielding period from a change event.
    pub fn upsert(&self, foedselsnummer: impl Into<String>, skjerming: Skjerming) {
        self.inner.write().insert(foedselsnummer.into(), skjerming);
    }

    /// Drop entries whose period has ended before `at`. Returns the number
    /// removed.
    pub fn evict_expired(&self, at: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write();
        let before = guard.len();
        guard.retain(|_, s| s.skjermet_til.map_or(true, |til| til > at));
        before - guard.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
