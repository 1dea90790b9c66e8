#![deny(missing_docs)]

//! # kabal-core — Foundational Types for the Appeals Case Core
//!
//! Every other crate in the workspace depends on this one. It has no
//! internal dependencies — only `serde`, `thiserror`,
//! `chrono` and `uuid` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`BehandlingId`] cannot be
//!    passed where a [`DokumentId`] is expected, and a [`NavIdent`] is
//!    validated once, at construction.
//!
//! 2. **Parties are values.** [`PartId`], [`Klager`], [`SakenGjelder`] and
//!    [`Prosessfullmektig`] are owned by the case that embeds them and carry
//!    no identity of their own.
//!
//! 3. **One error-kind taxonomy.** Every subsystem error maps onto
//!    [`ErrorKind`] so the transport layer can decide on a status code
//!    without matching on crate-specific variants.

pub mod assignment;
pub mod error;
pub mod identity;
pub mod party;

// Re-export primary types at crate root for ergonomic imports.
pub use assignment::{
    FlowState, MedunderskriverHistorikk, MedunderskriverTildeling, RolTildeling, Tildeling,
    TildelingHistorikk,
};
pub use error::{ErrorKind, ValidationError};
pub use identity::{BehandlingId, DokumentId, KommentarId, MottakId, NavIdent};
pub use party::{Klager, PartId, PartIdType, Prosessfullmektig, SakenGjelder};
