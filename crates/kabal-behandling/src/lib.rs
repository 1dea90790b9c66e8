//! # kabal-behandling — Case State Machine
//!
//! Manages the life of an appeal case from intake to finalization:
//!
//! - **Behandling** ([`behandling`]): the case aggregate and every
//!   state-affecting operation — assignment, co-signer and medical-advisor
//!   hand-offs, holds, finalization and void registration.
//!
//! - **Status** ([`status`]): the single current [`Status`] of a case,
//!   derived on demand and never stored.
//!
//! - **Hold** ([`vent`]): hold windows, hold reasons and the append-only
//!   hold history.
//!
//! - **Intake** ([`mottak`]): mapping an inbound [`Mottak`] to a new case,
//!   including deadline derivation.
//!
//! - **Events** ([`event`]): the [`BehandlingEndretEvent`] emitted by every
//!   state-affecting mutation.
//!
//! - **Projection** ([`projection`]): notifications derived from events,
//!   and the finalize-time export for the quality-review board.

pub mod behandling;
pub mod error;
pub mod event;
pub mod mottak;
pub mod projection;
pub mod rules;
pub mod status;
pub mod vent;

// Re-export primary types for ergonomic imports.

// Error types
pub use error::BehandlingError;

// Aggregate
pub use behandling::{
    Behandling, BehandlingType, Feilregistrering, Ferdigstilling, Saksdokument, SourceKey, Utfall,
};

// Status
pub use status::{derive_status, Status};

// Hold
pub use vent::{SattPaaVent, SattPaaVentHistorikk, SattPaaVentReason};

// Intake
pub use mottak::{create_behandling_from_mottak, Mottak, MottakDokument, MottakDokumentType};

// Events and projections
pub use event::{BehandlingEndretEvent, Endringsinnslag, Felt};
pub use projection::{notifications_for, KvalitetsvurderingExport, Notification, NotificationType};

// Rules
pub use rules::FinalizeRules;
