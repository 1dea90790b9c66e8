//! # kabal-service — Orchestration
//!
//! Ties the case state machine and the document lifecycle to the external
//! collaborators:
//!
//! - [`store`]: thread-safe in-memory stores with clone-apply-commit
//!   updates.
//! - [`service`]: [`KabalService`], the entry point for every case and
//!   document operation. Publishes change events, delivers notifications,
//!   gates archiving on virus scanning and PDF/A validation, and hands
//!   finalized cases to quality review.
//! - [`config`]: [`KabalConfig`] loaded from the environment.
//! - [`telemetry`]: `tracing-subscriber` initialisation.
//!
//! ## Locking
//!
//! Operations touching both stores take the case store lock before the
//! document store lock, never the reverse.

pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::{ConfigError, KabalConfig};
pub use error::ServiceError;
pub use service::{Collaborators, KabalService, NyttOpplastetDokument, NyttSmartDokument};
pub use store::Store;
