//! # kabal-gateway — External Collaborators
//!
//! The case core never performs I/O. Everything outside it is reached
//! through the traits in [`collaborator`]:
//!
//! | Trait | Purpose |
//! |---|---|
//! | [`VirusScanner`] | scan uploaded content |
//! | [`PdfaValidator`] | validate rendered PDFs before archiving |
//! | [`Arkiv`] | submit documents to the journal/archive |
//! | [`Kvalitetsvurdering`] | hand finalized cases to quality review |
//! | [`SmartEditor`] | create, update and render smart documents |
//! | [`Mellomlager`] | temporary storage for uploaded bytes |
//! | [`EventPublisher`] | publish case change events |
//! | [`NotificationSink`] | deliver personal notifications |
//! | [`PersonRegister`] | look up persons on a cache miss |
//!
//! [`memory`] provides in-memory implementations for tests and the CLI.
//! [`cache`] holds the injectable person and egen-ansatt caches, and
//! [`retry`] the backoff policy the service applies to collaborator calls.

pub mod cache;
pub mod collaborator;
pub mod error;
pub mod memory;
pub mod retry;

pub use cache::{EgenAnsattCache, Person, PersonCache, Skjerming};
pub use collaborator::{
    Arkiv, ArkivDokument, ArkivKvittering, ArkivRequest, EventPublisher, Kvalitetsvurdering,
    Mellomlager, NotificationSink, PdfaValidator, PersonRegister, SmartEditor,
    SmartEditorDokument, VirusScanner,
};
pub use error::GatewayError;
pub use retry::RetryPolicy;
