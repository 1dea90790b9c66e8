//! # kabal-dokument — Documents Under Work
//!
//! Documents a case officer produces or collects while working a case,
//! before they are archived:
//!
//! - **Documents** ([`dokument`]): the [`DokumentUnderArbeid`] base record
//!   with its [`DokumentKind`] variant payload, main/attachment
//!   association, and the finish / unfinish / archive transitions.
//!
//! - **Archive gating** ([`archive`]): the [`ArchiveClearance`] computed by
//!   the service from virus scanning and PDF/A validation, and upload size
//!   limits.
//!
//! - **Comments** ([`kommentar`]): two-level comment threads on smart
//!   documents.
//!
//! Every transition validates its preconditions before mutating, so a
//! rejected call leaves the document unchanged.

pub mod archive;
pub mod dokument;
pub mod error;
pub mod kommentar;

pub use archive::{ArchiveClearance, UploadLimits};
pub use dokument::{
    CreatorRole, DokumentKind, DokumentType, DokumentUnderArbeid, JournalpostRef, NyttDokument,
};
pub use error::DokumentError;
pub use kommentar::{Kommentar, KommentarForfatter};
