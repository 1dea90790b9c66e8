//! Document error types.

use kabal_core::{DokumentId, ErrorKind, KommentarId, NavIdent, ValidationError};
use thiserror::Error;

/// Errors arising from document operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DokumentError {
    /// An upload with no content.
    #[error("attachment rejected: {code}")]
    AttachmentIsEmpty {
        /// Machine-readable rejection code, `EMPTY`.
        code: &'static str,
    },

    /// An upload above the configured size threshold.
    #[error("attachment rejected: {code} ({size} bytes, max {max})")]
    AttachmentTooLarge {
        /// Machine-readable rejection code, `TOO_LARGE`.
        code: &'static str,
        /// Size of the upload.
        size: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The document is already marked finished.
    #[error("dokument {dokument_id} is already marked finished")]
    AlreadyFinished {
        /// The document.
        dokument_id: DokumentId,
    },

    /// The document is already archived.
    #[error("dokument {dokument_id} is already archived")]
    AlreadyArchived {
        /// The document.
        dokument_id: DokumentId,
    },

    /// The document must be marked finished first.
    #[error("dokument {dokument_id} is not marked finished")]
    NotFinished {
        /// The document.
        dokument_id: DokumentId,
    },

    /// An uploaded document has no stored content reference.
    #[error("dokument {dokument_id} has no stored content")]
    MissingMellomlager {
        /// The document.
        dokument_id: DokumentId,
    },

    /// The same archived document is already attached to the parent.
    #[error("journalpost {journalpost_id}/{dokument_info_id} is already attached to {parent_id}")]
    DuplicateAttachment {
        /// The main document.
        parent_id: DokumentId,
        /// Archive journal post.
        journalpost_id: String,
        /// Document within the journal post.
        dokument_info_id: String,
    },

    /// The intended parent cannot take attachments.
    #[error("dokument {dokument_id} cannot be a parent: {reason}")]
    InvalidParent {
        /// The intended parent.
        dokument_id: DokumentId,
        /// Why it is rejected.
        reason: String,
    },

    /// The parent is finished, so its attachment set is frozen.
    #[error("parent dokument {parent_id} is finished; attachments cannot change")]
    ParentFinished {
        /// The main document.
        parent_id: DokumentId,
    },

    /// Virus scanning flagged the content.
    #[error("dokument {dokument_id} failed virus scanning")]
    VirusInfected {
        /// The document.
        dokument_id: DokumentId,
    },

    /// PDF/A validation reported errors.
    #[error("dokument {dokument_id} is not valid PDF/A: {}", errors.join("; "))]
    PdfaInvalid {
        /// The document.
        dokument_id: DokumentId,
        /// Validator messages.
        errors: Vec<String>,
    },

    /// The operation does not apply to this document variant.
    #[error("{operation} requires a {expected} document, {dokument_id} is not one")]
    WrongVariant {
        /// The document.
        dokument_id: DokumentId,
        /// The attempted operation.
        operation: &'static str,
        /// The variant the operation requires.
        expected: &'static str,
    },

    /// The comment does not exist on this document.
    #[error("kommentar {kommentar_id} not found")]
    KommentarNotFound {
        /// The comment.
        kommentar_id: KommentarId,
    },

    /// Only the author may change a comment.
    #[error("{ident} is not the author of kommentar {kommentar_id}")]
    NotKommentarAuthor {
        /// The comment.
        kommentar_id: KommentarId,
        /// Who attempted the change.
        ident: NavIdent,
    },

    /// Input failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A domain primitive failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl DokumentError {
    /// Machine-readable code for upload rejections.
    pub const EMPTY: &'static str = "EMPTY";
    /// Machine-readable code for oversize uploads.
    pub const TOO_LARGE: &'static str = "TOO_LARGE";

    /// The error-kind category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AttachmentIsEmpty { .. }
            | Self::AttachmentTooLarge { .. }
            | Self::Invalid { .. }
            | Self::Validation(_) => ErrorKind::Validation,
            Self::KommentarNotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyFinished { .. }
            | Self::AlreadyArchived { .. }
            | Self::NotFinished { .. }
            | Self::MissingMellomlager { .. }
            | Self::DuplicateAttachment { .. }
            | Self::InvalidParent { .. }
            | Self::ParentFinished { .. }
            | Self::VirusInfected { .. }
            | Self::PdfaInvalid { .. }
            | Self::WrongVariant { .. }
            | Self::NotKommentarAuthor { .. } => ErrorKind::StateConflict,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
