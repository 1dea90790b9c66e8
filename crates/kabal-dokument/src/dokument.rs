//! # Documents Under Work
//!
//! A [`DokumentUnderArbeid`] is a shared base record plus a variant payload
//! ([`DokumentKind`]):
//!
//! - **Opplastet**: an uploaded file. Content lives in temporary storage
//!   (mellomlager); the record holds only the reference and size.
//! - **Smart**: authored in the smart editor. Carries the editor's id and
//!   version, and the document's comment threads.
//! - **JournalfoertVedlegg**: an already-archived document attached to a
//!   main document by reference.
//!
//! ## Lifecycle
//!
//! ```text
//! draft ──mark_finished──▶ markert_ferdig ──archive──▶ ferdigstilt
//!   ▲                          │
//!   └──────unmark_finished─────┘
//! ```
//!
//! `ferdigstilt` implies `markert_ferdig_tidspunkt`, except for journaled
//! attachments, which may be archived directly. Archiving further requires
//! an [`ArchiveClearance`] with no findings.
//!
//! A document with `parent_id == None` is a main document; every other
//! document is an attachment of a main document in the same case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::{BehandlingId, DokumentId, KommentarId, NavIdent};

use crate::archive::{ArchiveClearance, UploadLimits};
use crate::error::DokumentError;
use crate::kommentar::{self, Kommentar, KommentarForfatter};

// ── Classification ─────────────────────────────────────────────────────

/// What a document is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DokumentType {
    /// The decision letter.
    Vedtak,
    /// A letter to a party.
    Brev,
    /// An internal decision.
    Beslutning,
    /// An internal note.
    Notat,
    /// Any other outgoing document.
    Annet,
}

impl DokumentType {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vedtak => "VEDTAK",
            Self::Brev => "BREV",
            Self::Beslutning => "BESLUTNING",
            Self::Notat => "NOTAT",
            Self::Annet => "ANNET",
        }
    }
}

impl std::fmt::Display for DokumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role the creator held on the case when creating the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreatorRole {
    /// Assigned case officer.
    Saksbehandler,
    /// Co-signer.
    Medunderskriver,
    /// Medical advisor.
    Rol,
}

/// Variant payload of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DokumentKind {
    /// Uploaded file.
    Opplastet {
        /// Temporary storage reference. Required before finishing.
        mellomlager_id: Option<String>,
        /// Content size in bytes.
        size: u64,
    },
    /// Smart-editor document.
    Smart {
        /// Smart editor document id.
        smart_editor_id: String,
        /// Template the document was created from.
        template_id: String,
        /// Smart editor version.
        version: u32,
        /// Comment threads.
        #[serde(default)]
        kommentarer: Vec<Kommentar>,
    },
    /// Archived document attached by reference.
    JournalfoertVedlegg {
        /// Archive journal post.
        journalpost_id: String,
        /// Document within the journal post.
        dokument_info_id: String,
    },
}

impl DokumentKind {
    /// Short variant name for messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opplastet { .. } => "OPPLASTET",
            Self::Smart { .. } => "SMART",
            Self::JournalfoertVedlegg { .. } => "JOURNALFOERT_VEDLEGG",
        }
    }
}

/// A reference to the archive record produced for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalpostRef {
    /// Archive journal post.
    pub journalpost_id: String,
    /// Documents created within the journal post.
    pub dokument_info_ids: Vec<String>,
}

/// Common fields for creating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NyttDokument {
    /// Owning case.
    pub behandling_id: BehandlingId,
    /// Display name.
    pub name: String,
    /// Document type.
    pub dokument_type: DokumentType,
    /// Creator.
    pub creator_ident: NavIdent,
    /// Creator's role on the case.
    pub creator_role: CreatorRole,
}

// ── Document ───────────────────────────────────────────────────────────

/// A document under work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DokumentUnderArbeid {
    /// Identity.
    pub id: DokumentId,
    /// Owning case.
    pub behandling_id: BehandlingId,
    /// Display name.
    pub name: String,
    /// Document type.
    pub dokument_type: DokumentType,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    /// When the document was marked finished.
    pub markert_ferdig: Option<DateTime<Utc>>,
    /// Who marked it finished.
    pub markert_ferdig_by: Option<NavIdent>,
    /// When the document was archived.
    pub ferdigstilt: Option<DateTime<Utc>>,
    /// Creator.
    pub creator_ident: NavIdent,
    /// Creator's role on the case.
    pub creator_role: CreatorRole,
    /// The main document, or `None` for a main document.
    pub parent_id: Option<DokumentId>,
    /// Archive records produced for this document.
    pub journalposter: Vec<JournalpostRef>,
    /// Variant payload.
    pub kind: DokumentKind,
}

impl DokumentUnderArbeid {
    fn build(
        ny: NyttDokument,
        parent: Option<&DokumentUnderArbeid>,
        kind: DokumentKind,
    ) -> Result<Self, DokumentError> {
        if ny.name.trim().is_empty() {
            return Err(DokumentError::invalid("name", "must not be blank"));
        }
        if let Some(parent) = parent {
            parent.ensure_accepts_attachments(ny.behandling_id)?;
        }
        let now = Utc::now();
        Ok(Self {
            id: DokumentId::new(),
            behandling_id: ny.behandling_id,
            name: ny.name,
            dokument_type: ny.dokument_type,
            created: now,
            modified: now,
            markert_ferdig: None,
            markert_ferdig_by: None,
            ferdigstilt: None,
            creator_ident: ny.creator_ident,
            creator_role: ny.creator_role,
            parent_id: parent.map(|p| p.id),
            journalposter: Vec::new(),
            kind,
        })
    }

    /// Create an uploaded document. The bytes themselves are stored by the
    /// caller; only the storage reference is kept.
    ///
    /// # Errors
    ///
    /// Upload size violations from [`UploadLimits::check`], a blank name,
    /// or a parent that cannot take attachments.
    pub fn create_uploaded(
        ny: NyttDokument,
        size: u64,
        mellomlager_id: Option<String>,
        parent: Option<&DokumentUnderArbeid>,
        limits: &UploadLimits,
    ) -> Result<Self, DokumentError> {
        limits.check(size)?;
        Self::build(
            ny,
            parent,
            DokumentKind::Opplastet {
                mellomlager_id,
                size,
            },
        )
    }

    /// Create a smart-editor document from the id and version the smart
    /// editor returned.
    pub fn create_smart(
        ny: NyttDokument,
        smart_editor_id: String,
        template_id: String,
        version: u32,
        parent: Option<&DokumentUnderArbeid>,
    ) -> Result<Self, DokumentError> {
        if smart_editor_id.trim().is_empty() {
            return Err(DokumentError::invalid("smartEditorId", "must not be blank"));
        }
        Self::build(
            ny,
            parent,
            DokumentKind::Smart {
                smart_editor_id,
                template_id,
                version,
                kommentarer: Vec::new(),
            },
        )
    }

    /// Attach an archived document to `parent` by reference.
    ///
    /// `existing` is every document currently attached to `parent`.
    ///
    /// # Errors
    ///
    /// [`DokumentError::DuplicateAttachment`] when the same
    /// (parent, journalpost, dokumentInfo) triple already exists, plus the
    /// parent checks of the other constructors.
    pub fn attach_journaled(
        parent: &DokumentUnderArbeid,
        existing: &[DokumentUnderArbeid],
        journalpost_id: String,
        dokument_info_id: String,
        name: String,
        creator_ident: NavIdent,
        creator_role: CreatorRole,
    ) -> Result<Self, DokumentError> {
        if journalpost_id.trim().is_empty() || dokument_info_id.trim().is_empty() {
            return Err(DokumentError::invalid(
                "journalpost",
                "journalpostId and dokumentInfoId are required",
            ));
        }
        let duplicate = existing.iter().any(|d| {
            d.parent_id == Some(parent.id)
                && matches!(
                    &d.kind,
                    DokumentKind::JournalfoertVedlegg { journalpost_id: j, dokument_info_id: di }
                        if *j == journalpost_id && *di == dokument_info_id
                )
        });
        if duplicate {
            return Err(DokumentError::DuplicateAttachment {
                parent_id: parent.id,
                journalpost_id,
                dokument_info_id,
            });
        }
        Self::build(
            NyttDokument {
                behandling_id: parent.behandling_id,
                name,
                dokument_type: parent.dokument_type,
                creator_ident,
                creator_role,
            },
            Some(parent),
            DokumentKind::JournalfoertVedlegg {
                journalpost_id,
                dokument_info_id,
            },
        )
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Whether this is a main document.
    pub fn is_main(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Whether this is an archived document attached by reference.
    pub fn is_journaled(&self) -> bool {
        matches!(self.kind, DokumentKind::JournalfoertVedlegg { .. })
    }

    /// Whether the document is marked finished.
    pub fn is_marked_finished(&self) -> bool {
        self.markert_ferdig.is_some()
    }

    /// Whether the document is archived.
    pub fn is_archived(&self) -> bool {
        self.ferdigstilt.is_some()
    }

    /// The temporary storage reference of an uploaded document.
    pub fn mellomlager_id(&self) -> Option<&str> {
        match &self.kind {
            DokumentKind::Opplastet { mellomlager_id, .. } => mellomlager_id.as_deref(),
            _ => None,
        }
    }

    /// Comments on a smart document; empty for other variants.
    pub fn kommentarer(&self) -> &[Kommentar] {
        match &self.kind {
            DokumentKind::Smart { kommentarer, .. } => kommentarer,
            _ => &[],
        }
    }

    /// Check that this document can take a new or removed attachment for a
    /// document in `behandling_id`.
    ///
    /// # Errors
    ///
    /// [`DokumentError::InvalidParent`] for an attachment, a journaled
    /// document or a different case; [`DokumentError::ParentFinished`] once
    /// marked finished.
    pub fn ensure_accepts_attachments(&self, behandling_id: BehandlingId) -> Result<(), DokumentError> {
        let invalid = |reason: &str| DokumentError::InvalidParent {
            dokument_id: self.id,
            reason: reason.to_string(),
        };
        if !self.is_main() {
            return Err(invalid("it is itself an attachment"));
        }
        if self.is_journaled() {
            return Err(invalid("journaled documents cannot have attachments"));
        }
        if self.behandling_id != behandling_id {
            return Err(invalid("it belongs to another case"));
        }
        if self.is_marked_finished() || self.is_archived() {
            return Err(DokumentError::ParentFinished { parent_id: self.id });
        }
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Mark the document finished.
    ///
    /// # Errors
    ///
    /// [`DokumentError::AlreadyArchived`], [`DokumentError::AlreadyFinished`],
    /// or [`DokumentError::MissingMellomlager`] for an uploaded document
    /// without stored content.
    pub fn mark_finished(&mut self, actor: &NavIdent) -> Result<(), DokumentError> {
        self.ensure_draft()?;
        if matches!(
            self.kind,
            DokumentKind::Opplastet {
                mellomlager_id: None,
                ..
            }
        ) {
            return Err(DokumentError::MissingMellomlager {
                dokument_id: self.id,
            });
        }
        let now = Utc::now();
        self.markert_ferdig = Some(now);
        self.markert_ferdig_by = Some(actor.clone());
        self.modified = now;
        Ok(())
    }

    /// Withdraw the finished mark.
    ///
    /// # Errors
    ///
    /// [`DokumentError::AlreadyArchived`] once archived,
    /// [`DokumentError::NotFinished`] when not marked.
    pub fn unmark_finished(&mut self) -> Result<(), DokumentError> {
        if self.is_archived() {
            return Err(DokumentError::AlreadyArchived {
                dokument_id: self.id,
            });
        }
        if !self.is_marked_finished() {
            return Err(DokumentError::NotFinished {
                dokument_id: self.id,
            });
        }
        self.markert_ferdig = None;
        self.markert_ferdig_by = None;
        self.modified = Utc::now();
        Ok(())
    }

    /// Record that the document was archived.
    ///
    /// # Errors
    ///
    /// - [`DokumentError::AlreadyArchived`] when archived before.
    /// - [`DokumentError::NotFinished`] unless marked finished; journaled
    ///   attachments are exempt.
    /// - [`DokumentError::VirusInfected`] / [`DokumentError::PdfaInvalid`]
    ///   from `clearance`.
    /// - [`DokumentError::Invalid`] for a blank journal post or no
    ///   document ids.
    pub fn archive(
        &mut self,
        journalpost_id: String,
        dokument_info_ids: Vec<String>,
        clearance: &ArchiveClearance,
    ) -> Result<(), DokumentError> {
        self.check_archivable(clearance)?;
        if journalpost_id.trim().is_empty() || dokument_info_ids.is_empty() {
            return Err(DokumentError::invalid(
                "journalpost",
                "journalpostId and at least one dokumentInfoId are required",
            ));
        }
        let now = Utc::now();
        self.journalposter.push(JournalpostRef {
            journalpost_id,
            dokument_info_ids,
        });
        self.ferdigstilt = Some(now);
        self.modified = now;
        Ok(())
    }

    /// Check every archive precondition except the archive references, so
    /// a caller can validate before submitting to the archive.
    pub fn check_archivable(&self, clearance: &ArchiveClearance) -> Result<(), DokumentError> {
        if self.is_archived() {
            return Err(DokumentError::AlreadyArchived {
                dokument_id: self.id,
            });
        }
        if !self.is_marked_finished() && !self.is_journaled() {
            return Err(DokumentError::NotFinished {
                dokument_id: self.id,
            });
        }
        clearance.check(self.id)
    }

    // ── Editing ─────────────────────────────────────────────────────

    /// Rename the document.
    pub fn rename(&mut self, name: String) -> Result<(), DokumentError> {
        self.ensure_draft()?;
        if name.trim().is_empty() {
            return Err(DokumentError::invalid("name", "must not be blank"));
        }
        self.name = name;
        self.modified = Utc::now();
        Ok(())
    }

    /// Change the document type. Attachments follow their main document's
    /// type and cannot be changed directly.
    pub fn set_dokument_type(&mut self, dokument_type: DokumentType) -> Result<(), DokumentError> {
        self.ensure_draft()?;
        if !self.is_main() {
            return Err(DokumentError::invalid(
                "dokumentType",
                "attachments inherit the type of their main document",
            ));
        }
        self.dokument_type = dokument_type;
        self.modified = Utc::now();
        Ok(())
    }

    /// Record a new smart-editor version.
    ///
    /// # Errors
    ///
    /// [`DokumentError::WrongVariant`] for non-smart documents;
    /// [`DokumentError::Invalid`] when the version does not increase.
    pub fn update_smart_content(&mut self, new_version: u32) -> Result<(), DokumentError> {
        self.ensure_draft()?;
        let id = self.id;
        let DokumentKind::Smart { version, .. } = &mut self.kind else {
            return Err(DokumentError::WrongVariant {
                dokument_id: id,
                operation: "updateSmartContent",
                expected: "SMART",
            });
        };
        if new_version <= *version {
            return Err(DokumentError::invalid(
                "version",
                format!("{new_version} is not newer than {version}"),
            ));
        }
        *version = new_version;
        self.modified = Utc::now();
        Ok(())
    }

    /// Check that the document may be deleted.
    pub fn ensure_deletable(&self) -> Result<(), DokumentError> {
        self.ensure_draft()
    }

    fn ensure_draft(&self) -> Result<(), DokumentError> {
        if self.is_archived() {
            return Err(DokumentError::AlreadyArchived {
                dokument_id: self.id,
            });
        }
        if self.is_marked_finished() {
            return Err(DokumentError::AlreadyFinished {
                dokument_id: self.id,
            });
        }
        Ok(())
    }

    // ── Comments ────────────────────────────────────────────────────

    fn kommentarer_mut(&mut self, operation: &'static str) -> Result<&mut Vec<Kommentar>, DokumentError> {
        let id = self.id;
        match &mut self.kind {
            DokumentKind::Smart { kommentarer, .. } => Ok(kommentarer),
            _ => Err(DokumentError::WrongVariant {
                dokument_id: id,
                operation,
                expected: "SMART",
            }),
        }
    }

    /// Start a new comment thread.
    pub fn add_comment(
        &mut self,
        author: KommentarForfatter,
        text: String,
    ) -> Result<KommentarId, DokumentError> {
        let kommentarer = self.kommentarer_mut("addComment")?;
        kommentar::add(kommentarer, None, author, text)
    }

    /// Reply within the thread containing `parent_id`.
    pub fn reply(
        &mut self,
        parent_id: KommentarId,
        author: KommentarForfatter,
        text: String,
    ) -> Result<KommentarId, DokumentError> {
        let kommentarer = self.kommentarer_mut("reply")?;
        kommentar::add(kommentarer, Some(parent_id), author, text)
    }

    /// Edit a comment. Only the author may edit.
    pub fn edit_comment(
        &mut self,
        kommentar_id: KommentarId,
        ident: &NavIdent,
        text: String,
    ) -> Result<(), DokumentError> {
        let kommentarer = self.kommentarer_mut("editComment")?;
        kommentar::edit(kommentarer, kommentar_id, ident, text)
    }

    /// Delete a comment, or a whole thread when `kommentar_id` is a root.
    /// Only the author may delete. Returns the number of comments removed.
    pub fn delete_comment(
        &mut self,
        kommentar_id: KommentarId,
        ident: &NavIdent,
    ) -> Result<usize, DokumentError> {
        let kommentarer = self.kommentarer_mut("deleteComment")?;
        kommentar::delete(kommentarer, kommentar_id, ident)
    }
}
