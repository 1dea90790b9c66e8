//! # Collaborator Interfaces
//!
//! Object-safe traits for every external system the service talks to.
//! Implementations must be `Send + Sync` so they can be shared behind an
//! `Arc` by the service and its stores.

use serde::{Deserialize, Serialize};

use kabal_behandling::{BehandlingEndretEvent, KvalitetsvurderingExport, Notification};
use kabal_core::{BehandlingId, DokumentId};

use crate::cache::Person;
use crate::error::GatewayError;

/// Virus scanning of uploaded content.
pub trait VirusScanner: Send + Sync {
    /// Returns `true` when the content is clean.
    fn scan(&self, content: &[u8]) -> Result<bool, GatewayError>;
}

/// PDF/A validation of rendered documents.
pub trait PdfaValidator: Send + Sync {
    /// Returns the validation errors; empty when the PDF is valid PDF/A.
    fn validate(&self, pdf: &[u8]) -> Result<Vec<String>, GatewayError>;
}

/// One document in an archive submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArkivDokument {
    /// The document under work.
    pub dokument_id: DokumentId,
    /// Title in the archive.
    pub tittel: String,
    /// Rendered content.
    pub content: Vec<u8>,
}

/// An archive submission: one main document followed by its attachments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArkivRequest {
    /// Owning case.
    pub behandling_id: BehandlingId,
    /// Originating system of the case.
    pub fagsystem: String,
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Main document first, then attachments.
    pub dokumenter: Vec<ArkivDokument>,
}

/// Archive receipt. `dokument_info_ids` follows the order of
/// [`ArkivRequest::dokumenter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArkivKvittering {
    /// The journal post created.
    pub journalpost_id: String,
    /// One id per submitted document.
    pub dokument_info_ids: Vec<String>,
}

/// The journal/archive system.
pub trait Arkiv: Send + Sync {
    /// Submit documents for archival.
    fn submit_for_archival(&self, request: &ArkivRequest) -> Result<ArkivKvittering, GatewayError>;
}

/// The quality-review board.
pub trait Kvalitetsvurdering: Send + Sync {
    /// Hand over a finalized case.
    fn submit(&self, export: &KvalitetsvurderingExport) -> Result<(), GatewayError>;
}

/// A document as known by the smart editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartEditorDokument {
    /// Smart editor document id.
    pub id: String,
    /// Current version.
    pub version: u32,
}

/// The smart editor.
pub trait SmartEditor: Send + Sync {
    /// Create a document from a template with initial content.
    fn create_document(
        &self,
        template_id: &str,
        content: &serde_json::Value,
    ) -> Result<SmartEditorDokument, GatewayError>;

    /// Store new content, returning the new version.
    fn update_document(&self, id: &str, content: &serde_json::Value) -> Result<SmartEditorDokument, GatewayError>;

    /// Render the current content as PDF.
    fn render_pdf(&self, id: &str) -> Result<Vec<u8>, GatewayError>;

    /// Delete the document.
    fn delete_document(&self, id: &str) -> Result<(), GatewayError>;
}

/// Temporary storage for uploaded bytes.
pub trait Mellomlager: Send + Sync {
    /// Store bytes, returning the storage reference.
    fn upload(&self, content: &[u8]) -> Result<String, GatewayError>;

    /// Fetch stored bytes.
    fn get(&self, id: &str) -> Result<Vec<u8>, GatewayError>;

    /// Remove stored bytes.
    fn delete(&self, id: &str) -> Result<(), GatewayError>;
}

/// Outbound case change events.
pub trait EventPublisher: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: &BehandlingEndretEvent) -> Result<(), GatewayError>;
}

/// Delivery of personal notifications.
pub trait NotificationSink: Send + Sync {
    /// Deliver one notification.
    fn send(&self, notification: &Notification) -> Result<(), GatewayError>;
}

/// The person registry, consulted on a cache miss.
pub trait PersonRegister: Send + Sync {
    /// Look up a person by national identity number.
    fn hent_person(&self, foedselsnummer: &str) -> Result<Person, GatewayError>;
}
