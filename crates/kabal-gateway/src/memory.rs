//! # In-Memory Collaborators
//!
//! Deterministic implementations of every collaborator trait, used by tests
//! and the CLI. Collaborators that the service retries support failure
//! injection through `fail_next`, which makes the next `n` calls fail with
//! a transient [`GatewayError::Unavailable`].

use std::collections::HashMap;

use parking_lot::Mutex;

use kabal_behandling::{BehandlingEndretEvent, KvalitetsvurderingExport, Notification};

use crate::cache::Person;
use crate::collaborator::{
    Arkiv, ArkivKvittering, ArkivRequest, EventPublisher, Kvalitetsvurdering, Mellomlager,
    NotificationSink, PdfaValidator, PersonRegister, SmartEditor, SmartEditorDokument,
    VirusScanner,
};
use crate::error::GatewayError;

/// The EICAR anti-virus test signature.
pub const EICAR_SIGNATURE: &[u8] = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Marker the in-memory validator requires in a PDF/A document.
pub const PDFA_MARKER: &[u8] = b"pdfaid:part";

#[derive(Debug, Default)]
struct FailureInjector {
    remaining: Mutex<u32>,
}

impl FailureInjector {
    fn arm(&self, n: u32) {
        *self.remaining.lock() = n;
    }

    fn check(&self, service: &'static str) -> Result<(), GatewayError> {
        let mut remaining = self.remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(GatewayError::Unavailable {
                service,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

// ── Virus scanning and PDF/A ───────────────────────────────────────────

/// Flags content containing the EICAR test signature.
#[derive(Debug, Default)]
pub struct InMemoryVirusScanner;

impl VirusScanner for InMemoryVirusScanner {
    fn scan(&self, content: &[u8]) -> Result<bool, GatewayError> {
        Ok(!contains(content, EICAR_SIGNATURE))
    }
}

/// Accepts PDFs that carry a PDF/A identification marker.
#[derive(Debug, Default)]
pub struct InMemoryPdfaValidator;

impl PdfaValidator for InMemoryPdfaValidator {
    fn validate(&self, pdf: &[u8]) -> Result<Vec<String>, GatewayError> {
        let mut errors = Vec::new();
        if !pdf.starts_with(b"%PDF-") {
            errors.push("not a PDF document".to_string());
        }
        if !contains(pdf, PDFA_MARKER) {
            errors.push("missing PDF/A identification schema".to_string());
        }
        Ok(errors)
    }
}

// ── Archive and quality review ─────────────────────────────────────────

#[derive(Debug, Default)]
struct ArkivState {
    next: u64,
    submissions: Vec<ArkivRequest>,
}

/// Records submissions and issues sequential journal post ids.
#[derive(Debug, Default)]
pub struct InMemoryArkiv {
    state: Mutex<ArkivState>,
    failures: FailureInjector,
}

impl InMemoryArkiv {
    /// Create an empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions transiently.
    pub fn fail_next(&self, n: u32) {
        self.failures.arm(n);
    }

    /// Every accepted submission, oldest first.
    pub fn submissions(&self) -> Vec<ArkivRequest> {
        self.state.lock().submissions.clone()
    }
}

impl Arkiv for InMemoryArkiv {
    fn submit_for_archival(&self, request: &ArkivRequest) -> Result<ArkivKvittering, GatewayError> {
        self.failures.check("arkiv")?;
        if request.dokumenter.is_empty() {
            return Err(GatewayError::Rejected {
                service: "arkiv",
                reason: "no documents".to_string(),
            });
        }
        let mut state = self.state.lock();
        state.next += 1;
        let journalpost_id = format!("{}", 600_000 + state.next);
        let dokument_info_ids = (1..=request.dokumenter.len())
            .map(|i| format!("{journalpost_id}-{i}"))
            .collect();
        state.submissions.push(request.clone());
        Ok(ArkivKvittering {
            journalpost_id,
            dokument_info_ids,
        })
    }
}

/// Records quality-review exports.
#[derive(Debug, Default)]
pub struct InMemoryKvalitetsvurdering {
    exports: Mutex<Vec<KvalitetsvurderingExport>>,
    failures: FailureInjector,
}

impl InMemoryKvalitetsvurdering {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions transiently.
    pub fn fail_next(&self, n: u32) {
        self.failures.arm(n);
    }

    /// Every received export, oldest first.
    pub fn exports(&self) -> Vec<KvalitetsvurderingExport> {
        self.exports.lock().clone()
    }
}

impl Kvalitetsvurdering for InMemoryKvalitetsvurdering {
    fn submit(&self, export: &KvalitetsvurderingExport) -> Result<(), GatewayError> {
        self.failures.check("kvalitetsvurdering")?;
        self.exports.lock().push(export.clone());
        Ok(())
    }
}

// ── Smart editor and temporary storage ─────────────────────────────────

#[derive(Debug)]
struct SmartDoc {
    content: serde_json::Value,
    version: u32,
}

#[derive(Debug, Default)]
struct SmartEditorState {
    next: u64,
    documents: HashMap<String, SmartDoc>,
}

/// Keeps smart documents in memory and renders them as minimal PDF/A.
#[derive(Debug, Default)]
pub struct InMemorySmartEditor {
    state: Mutex<SmartEditorState>,
}

impl InMemorySmartEditor {
    /// Create an empty editor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the editor still holds `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().documents.contains_key(id)
    }
}

fn not_found(service: &'static str, key: &str) -> GatewayError {
    GatewayError::NotFound {
        service,
        key: key.to_string(),
    }
}

impl SmartEditor for InMemorySmartEditor {
    fn create_document(
        &self,
        template_id: &str,
        content: &serde_json::Value,
    ) -> Result<SmartEditorDokument, GatewayError> {
        if template_id.trim().is_empty() {
            return Err(GatewayError::Rejected {
                service: "smart-editor",
                reason: "template id is required".to_string(),
            });
        }
        let mut state = self.state.lock();
        state.next += 1;
        let id = format!("se-{}", state.next);
        state.documents.insert(
            id.clone(),
            SmartDoc {
                content: content.clone(),
                version: 1,
            },
        );
        Ok(SmartEditorDokument { id, version: 1 })
    }

    fn update_document(&self, id: &str, content: &serde_json::Value) -> Result<SmartEditorDokument, GatewayError> {
        let mut state = self.state.lock();
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| not_found("smart-editor", id))?;
        doc.content = content.clone();
        doc.version += 1;
        Ok(SmartEditorDokument {
            id: id.to_string(),
            version: doc.version,
        })
    }

    fn render_pdf(&self, id: &str) -> Result<Vec<u8>, GatewayError> {
        let state = self.state.lock();
        let doc = state
            .documents
            .get(id)
            .ok_or_else(|| not_found("smart-editor", id))?;
        let mut pdf = b"%PDF-1.7\n% pdfaid:part=2\n".to_vec();
        pdf.extend_from_slice(doc.content.to_string().as_bytes());
        Ok(pdf)
    }

    fn delete_document(&self, id: &str) -> Result<(), GatewayError> {
        self.state
            .lock()
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("smart-editor", id))
    }
}

#[derive(Debug, Default)]
struct MellomlagerState {
    next: u64,
    blobs: HashMap<String, Vec<u8>>,
}

/// Keeps uploaded bytes in memory.
#[derive(Debug, Default)]
pub struct InMemoryMellomlager {
    state: Mutex<MellomlagerState>,
    failures: FailureInjector,
}

impl InMemoryMellomlager {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls transiently.
    pub fn fail_next(&self, n: u32) {
        self.failures.arm(n);
    }

    /// Whether `id` is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().blobs.contains_key(id)
    }

    /// Number of stored blobs.
    pub fn stored(&self) -> usize {
        self.state.lock().blobs.len()
    }
}

impl Mellomlager for InMemoryMellomlager {
    fn upload(&self, content: &[u8]) -> Result<String, GatewayError> {
        self.failures.check("mellomlager")?;
        let mut state = self.state.lock();
        state.next += 1;
        let id = format!("ml-{}", state.next);
        state.blobs.insert(id.clone(), content.to_vec());
        Ok(id)
    }

    fn get(&self, id: &str) -> Result<Vec<u8>, GatewayError> {
        self.failures.check("mellomlager")?;
        self.state
            .lock()
            .blobs
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("mellomlager", id))
    }

    fn delete(&self, id: &str) -> Result<(), GatewayError> {
        self.failures.check("mellomlager")?;
        self.state
            .lock()
            .blobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found("mellomlager", id))
    }
}

// ── Events, notifications and registry ─────────────────────────────────

/// Records published events.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<BehandlingEndretEvent>>,
    failures: FailureInjector,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publishes transiently.
    pub fn fail_next(&self, n: u32) {
        self.failures.arm(n);
    }

    /// Every published event, oldest first.
    pub fn events(&self) -> Vec<BehandlingEndretEvent> {
        self.events.lock().clone()
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: &BehandlingEndretEvent) -> Result<(), GatewayError> {
        self.failures.check("event-publisher")?;
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Records delivered notifications.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotificationSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivered notification, oldest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

impl NotificationSink for RecordingNotificationSink {
    fn send(&self, notification: &Notification) -> Result<(), GatewayError> {
        self.notifications.lock().push(notification.clone());
        Ok(())
    }
}

/// A fixed person registry that counts lookups.
#[derive(Debug, Default)]
pub struct InMemoryPersonRegister {
    persons: Mutex<HashMap<String, Person>>,
    lookups: Mutex<u64>,
}

impl InMemoryPersonRegister {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a person.
    pub fn insert(&self, person: Person) {
        self.persons.lock().insert(person.foedselsnummer.clone(), person);
    }

    /// Number of lookups served.
    pub fn lookups(&self) -> u64 {
        *self.lookups.lock()
    }
}

impl PersonRegister for InMemoryPersonRegister {
    fn hent_person(&self, foedselsnummer: &str) -> Result<Person, GatewayError> {
        *self.lookups.lock() += 1;
        self.persons
            .lock()
            .get(foedselsnummer)
            .cloned()
            .ok_or_else(|| not_found("pdl", foedselsnummer))
    }
}
