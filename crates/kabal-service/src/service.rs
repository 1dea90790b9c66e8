//! # Case and Document Orchestration
//!
//! [`KabalService`] owns the two stores and the collaborators. Case
//! transitions run inside [`Store::try_update`], so a rejected transition
//! never leaves a partial change. Every non-empty change event is
//! published and turned into personal notifications after the store lock
//! is released.
//!
//! Collaborator calls are retried with the configured [`RetryPolicy`]
//! and never happen while a store lock is held. Operations that need a
//! collaborator verdict (upload, smart document creation, archiving)
//! validate first, call out, then re-check under the lock before
//! committing.
//!
//! Events that cannot be published after retries stay in an outbox and
//! are retried, in order, before the next event or by
//! [`KabalService::flush_outbox`].
//!
//! [`RetryPolicy`]: kabal_gateway::RetryPolicy

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use kabal_behandling::{
    create_behandling_from_mottak, notifications_for, Behandling, BehandlingEndretEvent,
    BehandlingError, KvalitetsvurderingExport, Mottak, SourceKey, Status, Utfall,
};
use kabal_core::{
    BehandlingId, DokumentId, KommentarId, NavIdent, PartIdType, Prosessfullmektig,
};
use kabal_dokument::{
    ArchiveClearance, CreatorRole, DokumentError, DokumentKind, DokumentType,
    DokumentUnderArbeid, Kommentar, KommentarForfatter, NyttDokument,
};
use kabal_gateway::memory::{
    InMemoryArkiv, InMemoryKvalitetsvurdering, InMemoryMellomlager, InMemoryPdfaValidator,
    InMemoryPersonRegister, InMemorySmartEditor, InMemoryVirusScanner, RecordingEventPublisher,
    RecordingNotificationSink,
};
use kabal_gateway::{
    Arkiv, ArkivDokument, ArkivRequest, EgenAnsattCache, EventPublisher, GatewayError,
    Kvalitetsvurdering, Mellomlager, NotificationSink, PdfaValidator, Person, PersonCache,
    PersonRegister, SmartEditor, VirusScanner,
};

use crate::config::KabalConfig;
use crate::error::ServiceError;
use crate::store::Store;

/// The external systems the service talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Virus scanning.
    pub virus_scanner: Arc<dyn VirusScanner>,
    /// PDF/A validation.
    pub pdfa_validator: Arc<dyn PdfaValidator>,
    /// Journal/archive.
    pub arkiv: Arc<dyn Arkiv>,
    /// Quality review.
    pub kvalitetsvurdering: Arc<dyn Kvalitetsvurdering>,
    /// Smart editor.
    pub smart_editor: Arc<dyn SmartEditor>,
    /// Temporary storage for uploads.
    pub mellomlager: Arc<dyn Mellomlager>,
    /// Case change events.
    pub event_publisher: Arc<dyn EventPublisher>,
    /// Personal notifications.
    pub notification_sink: Arc<dyn NotificationSink>,
    /// Person registry.
    pub person_register: Arc<dyn PersonRegister>,
}

impl Collaborators {
    /// Fresh in-memory collaborators.
    pub fn in_memory() -> Self {
        Self {
            virus_scanner: Arc::new(InMemoryVirusScanner),
            pdfa_validator: Arc::new(InMemoryPdfaValidator),
            arkiv: Arc::new(InMemoryArkiv::new()),
            kvalitetsvurdering: Arc::new(InMemoryKvalitetsvurdering::new()),
            smart_editor: Arc::new(InMemorySmartEditor::new()),
            mellomlager: Arc::new(InMemoryMellomlager::new()),
            event_publisher: Arc::new(RecordingEventPublisher::new()),
            notification_sink: Arc::new(RecordingNotificationSink::new()),
            person_register: Arc::new(InMemoryPersonRegister::new()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// An upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NyttOpplastetDokument {
    /// Common document fields.
    pub dokument: NyttDokument,
    /// Main document to attach to, if any.
    pub parent_id: Option<DokumentId>,
    /// File content.
    pub content: Vec<u8>,
}

/// A smart document request.
#[derive(Debug, Clone, PartialEq)]
pub struct NyttSmartDokument {
    /// Common document fields.
    pub dokument: NyttDokument,
    /// Main document to attach to, if any.
    pub parent_id: Option<DokumentId>,
    /// Smart editor template.
    pub template_id: String,
    /// Initial content.
    pub content: serde_json::Value,
}

/// The appeals case service.
#[derive(Debug)]
pub struct KabalService {
    behandlinger: Store<BehandlingId, Behandling>,
    dokumenter: Store<DokumentId, DokumentUnderArbeid>,
    collaborators: Collaborators,
    person_cache: PersonCache,
    egen_ansatt_cache: EgenAnsattCache,
    config: KabalConfig,
    outbox: Mutex<VecDeque<BehandlingEndretEvent>>,
}

type BehandlingMap = HashMap<BehandlingId, Behandling>;

fn open_case(behandlinger: &BehandlingMap, id: BehandlingId) -> Result<&Behandling, ServiceError> {
    let behandling = behandlinger
        .get(&id)
        .ok_or(ServiceError::BehandlingNotFound(id))?;
    behandling.ensure_open()?;
    Ok(behandling)
}

impl KabalService {
    /// Create a service with empty stores and caches.
    pub fn new(config: KabalConfig, collaborators: Collaborators) -> Self {
        Self::with_caches(config, collaborators, PersonCache::new(), EgenAnsattCache::new())
    }

    /// Create a service sharing externally owned caches.
    pub fn with_caches(
        config: KabalConfig,
        collaborators: Collaborators,
        person_cache: PersonCache,
        egen_ansatt_cache: EgenAnsattCache,
    ) -> Self {
        Self {
            behandlinger: Store::new(),
            dokumenter: Store::new(),
            collaborators,
            person_cache,
            egen_ansatt_cache,
            config,
            outbox: Mutex::new(VecDeque::new()),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &KabalConfig {
        &self.config
    }

    /// The person cache, for event-driven upserts and manual clearing.
    pub fn person_cache(&self) -> &PersonCache {
        &self.person_cache
    }

    /// The egen-ansatt cache, for event-driven upserts and manual clearing.
    pub fn egen_ansatt_cache(&self) -> &EgenAnsattCache {
        &self.egen_ansatt_cache
    }

    // ── Events ──────────────────────────────────────────────────────

    fn dispatch(&self, event: &BehandlingEndretEvent) {
        if event.is_empty() {
            return;
        }
        for notification in notifications_for(event) {
            if let Err(e) = self.collaborators.notification_sink.send(&notification) {
                tracing::warn!(
                    behandling_id = %notification.behandling_id,
                    mottaker = %notification.mottaker,
                    error = %e,
                    "notification not delivered"
                );
            }
        }
        // Held through publish retries, backoff included: a concurrent
        // dispatch must not overtake an older event still being retried.
        let mut outbox = self.outbox.lock();
        outbox.push_back(event.clone());
        self.drain(&mut outbox);
    }

    /// Publish from the front until the outbox is empty or a publish fails.
    /// The caller holds the outbox lock for the whole call.
    fn drain(&self, outbox: &mut VecDeque<BehandlingEndretEvent>) -> usize {
        while let Some(event) = outbox.front() {
            let published = self.config.retry.run("publishEvent", || {
                self.collaborators.event_publisher.publish(event)
            });
            match published {
                Ok(()) => {
                    outbox.pop_front();
                }
                Err(e) => {
                    tracing::warn!(
                        behandling_id = %event.behandling.id,
                        version = event.behandling.version,
                        pending = outbox.len(),
                        error = %e,
                        "event not published, kept in outbox"
                    );
                    break;
                }
            }
        }
        outbox.len()
    }

    /// Retry publishing held-back events. Returns the number still pending.
    pub fn flush_outbox(&self) -> usize {
        let mut outbox = self.outbox.lock();
        self.drain(&mut outbox)
    }

    /// Number of events waiting to be published.
    pub fn pending_events(&self) -> usize {
        self.outbox.lock().len()
    }

    // ── Cases ───────────────────────────────────────────────────────

    /// Create a case from an intake.
    ///
    /// # Errors
    ///
    /// Intake validation errors, or [`ServiceError::DuplicateSource`] when
    /// a case with the same source key exists.
    pub fn create_behandling_from_mottak(&self, mottak: &Mottak) -> Result<Behandling, ServiceError> {
        let (behandling, event) = create_behandling_from_mottak(mottak)?;
        let key = behandling.source_key();
        {
            let mut behandlinger = self.behandlinger.write();
            if let Some(existing) = behandlinger.values().find(|b| b.source_key() == key) {
                return Err(ServiceError::DuplicateSource {
                    key,
                    existing: existing.id,
                });
            }
            behandlinger.insert(behandling.id, behandling.clone());
        }
        tracing::info!(
            behandling_id = %behandling.id,
            behandling_type = %behandling.behandling_type,
            fagsystem = %behandling.fagsystem,
            frist = %behandling.frist,
            "behandling created"
        );
        self.dispatch(&event);
        Ok(behandling)
    }

    /// A case by id.
    pub fn behandling(&self, id: BehandlingId) -> Result<Behandling, ServiceError> {
        self.behandlinger
            .get(&id)
            .ok_or(ServiceError::BehandlingNotFound(id))
    }

    /// The derived status of a case.
    pub fn status(&self, id: BehandlingId) -> Result<Status, ServiceError> {
        Ok(self.behandling(id)?.status())
    }

    /// The case created for a source key, if any.
    pub fn find_by_source(&self, key: &SourceKey) -> Option<Behandling> {
        self.behandlinger
            .read()
            .values()
            .find(|b| &b.source_key() == key)
            .cloned()
    }

    /// Open cases assigned to `saksbehandler`, oldest deadline first.
    pub fn behandlinger_for_saksbehandler(&self, saksbehandler: &NavIdent) -> Vec<Behandling> {
        let mut out = self
            .behandlinger
            .filter(|b| !b.is_terminal() && b.saksbehandler() == Some(saksbehandler));
        out.sort_by_key(|b| (b.frist, b.created));
        out
    }

    fn update_behandling(
        &self,
        id: BehandlingId,
        operation: &'static str,
        f: impl FnOnce(&mut Behandling) -> Result<BehandlingEndretEvent, BehandlingError>,
    ) -> Result<Behandling, ServiceError> {
        let event = self
            .behandlinger
            .try_update(&id, f)
            .ok_or(ServiceError::BehandlingNotFound(id))?
            .map_err(|e| {
                tracing::debug!(behandling_id = %id, operation, error = %e, "transition rejected");
                e
            })?;
        if !event.is_empty() {
            tracing::info!(
                behandling_id = %id,
                operation,
                version = event.behandling.version,
                status = %event.behandling.status(),
                "behandling updated"
            );
        }
        self.dispatch(&event);
        Ok(event.behandling)
    }

    /// Assign or unassign the case officer.
    pub fn assign(
        &self,
        id: BehandlingId,
        saksbehandlerident: Option<NavIdent>,
        enhet: Option<String>,
        expected_version: Option<u64>,
        utfoerende_ident: Option<&NavIdent>,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "assign", |b| {
            b.assign(saksbehandlerident, enhet, expected_version, utfoerende_ident)
        })
    }

    /// Choose or clear the co-signer.
    pub fn route_to_co_signer(
        &self,
        id: BehandlingId,
        ident: Option<NavIdent>,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "routeToCoSigner", |b| {
            b.route_to_co_signer(ident, expected_version, utfoerende_ident)
        })
    }

    /// Hand the case to the co-signer.
    pub fn send_to_co_signer(
        &self,
        id: BehandlingId,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "sendToCoSigner", |b| {
            b.send_to_co_signer(expected_version, utfoerende_ident)
        })
    }

    /// Hand the case back from the co-signer.
    pub fn return_from_co_signer(
        &self,
        id: BehandlingId,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "returnFromCoSigner", |b| {
            b.return_from_co_signer(expected_version, utfoerende_ident)
        })
    }

    /// Name or clear the medical advisor.
    pub fn set_rol(
        &self,
        id: BehandlingId,
        ident: Option<NavIdent>,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "setRol", |b| {
            b.set_rol(ident, expected_version, utfoerende_ident)
        })
    }

    /// Hand the case to the medical advisor.
    pub fn send_to_rol(
        &self,
        id: BehandlingId,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "sendToRol", |b| b.send_to_rol(expected_version, utfoerende_ident))
    }

    /// Hand the case back from the medical advisor.
    pub fn return_from_rol(
        &self,
        id: BehandlingId,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "returnFromRol", |b| {
            b.return_from_rol(expected_version, utfoerende_ident)
        })
    }

    /// Put the case on hold.
    pub fn put_on_hold(
        &self,
        id: BehandlingId,
        from: NaiveDate,
        to: NaiveDate,
        reason_id: &str,
        reason: Option<String>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "putOnHold", |b| {
            b.put_on_hold(from, to, reason_id, reason, utfoerende_ident)
        })
    }

    /// Take the case off hold.
    pub fn take_off_hold(
        &self,
        id: BehandlingId,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "takeOffHold", |b| b.take_off_hold(utfoerende_ident))
    }

    /// Set or clear the outcome.
    pub fn set_utfall(
        &self,
        id: BehandlingId,
        utfall: Option<Utfall>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "setUtfall", |b| b.set_utfall(utfall, utfoerende_ident))
    }

    /// Replace the registered legal bases.
    pub fn set_registreringshjemler(
        &self,
        id: BehandlingId,
        hjemler: impl IntoIterator<Item = String>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        let hjemler = hjemler.into_iter().collect();
        self.update_behandling(id, "setRegistreringshjemler", |b| {
            b.set_registreringshjemler(hjemler, utfoerende_ident)
        })
    }

    /// Move the deadline.
    pub fn set_frist(
        &self,
        id: BehandlingId,
        frist: NaiveDate,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "setFrist", |b| b.set_frist(frist, utfoerende_ident))
    }

    /// Correct the date the appeals body received the case.
    pub fn set_mottatt_klageinstans(
        &self,
        id: BehandlingId,
        mottatt: chrono::DateTime<Utc>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "setMottattKlageinstans", |b| {
            b.set_mottatt_klageinstans(mottatt, utfoerende_ident)
        })
    }

    /// Set or clear the legal representative.
    pub fn set_prosessfullmektig(
        &self,
        id: BehandlingId,
        prosessfullmektig: Option<Prosessfullmektig>,
        utfoerende_ident: &NavIdent,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "setProsessfullmektig", |b| {
            b.set_prosessfullmektig(prosessfullmektig, utfoerende_ident)
        })
    }

    /// Register the case as void.
    pub fn feilregistrer(
        &self,
        id: BehandlingId,
        reason: &str,
        nav_ident: NavIdent,
        fagsystem: &str,
    ) -> Result<Behandling, ServiceError> {
        self.update_behandling(id, "feilregistrer", |b| {
            b.feilregistrer(reason, nav_ident, fagsystem)
        })
    }

    /// Finalize the case and hand it to quality review.
    ///
    /// The case is finalized even if quality review cannot be reached; the
    /// hand-over is then logged and can be repeated with
    /// [`retry_avslutning`](Self::retry_avslutning).
    ///
    /// # Errors
    ///
    /// [`ServiceError::UnfinishedDocuments`] while any document of the case
    /// is not archived, otherwise the case's finalize rules.
    pub fn finalize(
        &self,
        id: BehandlingId,
        nav_ident: NavIdent,
        navn: &str,
    ) -> Result<Behandling, ServiceError> {
        let event = {
            let mut behandlinger = self.behandlinger.write();
            let mut draft = behandlinger
                .get(&id)
                .cloned()
                .ok_or(ServiceError::BehandlingNotFound(id))?;
            let mut unfinished: Vec<(chrono::DateTime<Utc>, DokumentId)> = self
                .dokumenter
                .read()
                .values()
                .filter(|d| d.behandling_id == id && !d.is_archived())
                .map(|d| (d.created, d.id))
                .collect();
            if !unfinished.is_empty() {
                unfinished.sort();
                return Err(ServiceError::UnfinishedDocuments {
                    behandling_id: id,
                    dokument_ids: unfinished.into_iter().map(|(_, d)| d).collect(),
                });
            }
            let event = draft.finalize(Utc::now(), nav_ident, navn, &self.config.finalize_rules)?;
            behandlinger.insert(id, draft);
            event
        };
        tracing::info!(
            behandling_id = %id,
            version = event.behandling.version,
            "behandling finalized"
        );
        self.dispatch(&event);
        self.retry_avslutning(id)
    }

    /// Hand a finalized case to quality review and record its closing.
    /// A case that is already closed is returned unchanged.
    ///
    /// Quality review being unreachable is logged, not returned, so callers
    /// can poll this without special-casing collaborator outages.
    pub fn retry_avslutning(&self, id: BehandlingId) -> Result<Behandling, ServiceError> {
        let behandling = self.behandling(id)?;
        if behandling
            .ferdigstilling
            .as_ref()
            .is_some_and(|f| f.avsluttet.is_some())
        {
            return Ok(behandling);
        }
        let export = KvalitetsvurderingExport::from_behandling(&behandling)?;
        let submitted = self.config.retry.run("kvalitetsvurdering", || {
            self.collaborators.kvalitetsvurdering.submit(&export)
        });
        match submitted {
            Ok(()) => self.update_behandling(id, "recordAvsluttet", |b| b.record_avsluttet(Utc::now())),
            Err(e) => {
                tracing::error!(
                    behandling_id = %id,
                    error = %e,
                    "quality review hand-over failed, case stays finalized but not closed"
                );
                Ok(behandling)
            }
        }
    }

    /// The registry person the case concerns, through the person cache.
    /// `None` when the case concerns an organization.
    pub fn saken_gjelder_person(&self, id: BehandlingId) -> Result<Option<Person>, ServiceError> {
        let behandling = self.behandling(id)?;
        let part_id = &behandling.saken_gjelder.part_id;
        if part_id.part_type() != PartIdType::Person {
            return Ok(None);
        }
        let register = self.collaborators.person_register.as_ref();
        let person = self.config.retry.run("hentPerson", || {
            self.person_cache.get_or_fetch(part_id.value(), register)
        })?;
        Ok(Some(person))
    }

    /// Whether the person the case concerns is a shielded employee today.
    pub fn saken_gjelder_er_egen_ansatt(&self, id: BehandlingId) -> Result<bool, ServiceError> {
        let behandling = self.behandling(id)?;
        let part_id = &behandling.saken_gjelder.part_id;
        Ok(part_id.part_type() == PartIdType::Person
            && self.egen_ansatt_cache.is_egen_ansatt(part_id.value(), Utc::now()))
    }

    // ── Documents ───────────────────────────────────────────────────

    /// A document by id.
    pub fn dokument(&self, id: DokumentId) -> Result<DokumentUnderArbeid, ServiceError> {
        self.dokumenter.get(&id).ok_or(ServiceError::DokumentNotFound(id))
    }

    /// Documents of a case, main documents each followed by their
    /// attachments, in creation order.
    pub fn dokumenter_for(&self, behandling_id: BehandlingId) -> Vec<DokumentUnderArbeid> {
        let mut all = self.dokumenter.filter(|d| d.behandling_id == behandling_id);
        all.sort_by_key(|d| (d.created, d.id));
        let (mains, attachments): (Vec<_>, Vec<_>) = all.into_iter().partition(|d| d.is_main());
        let mut out = Vec::with_capacity(mains.len() + attachments.len());
        for main in mains {
            let id = main.id;
            out.push(main);
            out.extend(attachments.iter().filter(|a| a.parent_id == Some(id)).cloned());
        }
        out
    }

    fn update_dokument<R>(
        &self,
        id: DokumentId,
        f: impl FnOnce(&mut DokumentUnderArbeid) -> Result<R, DokumentError>,
    ) -> Result<R, ServiceError> {
        let behandlinger = self.behandlinger.read();
        self.dokumenter
            .try_update(&id, |dokument| {
                open_case(&behandlinger, dokument.behandling_id)?;
                Ok(f(dokument)?)
            })
            .ok_or(ServiceError::DokumentNotFound(id))?
    }

    /// Check that a new document can be created for the case and parent.
    fn check_new_dokument(
        &self,
        behandlinger: &BehandlingMap,
        dokumenter: &HashMap<DokumentId, DokumentUnderArbeid>,
        ny: &NyttDokument,
        parent_id: Option<DokumentId>,
    ) -> Result<Option<DokumentUnderArbeid>, ServiceError> {
        open_case(behandlinger, ny.behandling_id)?;
        parent_id
            .map(|pid| {
                dokumenter
                    .get(&pid)
                    .cloned()
                    .ok_or(ServiceError::DokumentNotFound(pid))
            })
            .transpose()
    }

    /// Upload a file and create a document for it.
    ///
    /// Size limits and the virus scan run before anything is stored. The
    /// bytes go to temporary storage; if the document cannot be created
    /// afterwards the stored bytes are removed again. PDF/A validity is left
    /// to archiving, which also scans again.
    ///
    /// # Errors
    ///
    /// [`DokumentError::VirusInfected`] for infected content, carrying the
    /// id reserved for the rejected document.
    pub fn upload_document(&self, request: NyttOpplastetDokument) -> Result<DokumentUnderArbeid, ServiceError> {
        let size = request.content.len() as u64;
        let pending = {
            let behandlinger = self.behandlinger.read();
            let dokumenter = self.dokumenter.read();
            let parent = self.check_new_dokument(&behandlinger, &dokumenter, &request.dokument, request.parent_id)?;
            DokumentUnderArbeid::create_uploaded(
                request.dokument.clone(),
                size,
                None,
                parent.as_ref(),
                &self.config.upload_limits,
            )?
        };

        let clean = self.config.retry.run("virusScan", || {
            self.collaborators.virus_scanner.scan(&request.content)
        })?;
        if !clean {
            tracing::warn!(
                behandling_id = %pending.behandling_id,
                dokument_id = %pending.id,
                size,
                "infected upload rejected"
            );
            return Err(DokumentError::VirusInfected {
                dokument_id: pending.id,
            }
            .into());
        }

        let mellomlager_id = self.config.retry.run("mellomlagerUpload", || {
            self.collaborators.mellomlager.upload(&request.content)
        })?;

        let created = {
            let behandlinger = self.behandlinger.read();
            let mut dokumenter = self.dokumenter.write();
            self.check_new_dokument(&behandlinger, &dokumenter, &request.dokument, request.parent_id)
                .and_then(|parent| {
                    Ok(DokumentUnderArbeid::create_uploaded(
                        request.dokument,
                        size,
                        Some(mellomlager_id.clone()),
                        parent.as_ref(),
                        &self.config.upload_limits,
                    )?)
                })
                .map(|dokument| {
                    dokumenter.insert(dokument.id, dokument.clone());
                    dokument
                })
        };
        match created {
            Ok(dokument) => {
                tracing::info!(
                    dokument_id = %dokument.id,
                    behandling_id = %dokument.behandling_id,
                    size,
                    "document uploaded"
                );
                Ok(dokument)
            }
            Err(e) => {
                self.discard_blob(&mellomlager_id);
                Err(e)
            }
        }
    }

    /// Create a smart document from a template.
    pub fn create_smart_document(&self, request: NyttSmartDokument) -> Result<DokumentUnderArbeid, ServiceError> {
        {
            let behandlinger = self.behandlinger.read();
            let dokumenter = self.dokumenter.read();
            let parent = self.check_new_dokument(&behandlinger, &dokumenter, &request.dokument, request.parent_id)?;
            if let Some(parent) = &parent {
                parent.ensure_accepts_attachments(request.dokument.behandling_id)?;
            }
        }

        let smart = self.config.retry.run("smartEditorCreate", || {
            self.collaborators
                .smart_editor
                .create_document(&request.template_id, &request.content)
        })?;

        let created = {
            let behandlinger = self.behandlinger.read();
            let mut dokumenter = self.dokumenter.write();
            self.check_new_dokument(&behandlinger, &dokumenter, &request.dokument, request.parent_id)
                .and_then(|parent| {
                    Ok(DokumentUnderArbeid::create_smart(
                        request.dokument,
                        smart.id.clone(),
                        request.template_id,
                        smart.version,
                        parent.as_ref(),
                    )?)
                })
                .map(|dokument| {
                    dokumenter.insert(dokument.id, dokument.clone());
                    dokument
                })
        };
        match created {
            Ok(dokument) => {
                tracing::info!(
                    dokument_id = %dokument.id,
                    behandling_id = %dokument.behandling_id,
                    smart_editor_id = %smart.id,
                    "smart document created"
                );
                Ok(dokument)
            }
            Err(e) => {
                self.discard_smart(&smart.id);
                Err(e)
            }
        }
    }

    /// Store new content for a smart document.
    pub fn update_smart_document(
        &self,
        id: DokumentId,
        content: &serde_json::Value,
    ) -> Result<DokumentUnderArbeid, ServiceError> {
        let dokument = self.dokument(id)?;
        let DokumentKind::Smart { smart_editor_id, .. } = &dokument.kind else {
            return Err(DokumentError::WrongVariant {
                dokument_id: id,
                operation: "updateSmartContent",
                expected: "SMART",
            }
            .into());
        };
        dokument.ensure_deletable()?;
        let updated = self.config.retry.run("smartEditorUpdate", || {
            self.collaborators.smart_editor.update_document(smart_editor_id, content)
        })?;
        self.update_dokument(id, |d| {
            d.update_smart_content(updated.version)?;
            Ok(d.clone())
        })
    }

    /// Attach an archived document to a main document by reference.
    pub fn attach_journaled_document(
        &self,
        parent_id: DokumentId,
        journalpost_id: &str,
        dokument_info_id: &str,
        name: &str,
        creator_ident: NavIdent,
        creator_role: CreatorRole,
    ) -> Result<DokumentUnderArbeid, ServiceError> {
        let behandlinger = self.behandlinger.read();
        let mut dokumenter = self.dokumenter.write();
        let parent = dokumenter
            .get(&parent_id)
            .ok_or(ServiceError::DokumentNotFound(parent_id))?;
        open_case(&behandlinger, parent.behandling_id)?;
        let siblings: Vec<DokumentUnderArbeid> = dokumenter
            .values()
            .filter(|d| d.parent_id == Some(parent_id))
            .cloned()
            .collect();
        let dokument = DokumentUnderArbeid::attach_journaled(
            parent,
            &siblings,
            journalpost_id.to_string(),
            dokument_info_id.to_string(),
            name.to_string(),
            creator_ident,
            creator_role,
        )?;
        dokumenter.insert(dokument.id, dokument.clone());
        tracing::info!(
            dokument_id = %dokument.id,
            parent_id = %parent_id,
            journalpost_id,
            dokument_info_id,
            "journaled document attached"
        );
        Ok(dokument)
    }

    /// Mark a single document finished.
    pub fn mark_finished(&self, id: DokumentId, actor: &NavIdent) -> Result<DokumentUnderArbeid, ServiceError> {
        self.update_dokument(id, |d| {
            d.mark_finished(actor)?;
            Ok(d.clone())
        })
    }

    fn document_set(
        dokumenter: &HashMap<DokumentId, DokumentUnderArbeid>,
        main_id: DokumentId,
    ) -> Result<Vec<DokumentUnderArbeid>, ServiceError> {
        let main = dokumenter
            .get(&main_id)
            .ok_or(ServiceError::DokumentNotFound(main_id))?;
        if !main.is_main() {
            return Err(DokumentError::InvalidParent {
                dokument_id: main_id,
                reason: "document sets are addressed by their main document".to_string(),
            }
            .into());
        }
        let mut set = vec![main.clone()];
        let mut attachments: Vec<DokumentUnderArbeid> = dokumenter
            .values()
            .filter(|d| d.parent_id == Some(main_id))
            .cloned()
            .collect();
        attachments.sort_by_key(|d| (d.created, d.id));
        set.extend(attachments);
        Ok(set)
    }

    /// Mark a main document and all its attachments finished, or none of
    /// them.
    pub fn finish_document_set(
        &self,
        main_id: DokumentId,
        actor: &NavIdent,
    ) -> Result<Vec<DokumentUnderArbeid>, ServiceError> {
        let behandlinger = self.behandlinger.read();
        let mut dokumenter = self.dokumenter.write();
        let mut set = Self::document_set(&dokumenter, main_id)?;
        open_case(&behandlinger, set[0].behandling_id)?;
        for dokument in &mut set {
            dokument.mark_finished(actor)?;
        }
        for dokument in &set {
            dokumenter.insert(dokument.id, dokument.clone());
        }
        tracing::info!(main_id = %main_id, documents = set.len(), actor = %actor, "document set finished");
        Ok(set)
    }

    /// Withdraw the finished mark. On a main document the marks of its
    /// attachments are withdrawn as well; an attachment cannot be reopened
    /// while its main document is finished.
    pub fn unmark_finished(&self, id: DokumentId) -> Result<Vec<DokumentUnderArbeid>, ServiceError> {
        let behandlinger = self.behandlinger.read();
        let mut dokumenter = self.dokumenter.write();
        let dokument = dokumenter
            .get(&id)
            .cloned()
            .ok_or(ServiceError::DokumentNotFound(id))?;
        open_case(&behandlinger, dokument.behandling_id)?;

        let mut changed = Vec::new();
        if let Some(parent_id) = dokument.parent_id {
            if let Some(parent) = dokumenter.get(&parent_id) {
                if parent.is_marked_finished() {
                    return Err(DokumentError::ParentFinished { parent_id }.into());
                }
            }
            let mut d = dokument;
            d.unmark_finished()?;
            changed.push(d);
        } else {
            for mut d in Self::document_set(&dokumenter, id)? {
                if d.id == id {
                    d.unmark_finished()?;
                    changed.push(d);
                } else if d.is_marked_finished() && !d.is_archived() {
                    d.unmark_finished()?;
                    changed.push(d);
                }
            }
        }
        for d in &changed {
            dokumenter.insert(d.id, d.clone());
        }
        Ok(changed)
    }

    /// Rename a document.
    pub fn rename(&self, id: DokumentId, name: &str) -> Result<DokumentUnderArbeid, ServiceError> {
        self.update_dokument(id, |d| {
            d.rename(name.to_string())?;
            Ok(d.clone())
        })
    }

    /// Change a main document's type.
    pub fn set_dokument_type(
        &self,
        id: DokumentId,
        dokument_type: DokumentType,
    ) -> Result<DokumentUnderArbeid, ServiceError> {
        self.update_dokument(id, |d| {
            d.set_dokument_type(dokument_type)?;
            Ok(d.clone())
        })
    }

    /// Delete a document. A main document takes its attachments with it.
    /// Stored content is removed best-effort afterwards. Returns the ids
    /// removed.
    pub fn delete_document(&self, id: DokumentId) -> Result<Vec<DokumentId>, ServiceError> {
        let removed = {
            let behandlinger = self.behandlinger.read();
            let mut dokumenter = self.dokumenter.write();
            let dokument = dokumenter
                .get(&id)
                .ok_or(ServiceError::DokumentNotFound(id))?;
            open_case(&behandlinger, dokument.behandling_id)?;
            let set = match dokument.parent_id {
                Some(parent_id) => {
                    if let Some(parent) = dokumenter.get(&parent_id) {
                        parent.ensure_accepts_attachments(dokument.behandling_id)?;
                    }
                    vec![dokument.clone()]
                }
                None => Self::document_set(&dokumenter, id)?,
            };
            for d in &set {
                d.ensure_deletable()?;
            }
            for d in &set {
                dokumenter.remove(&d.id);
            }
            set
        };

        for d in &removed {
            match &d.kind {
                DokumentKind::Opplastet {
                    mellomlager_id: Some(blob),
                    ..
                } => self.discard_blob(blob),
                DokumentKind::Smart { smart_editor_id, .. } => self.discard_smart(smart_editor_id),
                _ => {}
            }
        }
        tracing::info!(dokument_id = %id, removed = removed.len(), "document deleted");
        Ok(removed.into_iter().map(|d| d.id).collect())
    }

    fn discard_blob(&self, mellomlager_id: &str) {
        if let Err(e) = self.collaborators.mellomlager.delete(mellomlager_id) {
            tracing::warn!(mellomlager_id, error = %e, "could not remove stored upload");
        }
    }

    fn discard_smart(&self, smart_editor_id: &str) {
        if let Err(e) = self.collaborators.smart_editor.delete_document(smart_editor_id) {
            tracing::warn!(smart_editor_id, error = %e, "could not remove smart editor document");
        }
    }

    fn content_of(&self, dokument: &DokumentUnderArbeid) -> Result<Vec<u8>, ServiceError> {
        let content = match &dokument.kind {
            DokumentKind::Opplastet {
                mellomlager_id: Some(blob),
                ..
            } => self
                .config
                .retry
                .run("mellomlagerGet", || self.collaborators.mellomlager.get(blob))?,
            DokumentKind::Opplastet { mellomlager_id: None, .. } => {
                return Err(DokumentError::MissingMellomlager {
                    dokument_id: dokument.id,
                }
                .into())
            }
            DokumentKind::Smart { smart_editor_id, .. } => self.config.retry.run("smartEditorRender", || {
                self.collaborators.smart_editor.render_pdf(smart_editor_id)
            })?,
            DokumentKind::JournalfoertVedlegg { .. } => Vec::new(),
        };
        Ok(content)
    }

    fn clearance_for(&self, content: &[u8]) -> Result<ArchiveClearance, GatewayError> {
        let virus_clean = self
            .config
            .retry
            .run("virusScan", || self.collaborators.virus_scanner.scan(content))?;
        let pdfa_errors = if virus_clean {
            self.config
                .retry
                .run("pdfaValidate", || self.collaborators.pdfa_validator.validate(content))?
        } else {
            Vec::new()
        };
        Ok(ArchiveClearance {
            virus_clean,
            pdfa_errors,
        })
    }

    /// Archive a main document and its attachments as one journal post.
    ///
    /// Every member is scanned and validated first; nothing is submitted
    /// unless all of them pass. Journaled attachments are already archived
    /// and keep their own references. The resulting references are linked
    /// to the case.
    pub fn archive_document_set(
        &self,
        main_id: DokumentId,
        utfoerende_ident: &NavIdent,
    ) -> Result<Vec<DokumentUnderArbeid>, ServiceError> {
        let (set, behandling) = {
            let behandlinger = self.behandlinger.read();
            let dokumenter = self.dokumenter.read();
            let set = Self::document_set(&dokumenter, main_id)?;
            let behandling = open_case(&behandlinger, set[0].behandling_id)?.clone();
            (set, behandling)
        };

        let mut submission = Vec::new();
        for dokument in &set {
            if dokument.is_journaled() {
                dokument.check_archivable(&ArchiveClearance::clean())?;
                continue;
            }
            dokument.check_archivable(&ArchiveClearance::clean())?;
            let content = self.content_of(dokument)?;
            let clearance = self.clearance_for(&content)?;
            if let Err(e) = dokument.check_archivable(&clearance) {
                tracing::warn!(
                    dokument_id = %dokument.id,
                    main_id = %main_id,
                    error = %e,
                    "document set blocked from archiving"
                );
                return Err(e.into());
            }
            submission.push(ArkivDokument {
                dokument_id: dokument.id,
                tittel: dokument.name.clone(),
                content,
            });
        }

        let request = ArkivRequest {
            behandling_id: behandling.id,
            fagsystem: behandling.fagsystem.clone(),
            fagsak_id: behandling.fagsak_id.clone(),
            dokumenter: submission,
        };
        let kvittering = self
            .config
            .retry
            .run("arkiv", || self.collaborators.arkiv.submit_for_archival(&request))?;
        if kvittering.dokument_info_ids.len() != request.dokumenter.len() {
            return Err(GatewayError::Rejected {
                service: "arkiv",
                reason: format!(
                    "receipt has {} document ids for {} documents",
                    kvittering.dokument_info_ids.len(),
                    request.dokumenter.len()
                ),
            }
            .into());
        }
        let info_ids: HashMap<DokumentId, String> = request
            .dokumenter
            .iter()
            .map(|d| d.dokument_id)
            .zip(kvittering.dokument_info_ids.iter().cloned())
            .collect();

        let archived = {
            let behandlinger = self.behandlinger.read();
            let mut dokumenter = self.dokumenter.write();
            open_case(&behandlinger, behandling.id)?;
            let mut current = Self::document_set(&dokumenter, main_id)?;
            for dokument in &mut current {
                let (journalpost_id, dokument_info_id) = match (&dokument.kind, info_ids.get(&dokument.id)) {
                    (
                        DokumentKind::JournalfoertVedlegg {
                            journalpost_id,
                            dokument_info_id,
                        },
                        _,
                    ) => (journalpost_id.clone(), dokument_info_id.clone()),
                    (_, Some(info_id)) => (kvittering.journalpost_id.clone(), info_id.clone()),
                    (_, None) => {
                        tracing::error!(
                            dokument_id = %dokument.id,
                            journalpost_id = %kvittering.journalpost_id,
                            "document joined the set during archiving"
                        );
                        return Err(DokumentError::ParentFinished { parent_id: main_id }.into());
                    }
                };
                let clearance = ArchiveClearance::clean();
                if let Err(e) = dokument.archive(journalpost_id, vec![dokument_info_id], &clearance) {
                    tracing::error!(
                        dokument_id = %dokument.id,
                        journalpost_id = %kvittering.journalpost_id,
                        error = %e,
                        "archived in the journal but the document changed meanwhile"
                    );
                    return Err(e.into());
                }
            }
            for d in &current {
                dokumenter.insert(d.id, d.clone());
            }
            current
        };
        tracing::info!(
            main_id = %main_id,
            journalpost_id = %kvittering.journalpost_id,
            documents = archived.len(),
            "document set archived"
        );

        let links: Vec<(String, String)> = archived
            .iter()
            .flat_map(|d| {
                d.journalposter.iter().flat_map(|jp| {
                    jp.dokument_info_ids
                        .iter()
                        .map(|info| (jp.journalpost_id.clone(), info.clone()))
                })
            })
            .collect();
        self.update_behandling(behandling.id, "addSaksdokument", |b| {
            let mut endringsinnslag = Vec::new();
            for (journalpost_id, dokument_info_id) in &links {
                let event = b.add_saksdokument(
                    journalpost_id.as_str(),
                    dokument_info_id.as_str(),
                    Some(utfoerende_ident),
                )?;
                endringsinnslag.extend(event.endringsinnslag);
            }
            Ok(BehandlingEndretEvent {
                behandling: b.clone(),
                endringsinnslag,
            })
        })?;
        Ok(archived)
    }

    // ── Comments ────────────────────────────────────────────────────

    /// Start a comment thread on a smart document.
    pub fn add_comment(
        &self,
        id: DokumentId,
        author: KommentarForfatter,
        text: &str,
    ) -> Result<KommentarId, ServiceError> {
        self.update_dokument(id, |d| d.add_comment(author, text.to_string()))
    }

    /// Reply within a comment thread.
    pub fn reply_to_comment(
        &self,
        id: DokumentId,
        parent: KommentarId,
        author: KommentarForfatter,
        text: &str,
    ) -> Result<KommentarId, ServiceError> {
        self.update_dokument(id, |d| d.reply(parent, author, text.to_string()))
    }

    /// Edit a comment.
    pub fn edit_comment(
        &self,
        id: DokumentId,
        kommentar_id: KommentarId,
        ident: &NavIdent,
        text: &str,
    ) -> Result<(), ServiceError> {
        self.update_dokument(id, |d| d.edit_comment(kommentar_id, ident, text.to_string()))
    }

    /// Delete a comment or a whole thread. Returns the number removed.
    pub fn delete_comment(
        &self,
        id: DokumentId,
        kommentar_id: KommentarId,
        ident: &NavIdent,
    ) -> Result<usize, ServiceError> {
        self.update_dokument(id, |d| d.delete_comment(kommentar_id, ident))
    }

    /// Comment threads of a smart document: each root with its replies.
    pub fn comment_threads(&self, id: DokumentId) -> Result<Vec<(Kommentar, Vec<Kommentar>)>, ServiceError> {
        let dokument = self.dokument(id)?;
        Ok(kabal_dokument::kommentar::threads(dokument.kommentarer())
            .into_iter()
            .map(|(root, replies)| (root.clone(), replies.into_iter().cloned().collect()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use kabal_behandling::BehandlingType;
    use kabal_core::{ErrorKind, PartId, SakenGjelder};
    use kabal_gateway::memory::EICAR_SIGNATURE;
    use kabal_gateway::{RetryPolicy, Skjerming};
    use std::sync::atomic::{AtomicBool, Ordering};

    const PDFA: &[u8] = b"%PDF-1.7\n% pdfaid:part=2\nbody";

    /// Signature scanner whose database can be made to lag behind, so
    /// infected content slips through until it is brought up to date.
    #[derive(Default)]
    struct LaggingScanner {
        outdated: AtomicBool,
    }

    impl LaggingScanner {
        fn set_outdated(&self, outdated: bool) {
            self.outdated.store(outdated, Ordering::SeqCst);
        }
    }

    impl VirusScanner for LaggingScanner {
        fn scan(&self, content: &[u8]) -> Result<bool, GatewayError> {
            if self.outdated.load(Ordering::SeqCst) {
                return Ok(true);
            }
            InMemoryVirusScanner.scan(content)
        }
    }

    struct Fixture {
        service: KabalService,
        scanner: Arc<LaggingScanner>,
        arkiv: Arc<InMemoryArkiv>,
        kvalitetsvurdering: Arc<InMemoryKvalitetsvurdering>,
        smart_editor: Arc<InMemorySmartEditor>,
        mellomlager: Arc<InMemoryMellomlager>,
        events: Arc<RecordingEventPublisher>,
        notifications: Arc<RecordingNotificationSink>,
        persons: Arc<InMemoryPersonRegister>,
    }

    fn fixture() -> Fixture {
        let scanner = Arc::new(LaggingScanner::default());
        let arkiv = Arc::new(InMemoryArkiv::new());
        let kvalitetsvurdering = Arc::new(InMemoryKvalitetsvurdering::new());
        let smart_editor = Arc::new(InMemorySmartEditor::new());
        let mellomlager = Arc::new(InMemoryMellomlager::new());
        let events = Arc::new(RecordingEventPublisher::new());
        let notifications = Arc::new(RecordingNotificationSink::new());
        let persons = Arc::new(InMemoryPersonRegister::new());
        let collaborators = Collaborators {
            virus_scanner: scanner.clone(),
            pdfa_validator: Arc::new(InMemoryPdfaValidator),
            arkiv: arkiv.clone(),
            kvalitetsvurdering: kvalitetsvurdering.clone(),
            smart_editor: smart_editor.clone(),
            mellomlager: mellomlager.clone(),
            event_publisher: events.clone(),
            notification_sink: notifications.clone(),
            person_register: persons.clone(),
        };
        let config = KabalConfig {
            retry: RetryPolicy {
                max_retries: 2,
                base_delay: std::time::Duration::ZERO,
            },
            ..KabalConfig::default()
        };
        Fixture {
            service: KabalService::new(config, collaborators),
            scanner,
            arkiv,
            kvalitetsvurdering,
            smart_editor,
            mellomlager,
            events,
            notifications,
            persons,
        }
    }

    fn ident(s: &str) -> NavIdent {
        NavIdent::new(s).unwrap()
    }

    fn mottak(kilde_referanse: &str) -> Mottak {
        Mottak {
            id: Default::default(),
            behandling_type: BehandlingType::Klage,
            ytelse: "SYK".to_string(),
            fagsystem: "K9".to_string(),
            fagsak_id: "FS-1".to_string(),
            kilde_referanse: kilde_referanse.to_string(),
            saken_gjelder: SakenGjelder {
                part_id: PartId::person("12345678901").unwrap(),
                skal_motta_kopi: false,
            },
            klager: None,
            prosessfullmektig: None,
            hjemler: ["FTRL_8_2".to_string()].into(),
            mottatt_klageinstans: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            frist: None,
            forrige_behandling_id: None,
            dokumenter: Vec::new(),
        }
    }

    fn ny(behandling_id: BehandlingId, name: &str) -> NyttDokument {
        NyttDokument {
            behandling_id,
            name: name.to_string(),
            dokument_type: DokumentType::Vedtak,
            creator_ident: ident("B100001"),
            creator_role: CreatorRole::Saksbehandler,
        }
    }

    fn upload(f: &Fixture, behandling_id: BehandlingId, parent_id: Option<DokumentId>, content: &[u8]) -> Result<DokumentUnderArbeid, ServiceError> {
        f.service.upload_document(NyttOpplastetDokument {
            dokument: ny(behandling_id, "Vedlegg"),
            parent_id,
            content: content.to_vec(),
        })
    }

    fn assigned_case(f: &Fixture) -> Behandling {
        let b = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        f.service
            .assign(b.id, Some(ident("B100001")), Some("4291".into()), Some(0), Some(&ident("L500000")))
            .unwrap()
    }

    #[test]
    fn creating_twice_from_the_same_source_is_rejected() {
        let f = fixture();
        let first = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        let err = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateSource { existing, .. } if existing == first.id));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(f.service.create_behandling_from_mottak(&mottak("REF-2")).is_ok());
        assert_eq!(f.events.events().len(), 2);
    }

    #[test]
    fn stale_version_is_a_concurrent_modification() {
        let f = fixture();
        let b = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        let err = f
            .service
            .assign(b.id, Some(ident("B100001")), None, Some(1), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
        assert_eq!(f.service.behandling(b.id).unwrap().version, 0);
    }

    #[test]
    fn assignment_publishes_and_notifies() {
        let f = fixture();
        let b = assigned_case(&f);
        assert_eq!(b.status(), Status::Tildelt);
        assert_eq!(f.events.events().len(), 2);
        let n = f.notifications.notifications();
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].mottaker, ident("B100001"));
    }

    #[test]
    fn unknown_case_is_not_found() {
        let f = fixture();
        let err = f.service.status(BehandlingId::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn failed_publish_is_kept_and_flushed_in_order() {
        let f = fixture();
        f.events.fail_next(3);
        let b = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        assert_eq!(f.service.pending_events(), 1);
        assert!(f.events.events().is_empty());

        f.service
            .assign(b.id, Some(ident("B100001")), None, None, None)
            .unwrap();
        assert_eq!(f.service.pending_events(), 0);
        let versions: Vec<u64> = f.events.events().iter().map(|e| e.behandling.version).collect();
        assert_eq!(versions, vec![0, 1]);
        assert_eq!(f.service.flush_outbox(), 0);
    }

    #[test]
    fn upload_limits_apply_before_storage() {
        let f = fixture();
        let b = assigned_case(&f);
        let err = upload(&f, b.id, None, b"").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Dokument(DokumentError::AttachmentIsEmpty { code: "EMPTY" })
        ));
        assert!(!f.mellomlager.contains("ml-1"));
    }

    #[test]
    fn upload_survives_transient_storage_failure() {
        let f = fixture();
        let b = assigned_case(&f);
        f.mellomlager.fail_next(2);
        let d = upload(&f, b.id, None, PDFA).unwrap();
        assert_eq!(d.mellomlager_id(), Some("ml-1"));
    }

    #[test]
    fn finalize_waits_for_archived_documents() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        f.service.set_utfall(b.id, Some(Utfall::Trukket), &officer).unwrap();
        let main = upload(&f, b.id, None, PDFA).unwrap();

        let err = f.service.finalize(b.id, officer.clone(), "Saks Behandler").unwrap_err();
        assert!(matches!(
            &err,
            ServiceError::UnfinishedDocuments { dokument_ids, .. } if dokument_ids == &vec![main.id]
        ));

        f.service.finish_document_set(main.id, &officer).unwrap();
        f.service.archive_document_set(main.id, &officer).unwrap();
        let done = f.service.finalize(b.id, officer.clone(), "Saks Behandler").unwrap();
        assert_eq!(done.status(), Status::Fullfoert);
        assert!(done.ferdigstilling.as_ref().unwrap().avsluttet.is_some());
        assert_eq!(f.kvalitetsvurdering.exports().len(), 1);
        assert_eq!(done.saksdokumenter.len(), 1);
    }

    #[test]
    fn quality_review_outage_leaves_case_finalized_but_open_for_retry() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        f.service.set_utfall(b.id, Some(Utfall::Trukket), &officer).unwrap();
        f.kvalitetsvurdering.fail_next(10);
        let done = f.service.finalize(b.id, officer, "Saks Behandler").unwrap();
        assert_eq!(done.status(), Status::Fullfoert);
        assert!(done.ferdigstilling.as_ref().unwrap().avsluttet.is_none());

        f.kvalitetsvurdering.fail_next(0);
        let closed = f.service.retry_avslutning(b.id).unwrap();
        assert!(closed.ferdigstilling.as_ref().unwrap().avsluttet.is_some());
        let again = f.service.retry_avslutning(b.id).unwrap();
        assert_eq!(again.version, closed.version);
        assert_eq!(f.kvalitetsvurdering.exports().len(), 1);
    }

    #[test]
    fn infected_upload_is_rejected_and_nothing_is_stored() {
        let f = fixture();
        let b = assigned_case(&f);
        let mut infected = PDFA.to_vec();
        infected.extend_from_slice(EICAR_SIGNATURE);

        let err = upload(&f, b.id, None, &infected).unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::VirusInfected { .. })));
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert!(f.service.dokumenter_for(b.id).is_empty());
        assert_eq!(f.mellomlager.stored(), 0);
        assert!(upload(&f, b.id, None, PDFA).is_ok());
    }

    #[test]
    fn archive_rescan_blocks_the_whole_set() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        let main = upload(&f, b.id, None, PDFA).unwrap();
        let mut infected = PDFA.to_vec();
        infected.extend_from_slice(EICAR_SIGNATURE);
        f.scanner.set_outdated(true);
        upload(&f, b.id, Some(main.id), &infected).unwrap();
        f.scanner.set_outdated(false);
        f.service.finish_document_set(main.id, &officer).unwrap();

        let err = f.service.archive_document_set(main.id, &officer).unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::VirusInfected { .. })));
        assert!(f.arkiv.submissions().is_empty());
        assert!(f.service.dokumenter_for(b.id).iter().all(|d| !d.is_archived()));
    }

    #[test]
    fn non_pdfa_upload_is_rejected_at_archive() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        let main = upload(&f, b.id, None, b"plain text").unwrap();
        f.service.mark_finished(main.id, &officer).unwrap();
        let err = f.service.archive_document_set(main.id, &officer).unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::PdfaInvalid { .. })));
    }

    #[test]
    fn archive_covers_smart_and_journaled_members() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        let main = f
            .service
            .create_smart_document(NyttSmartDokument {
                dokument: ny(b.id, "Vedtak"),
                parent_id: None,
                template_id: "klagevedtak".to_string(),
                content: serde_json::json!({"tekst": "vedtak"}),
            })
            .unwrap();
        let vedlegg = f
            .service
            .attach_journaled_document(main.id, "123", "456", "Klage", officer.clone(), CreatorRole::Saksbehandler)
            .unwrap();
        let dup = f
            .service
            .attach_journaled_document(main.id, "123", "456", "Klage", officer.clone(), CreatorRole::Saksbehandler)
            .unwrap_err();
        assert!(matches!(dup, ServiceError::Dokument(DokumentError::DuplicateAttachment { .. })));

        f.service.finish_document_set(main.id, &officer).unwrap();
        let archived = f.service.archive_document_set(main.id, &officer).unwrap();
        assert!(archived.iter().all(DokumentUnderArbeid::is_archived));
        let submissions = f.arkiv.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].dokumenter.len(), 1);

        let v = f.service.dokument(vedlegg.id).unwrap();
        assert_eq!(v.journalposter[0].journalpost_id, "123");
        let case = f.service.behandling(b.id).unwrap();
        assert_eq!(case.saksdokumenter.len(), 2);
    }

    #[test]
    fn finish_set_is_all_or_nothing() {
        let f = fixture();
        let b = assigned_case(&f);
        let officer = ident("B100001");
        let main = upload(&f, b.id, None, PDFA).unwrap();
        let att = upload(&f, b.id, Some(main.id), PDFA).unwrap();
        f.service.mark_finished(att.id, &officer).unwrap();

        let err = f.service.finish_document_set(main.id, &officer).unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::AlreadyFinished { .. })));
        assert!(!f.service.dokument(main.id).unwrap().is_marked_finished());

        f.service.unmark_finished(att.id).unwrap();
        let set = f.service.finish_document_set(main.id, &officer).unwrap();
        assert_eq!(set.len(), 2);

        let err = f.service.unmark_finished(att.id).unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::ParentFinished { .. })));
        let reopened = f.service.unmark_finished(main.id).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn deleting_main_removes_attachments_and_content() {
        let f = fixture();
        let b = assigned_case(&f);
        let main = f
            .service
            .create_smart_document(NyttSmartDokument {
                dokument: ny(b.id, "Brev"),
                parent_id: None,
                template_id: "brev".to_string(),
                content: serde_json::json!({}),
            })
            .unwrap();
        let att = upload(&f, b.id, Some(main.id), PDFA).unwrap();

        let removed = f.service.delete_document(main.id).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(f.service.dokumenter_for(b.id).is_empty());
        assert!(!f.smart_editor.contains("se-1"));
        assert!(!f.mellomlager.contains(att.mellomlager_id().unwrap()));
    }

    #[test]
    fn cleanup_failure_does_not_fail_delete() {
        let f = fixture();
        let b = assigned_case(&f);
        let d = upload(&f, b.id, None, PDFA).unwrap();
        f.mellomlager.fail_next(1);
        assert_eq!(f.service.delete_document(d.id).unwrap(), vec![d.id]);
    }

    #[test]
    fn documents_of_a_terminal_case_are_frozen() {
        let f = fixture();
        let b = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        let main = upload(&f, b.id, None, PDFA).unwrap();
        f.service
            .feilregistrer(b.id, "duplikat", ident("B100001"), "K9")
            .unwrap();
        let err = f.service.rename(main.id, "Nytt navn").unwrap_err();
        assert!(matches!(err, ServiceError::Behandling(BehandlingError::Feilregistrert { .. })));
        assert!(upload(&f, b.id, None, PDFA).is_err());
    }

    #[test]
    fn smart_content_updates_bump_version() {
        let f = fixture();
        let b = assigned_case(&f);
        let d = f
            .service
            .create_smart_document(NyttSmartDokument {
                dokument: ny(b.id, "Vedtak"),
                parent_id: None,
                template_id: "vedtak".to_string(),
                content: serde_json::json!({}),
            })
            .unwrap();
        let updated = f
            .service
            .update_smart_document(d.id, &serde_json::json!({"tekst": "ny"}))
            .unwrap();
        assert!(matches!(updated.kind, DokumentKind::Smart { version: 2, .. }));

        let uploaded = upload(&f, b.id, None, PDFA).unwrap();
        let err = f
            .service
            .update_smart_document(uploaded.id, &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::WrongVariant { .. })));
    }

    #[test]
    fn comment_threads_through_the_service() {
        let f = fixture();
        let b = assigned_case(&f);
        let d = f
            .service
            .create_smart_document(NyttSmartDokument {
                dokument: ny(b.id, "Vedtak"),
                parent_id: None,
                template_id: "vedtak".to_string(),
                content: serde_json::json!({}),
            })
            .unwrap();
        let author = KommentarForfatter {
            ident: ident("B100001"),
            navn: "Saks Behandler".to_string(),
        };
        let root = f.service.add_comment(d.id, author.clone(), "Se avsnitt 2").unwrap();
        let reply = f.service.reply_to_comment(d.id, root, author.clone(), "Fikset").unwrap();
        f.service.reply_to_comment(d.id, reply, author.clone(), "Takk").unwrap();

        let threads = f.service.comment_threads(d.id).unwrap();
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].1.len(), 2);

        let err = f
            .service
            .edit_comment(d.id, root, &ident("Z999999"), "endret")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Dokument(DokumentError::NotKommentarAuthor { .. })));
        assert_eq!(f.service.delete_comment(d.id, root, &author.ident).unwrap(), 3);
    }

    #[test]
    fn person_lookup_goes_through_the_cache() {
        let f = fixture();
        let b = f.service.create_behandling_from_mottak(&mottak("REF-1")).unwrap();
        f.persons.insert(Person {
            foedselsnummer: "12345678901".to_string(),
            navn: "Ola Nordmann".to_string(),
            fortrolig: false,
            strengt_fortrolig: false,
            doedsdato: None,
        });
        let p = f.service.saken_gjelder_person(b.id).unwrap().unwrap();
        assert_eq!(p.navn, "Ola Nordmann");
        f.service.saken_gjelder_person(b.id).unwrap();
        assert_eq!(f.persons.lookups(), 1);

        assert!(!f.service.saken_gjelder_er_egen_ansatt(b.id).unwrap());
        f.service.egen_ansatt_cache().upsert(
            "12345678901",
            Skjerming {
                skjermet_fra: Utc::now() - chrono::Duration::days(1),
                skjermet_til: None,
            },
        );
        assert!(f.service.saken_gjelder_er_egen_ansatt(b.id).unwrap());
    }
}
