//! # Service Scenarios
//!
//! End-to-end flows through [`KabalService`] with in-memory collaborators:
//! a full appeal from intake to closure, concurrent edits, event
//! delivery during a publisher outage, and archive gating.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use kabal_behandling::{BehandlingType, Mottak, Status, Utfall};
use kabal_core::{BehandlingId, ErrorKind, NavIdent, PartId, SakenGjelder};
use kabal_dokument::{CreatorRole, DokumentError, DokumentType, NyttDokument};
use kabal_gateway::memory::{
    InMemoryArkiv, InMemoryKvalitetsvurdering, InMemoryMellomlager, InMemoryPdfaValidator,
    InMemoryPersonRegister, InMemorySmartEditor, InMemoryVirusScanner, RecordingEventPublisher,
    RecordingNotificationSink, EICAR_SIGNATURE,
};
use kabal_gateway::{GatewayError, RetryPolicy, VirusScanner};
use kabal_service::{
    Collaborators, KabalConfig, KabalService, NyttOpplastetDokument, NyttSmartDokument,
    ServiceError,
};

const PDFA: &[u8] = b"%PDF-1.7\n% pdfaid:part=2\nbody";

/// Signature scanner that can run with an outdated database, letting
/// infected content through until it is refreshed.
#[derive(Default)]
struct LaggingScanner {
    outdated: AtomicBool,
}

impl VirusScanner for LaggingScanner {
    fn scan(&self, content: &[u8]) -> Result<bool, GatewayError> {
        if self.outdated.load(Ordering::SeqCst) {
            return Ok(true);
        }
        InMemoryVirusScanner.scan(content)
    }
}

struct Harness {
    service: KabalService,
    scanner: Arc<LaggingScanner>,
    mellomlager: Arc<InMemoryMellomlager>,
    arkiv: Arc<InMemoryArkiv>,
    kvalitetsvurdering: Arc<InMemoryKvalitetsvurdering>,
    events: Arc<RecordingEventPublisher>,
    notifications: Arc<RecordingNotificationSink>,
}

fn harness() -> Harness {
    let scanner = Arc::new(LaggingScanner::default());
    let mellomlager = Arc::new(InMemoryMellomlager::new());
    let arkiv = Arc::new(InMemoryArkiv::new());
    let kvalitetsvurdering = Arc::new(InMemoryKvalitetsvurdering::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let notifications = Arc::new(RecordingNotificationSink::new());
    let collaborators = Collaborators {
        virus_scanner: scanner.clone(),
        pdfa_validator: Arc::new(InMemoryPdfaValidator),
        arkiv: arkiv.clone(),
        kvalitetsvurdering: kvalitetsvurdering.clone(),
        smart_editor: Arc::new(InMemorySmartEditor::new()),
        mellomlager: mellomlager.clone(),
        event_publisher: events.clone(),
        notification_sink: notifications.clone(),
        person_register: Arc::new(InMemoryPersonRegister::new()),
    };
    let config = KabalConfig {
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::ZERO,
        },
        ..KabalConfig::default()
    };
    Harness {
        service: KabalService::new(config, collaborators),
        scanner,
        mellomlager,
        arkiv,
        kvalitetsvurdering,
        events,
        notifications,
    }
}

fn ident(s: &str) -> NavIdent {
    NavIdent::new(s).unwrap()
}

fn mottak(kilde_referanse: &str) -> Mottak {
    Mottak {
        id: Default::default(),
        behandling_type: BehandlingType::Klage,
        ytelse: "OMS".to_string(),
        fagsystem: "K9".to_string(),
        fagsak_id: "FS-42".to_string(),
        kilde_referanse: kilde_referanse.to_string(),
        saken_gjelder: SakenGjelder {
            part_id: PartId::person("01020312345").unwrap(),
            skal_motta_kopi: false,
        },
        klager: None,
        prosessfullmektig: None,
        hjemler: ["FTRL_9_2".to_string()].into(),
        mottatt_klageinstans: Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap(),
        frist: None,
        forrige_behandling_id: None,
        dokumenter: Vec::new(),
    }
}

fn ny(behandling_id: BehandlingId, name: &str, dokument_type: DokumentType) -> NyttDokument {
    NyttDokument {
        behandling_id,
        name: name.to_string(),
        dokument_type,
        creator_ident: ident("B100001"),
        creator_role: CreatorRole::Saksbehandler,
    }
}

// ---------------------------------------------------------------------------
// 1. Intake to closure
// ---------------------------------------------------------------------------

#[test]
fn appeal_runs_from_intake_to_closure() {
    let h = harness();
    let leder = ident("L500000");
    let officer = ident("B100001");
    let co_signer = ident("A200000");

    let b = h.service.create_behandling_from_mottak(&mottak("REF-E2E")).unwrap();
    assert_eq!(b.status(), Status::IkkeTildelt);

    let b = h
        .service
        .assign(b.id, Some(officer.clone()), Some("4291".into()), Some(b.version), Some(&leder))
        .unwrap();
    assert_eq!(h.service.behandlinger_for_saksbehandler(&officer).len(), 1);

    h.service.route_to_co_signer(b.id, Some(co_signer.clone()), None, &officer).unwrap();
    h.service.send_to_co_signer(b.id, None, &officer).unwrap();
    assert_eq!(h.service.status(b.id).unwrap(), Status::SendtTilMedunderskriver);

    let vedtak = h
        .service
        .create_smart_document(NyttSmartDokument {
            dokument: ny(b.id, "Vedtak", DokumentType::Vedtak),
            parent_id: None,
            template_id: "klagevedtak".to_string(),
            content: serde_json::json!({"tekst": "Klagen tas ikke til følge."}),
        })
        .unwrap();
    h.service
        .upload_document(NyttOpplastetDokument {
            dokument: ny(b.id, "Legeerklæring", DokumentType::Notat),
            parent_id: Some(vedtak.id),
            content: PDFA.to_vec(),
        })
        .unwrap();

    // Finalizing while the co-signer holds the case is refused.
    h.service
        .set_registreringshjemler(b.id, ["FTRL_9_2".to_string()], &officer)
        .unwrap();
    h.service.set_utfall(b.id, Some(Utfall::Stadfestelse), &officer).unwrap();
    assert!(h.service.finalize(b.id, officer.clone(), "Saks Behandler").is_err());

    h.service.return_from_co_signer(b.id, None, &co_signer).unwrap();
    h.service.finish_document_set(vedtak.id, &officer).unwrap();
    let archived = h.service.archive_document_set(vedtak.id, &officer).unwrap();
    assert_eq!(archived.len(), 2);
    assert!(archived.iter().all(|d| d.is_archived()));

    let done = h.service.finalize(b.id, officer.clone(), "Saks Behandler").unwrap();
    assert_eq!(done.status(), Status::Fullfoert);
    assert!(done.ferdigstilling.as_ref().unwrap().avsluttet.is_some());
    assert_eq!(done.saksdokumenter.len(), 2);
    assert_eq!(h.arkiv.submissions().len(), 1);
    assert_eq!(h.kvalitetsvurdering.exports().len(), 1);
    assert!(h.service.behandlinger_for_saksbehandler(&officer).is_empty());

    // Every published event carries a strictly higher version.
    let versions: Vec<u64> = h
        .events
        .events()
        .iter()
        .filter(|e| e.behandling.id == b.id)
        .map(|e| e.behandling.version)
        .collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]));

    // The officer heard back from the co-signer, the co-signer was asked.
    let notifications = h.notifications.notifications();
    assert!(notifications.iter().any(|n| n.mottaker == co_signer));
    assert!(notifications.iter().any(|n| n.mottaker == officer));

    let err = h.service.assign(b.id, Some(ident("B100002")), None, None, Some(&leder)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

// ---------------------------------------------------------------------------
// 2. Concurrent edits
// ---------------------------------------------------------------------------

#[test]
fn concurrent_assignments_with_the_same_version_admit_one_winner() {
    let h = harness();
    let b = h.service.create_behandling_from_mottak(&mottak("REF-RACE")).unwrap();
    let leder = ident("L500000");

    let results: Vec<Result<_, ServiceError>> = std::thread::scope(|s| {
        let handles: Vec<_> = ["B100001", "B100002"]
            .into_iter()
            .map(|who| {
                let service = &h.service;
                let leder = &leder;
                s.spawn(move || service.assign(b.id, Some(ident(who)), None, Some(0), Some(leder)))
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(loser.kind(), ErrorKind::ConcurrentModification);
    assert_eq!(h.service.behandling(b.id).unwrap().version, 1);
}

#[test]
fn co_signer_choices_from_the_same_version_do_not_overwrite_each_other() {
    let h = harness();
    let officer = ident("B100001");
    let b = h.service.create_behandling_from_mottak(&mottak("REF-CO")).unwrap();
    let seen = h
        .service
        .assign(b.id, Some(officer.clone()), None, None, Some(&officer))
        .unwrap()
        .version;

    h.service
        .route_to_co_signer(b.id, Some(ident("A200000")), Some(seen), &officer)
        .unwrap();
    let err = h
        .service
        .route_to_co_signer(b.id, Some(ident("C300000")), Some(seen), &ident("B100002"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);

    let current = h.service.behandling(b.id).unwrap();
    assert_eq!(current.version, seen + 1);
    assert_eq!(current.medunderskriver_ident(), Some(&ident("A200000")));

    let err = h.service.set_rol(b.id, Some(ident("R300000")), Some(seen), &officer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    h.service
        .send_to_co_signer(b.id, Some(current.version), &officer)
        .unwrap();
    assert_eq!(h.service.status(b.id).unwrap(), Status::SendtTilMedunderskriver);
}

#[test]
fn rejected_transition_leaves_case_and_events_untouched() {
    let h = harness();
    let b = h.service.create_behandling_from_mottak(&mottak("REF-ATOM")).unwrap();
    let published = h.events.events().len();

    let err = h.service.send_to_co_signer(b.id, None, &ident("B100001")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert_eq!(h.service.behandling(b.id).unwrap(), b);
    assert_eq!(h.events.events().len(), published);
}

// ---------------------------------------------------------------------------
// 3. Event delivery
// ---------------------------------------------------------------------------

#[test]
fn events_held_during_publisher_outage_are_delivered_in_order() {
    let h = harness();
    let officer = ident("B100001");
    h.events.fail_next(100);

    let b = h.service.create_behandling_from_mottak(&mottak("REF-OUT")).unwrap();
    h.service.assign(b.id, Some(officer.clone()), None, None, Some(&officer)).unwrap();
    assert!(h.events.events().is_empty());
    assert_eq!(h.service.pending_events(), 2);

    h.events.fail_next(0);
    assert_eq!(h.service.flush_outbox(), 0);
    assert_eq!(h.service.pending_events(), 0);
    let versions: Vec<u64> = h.events.events().iter().map(|e| e.behandling.version).collect();
    assert_eq!(versions, vec![0, 1]);
}

// ---------------------------------------------------------------------------
// 4. Archive gating
// ---------------------------------------------------------------------------

#[test]
fn infected_attachments_are_stopped_at_upload_and_at_archive() {
    let h = harness();
    let officer = ident("B100001");
    let b = h.service.create_behandling_from_mottak(&mottak("REF-VIR")).unwrap();
    h.service.assign(b.id, Some(officer.clone()), None, None, None).unwrap();
    h.service.set_utfall(b.id, Some(Utfall::Trukket), &officer).unwrap();

    let main = h
        .service
        .upload_document(NyttOpplastetDokument {
            dokument: ny(b.id, "Brev", DokumentType::Brev),
            parent_id: None,
            content: PDFA.to_vec(),
        })
        .unwrap();
    let mut infected = PDFA.to_vec();
    infected.extend_from_slice(EICAR_SIGNATURE);
    let vedlegg = |content: Vec<u8>| NyttOpplastetDokument {
        dokument: ny(b.id, "Vedlegg", DokumentType::Brev),
        parent_id: Some(main.id),
        content,
    };

    // Caught at upload: nothing reaches temporary storage.
    let err = h.service.upload_document(vedlegg(infected.clone())).unwrap_err();
    assert!(matches!(err, ServiceError::Dokument(DokumentError::VirusInfected { .. })));
    assert_eq!(h.mellomlager.stored(), 1);
    assert_eq!(h.service.dokumenter_for(b.id).len(), 1);

    // Missed at upload by an outdated scanner, caught again when archiving.
    h.scanner.outdated.store(true, Ordering::SeqCst);
    h.service.upload_document(vedlegg(infected)).unwrap();
    h.scanner.outdated.store(false, Ordering::SeqCst);
    h.service.finish_document_set(main.id, &officer).unwrap();

    let err = h.service.archive_document_set(main.id, &officer).unwrap_err();
    assert!(matches!(err, ServiceError::Dokument(DokumentError::VirusInfected { .. })));
    assert!(h.arkiv.submissions().is_empty());

    let err = h.service.finalize(b.id, officer.clone(), "Saks Behandler").unwrap_err();
    assert!(matches!(err, ServiceError::UnfinishedDocuments { ref dokument_ids, .. } if dokument_ids.len() == 2));
    assert_eq!(h.service.status(b.id).unwrap(), Status::Tildelt);

    // Dropping the set unblocks finalization.
    assert_eq!(h.service.unmark_finished(main.id).unwrap().len(), 2);
    assert_eq!(h.service.delete_document(main.id).unwrap().len(), 2);
    let done = h.service.finalize(b.id, officer, "Saks Behandler").unwrap();
    assert_eq!(done.status(), Status::Fullfoert);
}
