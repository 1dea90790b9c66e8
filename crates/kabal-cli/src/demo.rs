//! # Demo Flow — `kabal demo`
//!
//! Runs one appeal from intake to closing through [`KabalService`] with
//! in-memory collaborators, printing the case status after every step.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Args;
use serde::Serialize;

use kabal_behandling::{Behandling, BehandlingType, Mottak, Status, Utfall};
use kabal_core::{NavIdent, PartId, SakenGjelder};
use kabal_dokument::{CreatorRole, DokumentType, NyttDokument};
use kabal_gateway::memory::{
    InMemoryArkiv, InMemoryKvalitetsvurdering, RecordingEventPublisher,
    RecordingNotificationSink,
};
use kabal_service::{Collaborators, KabalConfig, KabalService, NyttOpplastetDokument, NyttSmartDokument};

/// Demo arguments.
#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Case type to run.
    #[arg(long, default_value = "KLAGE")]
    pub behandling_type: BehandlingType,

    /// Print a JSON report instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// One step of the demo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoStep {
    pub step: &'static str,
    pub status: Status,
    pub version: u64,
}

/// Outcome of a demo run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    pub steps: Vec<DemoStep>,
    pub events_published: usize,
    pub notifications_sent: usize,
    pub journalposter: usize,
    pub kvalitetsvurderinger: usize,
}

/// Execute the demo subcommand.
pub fn run_demo(args: &DemoArgs, config: KabalConfig) -> Result<u8> {
    let report = demo_flow(args.behandling_type, config)?;
    if args.json {
        crate::write_json(&report, None)?;
    } else {
        for step in &report.steps {
            println!("{:<22} {:<28} v{}", step.step, step.status, step.version);
        }
        println!();
        println!(
            "events: {}  notifications: {}  journalposter: {}  kvalitetsvurderinger: {}",
            report.events_published,
            report.notifications_sent,
            report.journalposter,
            report.kvalitetsvurderinger
        );
    }
    Ok(0)
}

/// Run the flow and collect the report.
pub fn demo_flow(behandling_type: BehandlingType, config: KabalConfig) -> Result<DemoReport> {
    let arkiv = Arc::new(InMemoryArkiv::new());
    let kvalitetsvurdering = Arc::new(InMemoryKvalitetsvurdering::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let notifications = Arc::new(RecordingNotificationSink::new());
    let collaborators = Collaborators {
        arkiv: arkiv.clone(),
        kvalitetsvurdering: kvalitetsvurdering.clone(),
        event_publisher: events.clone(),
        notification_sink: notifications.clone(),
        ..Collaborators::in_memory()
    };
    let service = KabalService::new(config, collaborators);

    let leder = NavIdent::new("L500000")?;
    let saksbehandler = NavIdent::new("B100001")?;
    let medunderskriver = NavIdent::new("A200000")?;

    let mut steps = Vec::new();
    let mut record = |step: &'static str, b: &Behandling| {
        tracing::info!(step, status = %b.status(), version = b.version, "demo step");
        steps.push(DemoStep {
            step,
            status: b.status(),
            version: b.version,
        });
    };

    let mottak = Mottak {
        id: Default::default(),
        behandling_type,
        ytelse: "SYK".to_string(),
        fagsystem: "K9".to_string(),
        fagsak_id: "DEMO-1".to_string(),
        kilde_referanse: "DEMO-REF-1".to_string(),
        saken_gjelder: SakenGjelder {
            part_id: PartId::person("12345678901")?,
            skal_motta_kopi: false,
        },
        klager: None,
        prosessfullmektig: None,
        hjemler: ["FTRL_8_4".to_string()].into(),
        mottatt_klageinstans: Utc::now() - Duration::days(14),
        frist: None,
        forrige_behandling_id: None,
        dokumenter: Vec::new(),
    };
    let b = service.create_behandling_from_mottak(&mottak)?;
    let id = b.id;
    record("opprettet", &b);

    let b = service.assign(id, Some(saksbehandler.clone()), Some("4291".into()), Some(b.version), Some(&leder))?;
    record("tildelt", &b);
    let b = service.route_to_co_signer(id, Some(medunderskriver.clone()), None, &saksbehandler)?;
    record("medunderskriver valgt", &b);
    let b = service.send_to_co_signer(id, None, &saksbehandler)?;
    record("sendt", &b);
    let b = service.return_from_co_signer(id, None, &medunderskriver)?;
    record("returnert", &b);
    service.set_registreringshjemler(id, ["FTRL_8_4".to_string()], &saksbehandler)?;
    let b = service.set_utfall(id, Some(Utfall::Stadfestelse), &saksbehandler)?;
    record("utfall satt", &b);

    let ny = |name: &str, dokument_type: DokumentType| NyttDokument {
        behandling_id: id,
        name: name.to_string(),
        dokument_type,
        creator_ident: saksbehandler.clone(),
        creator_role: CreatorRole::Saksbehandler,
    };
    let vedtak = service.create_smart_document(NyttSmartDokument {
        dokument: ny("Vedtak", DokumentType::Vedtak),
        parent_id: None,
        template_id: "klagevedtak".to_string(),
        content: serde_json::json!({ "utfall": Utfall::Stadfestelse }),
    })?;
    service.upload_document(NyttOpplastetDokument {
        dokument: ny("Legeerklaering", DokumentType::Annet),
        parent_id: Some(vedtak.id),
        content: b"%PDF-1.7\n% pdfaid:part=2\nlegeerklaering".to_vec(),
    })?;
    service.finish_document_set(vedtak.id, &saksbehandler)?;
    service
        .archive_document_set(vedtak.id, &saksbehandler)
        .context("archiving the decision failed")?;
    record("vedtak arkivert", &service.behandling(id)?);

    let b = service.finalize(id, saksbehandler.clone(), "Saks Behandler")?;
    record("fullfoert", &b);

    Ok(DemoReport {
        steps,
        events_published: events.events().len(),
        notifications_sent: notifications.notifications().len(),
        journalposter: arkiv.submissions().len(),
        kvalitetsvurderinger: kvalitetsvurdering.exports().len(),
    })
}
