//! # Case Lifecycle
//!
//! The case state machine end to end through its public API: intake,
//! assignment, the co-signer hand-off, holds, finalization and void
//! registration.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use kabal_behandling::{
    create_behandling_from_mottak, derive_status, Behandling, BehandlingError, BehandlingType,
    FinalizeRules, Mottak, Status, Utfall,
};
use kabal_core::{ErrorKind, FlowState, NavIdent, PartId, SakenGjelder};

fn ident(s: &str) -> NavIdent {
    NavIdent::new(s).unwrap()
}

fn mottak(behandling_type: BehandlingType, mottatt: chrono::DateTime<Utc>) -> Mottak {
    Mottak {
        id: Default::default(),
        behandling_type,
        ytelse: "SYK".to_string(),
        fagsystem: "K9".to_string(),
        fagsak_id: "FS-100".to_string(),
        kilde_referanse: "REF-100".to_string(),
        saken_gjelder: SakenGjelder {
            part_id: PartId::person("12345678901").unwrap(),
            skal_motta_kopi: false,
        },
        klager: None,
        prosessfullmektig: None,
        hjemler: Default::default(),
        mottatt_klageinstans: mottatt,
        frist: None,
        forrige_behandling_id: None,
        dokumenter: Vec::new(),
    }
}

fn new_case(behandling_type: BehandlingType) -> Behandling {
    let mottatt = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    create_behandling_from_mottak(&mottak(behandling_type, mottatt))
        .unwrap()
        .0
}

fn finalized_case() -> Behandling {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    b.set_utfall(Some(Utfall::Trukket), &officer).unwrap();
    b.finalize(Utc::now(), officer, "Saks Behandler", &FinalizeRules::default())
        .unwrap();
    b
}

// ---------------------------------------------------------------------------
// 1. Intake and deadlines
// ---------------------------------------------------------------------------

#[test]
fn klage_deadline_is_twelve_weeks_after_intake() {
    let b = new_case(BehandlingType::Klage);
    assert_eq!(b.frist, NaiveDate::from_ymd_opt(2024, 3, 25).unwrap());
    assert_eq!(b.status(), Status::IkkeTildelt);
    assert_eq!(b.version, 0);
}

#[test]
fn anke_deadline_is_the_intake_date() {
    let b = new_case(BehandlingType::Anke);
    assert_eq!(b.frist, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
}

#[test]
fn explicit_deadline_wins() {
    let mottatt = Utc::now() - Duration::days(3);
    let mut m = mottak(BehandlingType::Klage, mottatt);
    let frist = mottatt.date_naive() + Duration::days(30);
    m.frist = Some(frist);
    let (b, event) = create_behandling_from_mottak(&m).unwrap();
    assert_eq!(b.frist, frist);
    assert_eq!(event.endringsinnslag.len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Assignment and optimistic locking
// ---------------------------------------------------------------------------

#[test]
fn stale_expected_version_is_rejected_without_change() {
    let mut b = new_case(BehandlingType::Klage);
    let err = b.assign(Some(ident("B100001")), None, Some(1), None).unwrap_err();
    assert!(matches!(
        err,
        BehandlingError::ConcurrentModification { expected: 1, actual: 0, .. }
    ));
    assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    assert_eq!(b.status(), Status::IkkeTildelt);
    assert_eq!(b.version, 0);
}

#[test]
fn matching_version_assigns_and_records_history() {
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(ident("B100001")), Some("4291".into()), Some(0), None).unwrap();
    assert_eq!(b.status(), Status::Tildelt);
    assert_eq!(b.version, 1);
    b.assign(None, None, Some(1), None).unwrap();
    assert_eq!(b.status(), Status::IkkeTildelt);
    assert_eq!(b.tildeling_historikk().len(), 2);
}

// ---------------------------------------------------------------------------
// 3. Co-signer hand-off
// ---------------------------------------------------------------------------

#[test]
fn co_signer_round_trip() {
    let officer = ident("B100001");
    let co_signer = ident("A200000");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();

    b.route_to_co_signer(Some(co_signer.clone()), None, &officer).unwrap();
    assert_eq!(b.status(), Status::MedunderskriverValgt);
    assert_eq!(b.medunderskriver_flow_state, FlowState::NotSent);

    b.send_to_co_signer(None, &officer).unwrap();
    assert_eq!(b.status(), Status::SendtTilMedunderskriver);

    b.return_from_co_signer(None, &co_signer).unwrap();
    assert_eq!(b.status(), Status::ReturnertTilSaksbehandler);

    b.send_to_co_signer(None, &officer).unwrap();
    assert_eq!(b.status(), Status::SendtTilMedunderskriver);
    assert!(b.medunderskriver_historikk().len() >= 4);
}

#[test]
fn sending_without_co_signer_fails() {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    let err = b.send_to_co_signer(None, &officer).unwrap_err();
    assert!(matches!(err, BehandlingError::ManglerMedunderskriver { .. }));
}

#[test]
fn rerouting_to_the_same_co_signer_is_a_no_op() {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    b.route_to_co_signer(Some(ident("A200000")), None, &officer).unwrap();
    let version = b.version;
    let event = b.route_to_co_signer(Some(ident("A200000")), None, &officer).unwrap();
    assert!(event.is_empty());
    assert_eq!(b.version, version);
}

#[test]
fn finalize_is_blocked_while_the_co_signer_holds_the_case() {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    b.set_utfall(Some(Utfall::Trukket), &officer).unwrap();
    b.route_to_co_signer(Some(ident("A200000")), None, &officer).unwrap();
    b.send_to_co_signer(None, &officer).unwrap();
    let err = b
        .finalize(Utc::now(), officer, "Saks Behandler", &FinalizeRules::default())
        .unwrap_err();
    assert!(matches!(err, BehandlingError::MedunderskriverHarSaken { .. }));
}

#[test]
fn configured_types_need_a_returned_co_signer_decision() {
    let officer = ident("B100001");
    let rules = FinalizeRules::requiring_medunderskriver_for([BehandlingType::Anke]);
    let mut b = new_case(BehandlingType::Anke);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    b.set_utfall(Some(Utfall::Trukket), &officer).unwrap();
    let err = b
        .finalize(Utc::now(), officer.clone(), "Saks Behandler", &rules)
        .unwrap_err();
    assert!(matches!(err, BehandlingError::ManglerMedunderskriver { .. }));

    let co_signer = ident("A200000");
    b.route_to_co_signer(Some(co_signer.clone()), None, &officer).unwrap();
    b.send_to_co_signer(None, &officer).unwrap();
    b.return_from_co_signer(None, &co_signer).unwrap();
    b.finalize(Utc::now(), officer, "Saks Behandler", &rules).unwrap();
    assert_eq!(b.status(), Status::Fullfoert);
}

// ---------------------------------------------------------------------------
// 4. Holds
// ---------------------------------------------------------------------------

#[test]
fn hold_and_release_keep_history() {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(officer.clone()), None, None, None).unwrap();
    let from = Utc::now().date_naive();
    b.put_on_hold(from, from + Duration::days(14), "1", None, &officer).unwrap();
    assert_eq!(b.status(), Status::SattPaaVent);

    let err = b
        .put_on_hold(from, from + Duration::days(7), "1", None, &officer)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);

    b.take_off_hold(&officer).unwrap();
    assert_eq!(b.status(), Status::Tildelt);
    assert_eq!(b.satt_paa_vent_historikk().len(), 2);
}

#[test]
fn hold_with_reversed_dates_is_invalid() {
    let officer = ident("B100001");
    let mut b = new_case(BehandlingType::Klage);
    let from = Utc::now().date_naive();
    let err = b
        .put_on_hold(from, from - Duration::days(1), "1", None, &officer)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(b.satt_paa_vent.is_none());
}

// ---------------------------------------------------------------------------
// 5. Terminal states
// ---------------------------------------------------------------------------

#[test]
fn finalized_case_rejects_further_changes() {
    let mut b = finalized_case();
    assert_eq!(derive_status(&b), Status::Fullfoert);

    let err = b.assign(Some(ident("B100002")), None, None, None).unwrap_err();
    assert!(matches!(err, BehandlingError::Avsluttet { .. }));

    let from = Utc::now().date_naive();
    let err = b
        .put_on_hold(from, from + Duration::days(1), "1", None, &ident("B100001"))
        .unwrap_err();
    assert!(matches!(err, BehandlingError::Avsluttet { .. }));

    let err = b
        .finalize(Utc::now(), ident("B100001"), "Saks Behandler", &FinalizeRules::default())
        .unwrap_err();
    assert!(matches!(err, BehandlingError::Avsluttet { .. }));
}

#[test]
fn feilregistrering_requires_an_unassigned_case() {
    let mut b = new_case(BehandlingType::Klage);
    b.assign(Some(ident("B100001")), None, None, None).unwrap();
    let err = b.feilregistrer("duplikat", ident("B100001"), "K9").unwrap_err();
    assert!(matches!(err, BehandlingError::IllegalUpdate { .. }));

    b.assign(None, None, None, None).unwrap();
    b.feilregistrer("duplikat", ident("B100001"), "K9").unwrap();
    assert_eq!(b.status(), Status::Feilregistrert);
    assert!(b.is_terminal());
}

#[test]
fn feilregistrert_dominates_every_other_field() {
    let mut b = new_case(BehandlingType::Klage);
    let from = Utc::now().date_naive();
    b.put_on_hold(from, from + Duration::days(3), "2", None, &ident("B100001"))
        .unwrap();
    b.feilregistrer("sendt feil", ident("B100001"), "K9").unwrap();
    assert_eq!(b.status(), Status::Feilregistrert);

    let err = b.take_off_hold(&ident("B100001")).unwrap_err();
    assert!(matches!(err, BehandlingError::Feilregistrert { .. }));
}

#[test]
fn case_survives_a_json_round_trip() {
    let b = finalized_case();
    let json = serde_json::to_string(&b).unwrap();
    let back: Behandling = serde_json::from_str(&json).unwrap();
    assert_eq!(back, b);
    assert_eq!(back.status(), Status::Fullfoert);
}
