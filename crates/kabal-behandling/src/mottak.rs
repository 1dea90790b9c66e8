//! # Intake (mottak)
//!
//! An inbound [`Mottak`] describes a case handed over by a first-instance
//! system. It is immutable once received. [`create_behandling_from_mottak`]
//! validates it and maps it to a new, unassigned [`Behandling`].
//!
//! Uniqueness of the source key (fagsystem, fagsakId, kildeReferanse, type)
//! spans all cases and is enforced by the service layer, which owns the
//! case store.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::{
    BehandlingId, FlowState, Klager, MottakId, Prosessfullmektig, SakenGjelder, ValidationError,
};

use crate::behandling::{Behandling, BehandlingType, Saksdokument, SourceKey};
use crate::error::BehandlingError;
use crate::event::{BehandlingEndretEvent, Endringsinnslag, Felt};

/// The role an intake document plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MottakDokumentType {
    /// The appellant's first-tier appeal.
    BrukersKlage,
    /// The appellant's second-tier appeal.
    BrukersAnke,
    /// The appellant's reversal request.
    BrukersOmgjoeringskrav,
    /// The appellant's reopening petition.
    BrukersBegjaeringOmGjenopptak,
    /// Cover letter from the first instance.
    Oversendelsesbrev,
    /// The decision appealed against.
    KlageVedtak,
    /// Any other document.
    #[serde(other)]
    Annet,
}

/// An archived document that came with the intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MottakDokument {
    /// Archive journal post.
    pub journalpost_id: String,
    /// Document within the journal post.
    pub dokument_info_id: String,
    /// The document's role.
    #[serde(rename = "type")]
    pub dokument_type: MottakDokumentType,
}

/// Inbound intake descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mottak {
    /// Intake identity.
    #[serde(default)]
    pub id: MottakId,
    /// Case type to create.
    #[serde(rename = "type")]
    pub behandling_type: BehandlingType,
    /// Benefit area.
    pub ytelse: String,
    /// Originating system.
    pub fagsystem: String,
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Reference supplied by the originating system.
    pub kilde_referanse: String,
    /// The party the case concerns.
    pub saken_gjelder: SakenGjelder,
    /// The appellant. Defaults to the party the case concerns.
    #[serde(default)]
    pub klager: Option<Klager>,
    /// Legal representative.
    #[serde(default)]
    pub prosessfullmektig: Option<Prosessfullmektig>,
    /// Legal bases claimed.
    #[serde(default)]
    pub hjemler: BTreeSet<String>,
    /// When the appeals body received the case.
    pub mottatt_klageinstans: DateTime<Utc>,
    /// Explicit deadline; derived from the case type when absent.
    #[serde(default)]
    pub frist: Option<NaiveDate>,
    /// The earlier case this one continues.
    #[serde(default)]
    pub forrige_behandling_id: Option<BehandlingId>,
    /// Archived documents handed over with the case.
    #[serde(default)]
    pub dokumenter: Vec<MottakDokument>,
}

impl Mottak {
    /// The source-system identity the new case will carry.
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            fagsystem: self.fagsystem.clone(),
            fagsak_id: self.fagsak_id.clone(),
            kilde_referanse: self.kilde_referanse.clone(),
            behandling_type: self.behandling_type,
        }
    }

    /// The deadline for the new case: the explicit one if given, otherwise
    /// the intake date plus the case type's default number of weeks.
    pub fn derived_frist(&self) -> NaiveDate {
        self.frist.unwrap_or_else(|| {
            self.mottatt_klageinstans.date_naive()
                + Duration::weeks(self.behandling_type.frist_weeks())
        })
    }

    /// Check the intake for structural problems.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::Validation`] for blank required fields and
    /// [`BehandlingError::Invalid`] for a future intake date, a deadline
    /// before the intake date, or malformed and duplicate documents.
    pub fn validate(&self) -> Result<(), BehandlingError> {
        for (field, value) in [
            ("ytelse", &self.ytelse),
            ("fagsystem", &self.fagsystem),
            ("fagsakId", &self.fagsak_id),
            ("kildeReferanse", &self.kilde_referanse),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField(field).into());
            }
        }
        if self.hjemler.iter().any(|h| h.trim().is_empty()) {
            return Err(BehandlingError::invalid("hjemler", "entries must not be blank"));
        }
        if self.mottatt_klageinstans > Utc::now() {
            return Err(BehandlingError::invalid(
                "mottattKlageinstans",
                "must not be in the future",
            ));
        }
        if let Some(frist) = self.frist {
            if frist < self.mottatt_klageinstans.date_naive() {
                return Err(BehandlingError::invalid(
                    "frist",
                    format!("{frist} is before the intake date"),
                ));
            }
        }
        let mut seen = HashSet::new();
        for dokument in &self.dokumenter {
            if dokument.journalpost_id.trim().is_empty() || dokument.dokument_info_id.trim().is_empty() {
                return Err(BehandlingError::invalid(
                    "dokumenter",
                    "journalpostId and dokumentInfoId are required",
                ));
            }
            if !seen.insert((&dokument.journalpost_id, &dokument.dokument_info_id)) {
                return Err(BehandlingError::invalid(
                    "dokumenter",
                    format!(
                        "document {}/{} is listed twice",
                        dokument.journalpost_id, dokument.dokument_info_id
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Create a new case from an intake.
///
/// The case starts unassigned (IKKE_TILDELT) at version 0. The returned
/// event carries a single OPPRETTET entry.
///
/// # Errors
///
/// Returns the first problem found by [`Mottak::validate`].
pub fn create_behandling_from_mottak(
    mottak: &Mottak,
) -> Result<(Behandling, BehandlingEndretEvent), BehandlingError> {
    mottak.validate()?;

    let now = Utc::now();
    let klager = mottak.klager.clone().unwrap_or_else(|| Klager {
        part_id: mottak.saken_gjelder.part_id.clone(),
        skal_motta_kopi: mottak.saken_gjelder.skal_motta_kopi,
    });
    let saksdokumenter = mottak
        .dokumenter
        .iter()
        .map(|d| Saksdokument {
            journalpost_id: d.journalpost_id.clone(),
            dokument_info_id: d.dokument_info_id.clone(),
        })
        .collect();

    let behandling = Behandling {
        id: BehandlingId::new(),
        behandling_type: mottak.behandling_type,
        ytelse: mottak.ytelse.clone(),
        fagsystem: mottak.fagsystem.clone(),
        fagsak_id: mottak.fagsak_id.clone(),
        kilde_referanse: mottak.kilde_referanse.clone(),
        mottak_id: Some(mottak.id),
        saken_gjelder: mottak.saken_gjelder.clone(),
        klager,
        prosessfullmektig: mottak.prosessfullmektig.clone(),
        mottatt_klageinstans: mottak.mottatt_klageinstans,
        frist: mottak.derived_frist(),
        hjemler: mottak.hjemler.clone(),
        registreringshjemler: BTreeSet::new(),
        saksdokumenter,
        utfall: None,
        tildeling: None,
        medunderskriver: None,
        medunderskriver_flow_state: FlowState::NotSent,
        rol: None,
        rol_flow_state: FlowState::NotSent,
        satt_paa_vent: None,
        ferdigstilling: None,
        feilregistrering: None,
        forrige_behandling_id: mottak.forrige_behandling_id,
        version: 0,
        created: now,
        modified: now,
        tildeling_historikk: Vec::new(),
        medunderskriver_historikk: Vec::new(),
        satt_paa_vent_historikk: Vec::new(),
    };

    let event = BehandlingEndretEvent {
        behandling: behandling.clone(),
        endringsinnslag: vec![Endringsinnslag::new(
            Felt::Opprettet,
            None,
            Some(behandling.behandling_type.to_string()),
            None,
            now,
        )],
    };
    Ok((behandling, event))
}
