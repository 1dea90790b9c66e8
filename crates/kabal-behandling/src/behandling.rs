//! # Case Aggregate
//!
//! A [`Behandling`] is one appeal case. It moves through a multi-actor
//! workflow:
//!
//! ```text
//! IKKE_TILDELT ─assign─▶ TILDELT ─route─▶ MEDUNDERSKRIVER_VALGT
//!                                              │ send
//!                                              ▼
//!            RETURNERT_TIL_SAKSBEHANDLER ◀─return─ SENDT_TIL_MEDUNDERSKRIVER
//!                         │                        ▲
//!                         └─────────send───────────┘
//!
//! any open status ──finalize──▶ FULLFOERT
//! unassigned open status ──feilregistrer──▶ FEILREGISTRERT
//! ```
//!
//! The status itself is derived (see [`crate::status`]); this module owns
//! the fields that drive it and the rules for changing them.
//!
//! ## Design
//!
//! Each transition is a dedicated method that validates every precondition
//! before touching any field, so a rejected call leaves the case exactly as
//! it was. A successful call bumps [`Behandling::version`] and returns a
//! [`BehandlingEndretEvent`] describing the change. A call that would change
//! nothing returns an empty event and leaves the version alone.
//!
//! Once `ferdigstilling` or `feilregistrering` is set the case is terminal
//! and every status-affecting operation is rejected.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::{
    BehandlingId, FlowState, Klager, MedunderskriverHistorikk, MedunderskriverTildeling, MottakId,
    NavIdent, Prosessfullmektig, RolTildeling, SakenGjelder, Tildeling, TildelingHistorikk,
};

use crate::error::BehandlingError;
use crate::event::{BehandlingEndretEvent, Endringsinnslag, Felt};
use crate::rules::FinalizeRules;
use crate::status::{derive_status, Status};
use crate::vent::{SattPaaVent, SattPaaVentHistorikk};

// ── Case Type ──────────────────────────────────────────────────────────

/// The kind of appeal a case handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehandlingType {
    /// First-tier appeal.
    Klage,
    /// Second-tier appeal.
    Anke,
    /// Request to reverse a decision.
    Omgjoeringskrav,
    /// Petition to reopen a decided case.
    BegjaeringOmGjenopptak,
}

impl BehandlingType {
    /// All case types as a slice.
    pub fn all() -> &'static [BehandlingType] {
        &[
            Self::Klage,
            Self::Anke,
            Self::Omgjoeringskrav,
            Self::BegjaeringOmGjenopptak,
        ]
    }

    /// The canonical string name of this case type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Klage => "KLAGE",
            Self::Anke => "ANKE",
            Self::Omgjoeringskrav => "OMGJOERINGSKRAV",
            Self::BegjaeringOmGjenopptak => "BEGJAERING_OM_GJENOPPTAK",
        }
    }

    /// Default processing deadline in weeks after intake.
    pub fn frist_weeks(&self) -> i64 {
        match self {
            Self::Anke => 0,
            Self::Klage | Self::Omgjoeringskrav | Self::BegjaeringOmGjenopptak => 12,
        }
    }
}

impl std::fmt::Display for BehandlingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehandlingType {
    type Err = BehandlingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BehandlingError::invalid("type", format!("unknown behandling type {s:?}")))
    }
}

// ── Outcome ────────────────────────────────────────────────────────────

/// The outcome of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Utfall {
    /// The appellant withdrew.
    Trukket,
    /// Sent back to the first instance without a decision.
    Retur,
    /// The decision is set aside.
    Opphevet,
    /// The appellant is upheld.
    Medhold,
    /// The appellant is partly upheld.
    DelvisMedhold,
    /// The decision stands.
    Stadfestelse,
    /// Changed to the appellant's disadvantage.
    Ugunst,
    /// The appeal is dismissed.
    Avvist,
    /// Recommendation to uphold, for the national insurance court.
    InnstillingStadfestelse,
    /// Recommendation to dismiss, for the national insurance court.
    InnstillingAvvist,
}

impl Utfall {
    /// The canonical string name of this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trukket => "TRUKKET",
            Self::Retur => "RETUR",
            Self::Opphevet => "OPPHEVET",
            Self::Medhold => "MEDHOLD",
            Self::DelvisMedhold => "DELVIS_MEDHOLD",
            Self::Stadfestelse => "STADFESTELSE",
            Self::Ugunst => "UGUNST",
            Self::Avvist => "AVVIST",
            Self::InnstillingStadfestelse => "INNSTILLING_STADFESTELSE",
            Self::InnstillingAvvist => "INNSTILLING_AVVIST",
        }
    }

    /// Whether legal bases must be registered before finalizing with this
    /// outcome.
    pub fn requires_registreringshjemler(&self) -> bool {
        !matches!(self, Self::Trukket | Self::Retur)
    }
}

impl std::fmt::Display for Utfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Value Objects ──────────────────────────────────────────────────────

/// A reference to an archived document the case relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Saksdokument {
    /// Archive journal post.
    pub journalpost_id: String,
    /// Document within the journal post.
    pub dokument_info_id: String,
}

impl std::fmt::Display for Saksdokument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.journalpost_id, self.dokument_info_id)
    }
}

/// The source-system identity of a case. Unique across all cases.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    /// Originating system.
    pub fagsystem: String,
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Reference supplied by the originating system.
    pub kilde_referanse: String,
    /// Case type.
    pub behandling_type: BehandlingType,
}

/// Finalization record. Its presence makes the case FULLFOERT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ferdigstilling {
    /// When the case officer signed off.
    pub avsluttet_av_saksbehandler: DateTime<Utc>,
    /// The signing case officer.
    pub nav_ident: NavIdent,
    /// Display name of the signing case officer.
    pub navn: String,
    /// When downstream processing (archive, quality review) completed.
    pub avsluttet: Option<DateTime<Utc>>,
}

/// Void registration. Its presence makes the case FEILREGISTRERT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feilregistrering {
    /// Who registered the case as void.
    pub nav_ident: NavIdent,
    /// When it was registered.
    pub registered: DateTime<Utc>,
    /// Why the case is void.
    pub reason: String,
    /// The originating system to notify.
    pub fagsystem: String,
}

// ── Aggregate ──────────────────────────────────────────────────────────

/// An appeal case.
///
/// Fields are public for reading and for building fixtures; production
/// code changes a case only through the transition methods, which keep
/// the history lists and the version counter consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behandling {
    /// Immutable identity.
    pub id: BehandlingId,
    /// Case type.
    #[serde(rename = "type")]
    pub behandling_type: BehandlingType,
    /// Benefit area the case concerns.
    pub ytelse: String,
    /// Originating system.
    pub fagsystem: String,
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Reference supplied by the originating system.
    pub kilde_referanse: String,
    /// The intake this case was created from.
    pub mottak_id: Option<MottakId>,
    /// The person or organization the case is about.
    pub saken_gjelder: SakenGjelder,
    /// The appellant.
    pub klager: Klager,
    /// Legal representative.
    pub prosessfullmektig: Option<Prosessfullmektig>,
    /// When the appeals body received the case.
    pub mottatt_klageinstans: DateTime<Utc>,
    /// Processing deadline.
    pub frist: NaiveDate,
    /// Legal bases claimed at intake.
    pub hjemler: BTreeSet<String>,
    /// Legal bases registered by the case officer.
    pub registreringshjemler: BTreeSet<String>,
    /// Archived documents linked to the case.
    pub saksdokumenter: BTreeSet<Saksdokument>,
    /// Outcome.
    pub utfall: Option<Utfall>,
    /// Case-officer assignment.
    pub tildeling: Option<Tildeling>,
    /// Co-signer assignment.
    pub medunderskriver: Option<MedunderskriverTildeling>,
    /// Co-signer hand-off state.
    pub medunderskriver_flow_state: FlowState,
    /// Medical advisor assignment.
    pub rol: Option<RolTildeling>,
    /// Medical advisor hand-off state.
    pub rol_flow_state: FlowState,
    /// Current hold.
    pub satt_paa_vent: Option<SattPaaVent>,
    /// Finalization record.
    pub ferdigstilling: Option<Ferdigstilling>,
    /// Void registration.
    pub feilregistrering: Option<Feilregistrering>,
    /// The case this one continues, e.g. the KLAGE behind an ANKE.
    pub forrige_behandling_id: Option<BehandlingId>,
    /// Optimistic-lock counter; +1 per successful mutation.
    pub version: u64,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub(crate) tildeling_historikk: Vec<TildelingHistorikk>,
    #[serde(default)]
    pub(crate) medunderskriver_historikk: Vec<MedunderskriverHistorikk>,
    #[serde(default)]
    pub(crate) satt_paa_vent_historikk: Vec<SattPaaVentHistorikk>,
}

impl Behandling {
    // ── Queries ─────────────────────────────────────────────────────

    /// The derived status.
    pub fn status(&self) -> Status {
        derive_status(self)
    }

    /// Whether the case accepts no further status-affecting change.
    pub fn is_terminal(&self) -> bool {
        self.ferdigstilling.is_some() || self.feilregistrering.is_some()
    }

    /// The source-system identity of this case.
    pub fn source_key(&self) -> SourceKey {
        SourceKey {
            fagsystem: self.fagsystem.clone(),
            fagsak_id: self.fagsak_id.clone(),
            kilde_referanse: self.kilde_referanse.clone(),
            behandling_type: self.behandling_type,
        }
    }

    /// The assigned case officer, if any.
    pub fn saksbehandler(&self) -> Option<&NavIdent> {
        self.tildeling.as_ref().and_then(|t| t.saksbehandlerident.as_ref())
    }

    /// The chosen co-signer, if any.
    pub fn medunderskriver_ident(&self) -> Option<&NavIdent> {
        self.medunderskriver
            .as_ref()
            .and_then(|m| m.saksbehandlerident.as_ref())
    }

    /// The chosen medical advisor, if any.
    pub fn rol_ident(&self) -> Option<&NavIdent> {
        self.rol.as_ref().and_then(|r| r.rol_ident.as_ref())
    }

    /// Case-officer assignment history, oldest first.
    pub fn tildeling_historikk(&self) -> &[TildelingHistorikk] {
        &self.tildeling_historikk
    }

    /// Co-signer history, oldest first.
    pub fn medunderskriver_historikk(&self) -> &[MedunderskriverHistorikk] {
        &self.medunderskriver_historikk
    }

    /// Hold history, oldest first.
    pub fn satt_paa_vent_historikk(&self) -> &[SattPaaVentHistorikk] {
        &self.satt_paa_vent_historikk
    }

    /// Check the caller's expected version against the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::ConcurrentModification`] on mismatch.
    pub fn check_version(&self, expected: Option<u64>) -> Result<(), BehandlingError> {
        match expected {
            Some(expected) if expected != self.version => {
                Err(BehandlingError::ConcurrentModification {
                    behandling_id: self.id,
                    expected,
                    actual: self.version,
                })
            }
            _ => Ok(()),
        }
    }

    // ── Assignment ──────────────────────────────────────────────────

    /// Assign the case to a case officer, or release it with `None`.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::ConcurrentModification`] when `expected_version`
    ///   is given and stale. Checked first.
    /// - [`BehandlingError::Avsluttet`] / [`BehandlingError::Feilregistrert`]
    ///   on a terminal case.
    /// - [`BehandlingError::IllegalUpdate`] when the new officer is the
    ///   chosen co-signer.
    pub fn assign(
        &mut self,
        saksbehandlerident: Option<NavIdent>,
        enhet: Option<String>,
        expected_version: Option<u64>,
        utfoerende_ident: Option<&NavIdent>,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;

        let enhet = if saksbehandlerident.is_some() { enhet } else { None };
        let current_enhet = self.tildeling.as_ref().and_then(|t| t.enhet.clone());
        if self.saksbehandler() == saksbehandlerident.as_ref() && current_enhet == enhet {
            return Ok(self.commit(Vec::new()));
        }
        if let Some(ident) = &saksbehandlerident {
            if self.medunderskriver_ident() == Some(ident) {
                return Err(BehandlingError::IllegalUpdate {
                    behandling_id: self.id,
                    reason: format!("{ident} is the chosen co-signer"),
                });
            }
        }

        let now = Utc::now();
        let fra = render(self.saksbehandler());
        let til = render(saksbehandlerident.as_ref());
        let tildeling = Tildeling {
            saksbehandlerident,
            enhet,
            tidspunkt: now,
        };
        self.tildeling_historikk.push(TildelingHistorikk {
            tildeling: tildeling.clone(),
            utfoerende_ident: utfoerende_ident.cloned(),
        });
        self.tildeling = Some(tildeling);

        let innslag = Endringsinnslag::new(Felt::Tildeling, fra, til, utfoerende_ident, now);
        Ok(self.commit(vec![innslag]))
    }

    // ── Co-signer Flow ──────────────────────────────────────────────

    /// Choose the co-signer, or clear it with `None`. The flow reverts to
    /// NOT_SENT. Choosing the current co-signer again is a no-op.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::ConcurrentModification`] when `expected_version`
    ///   is given and stale. Checked first.
    /// - [`BehandlingError::MedunderskriverHarSaken`] while the co-signer
    ///   holds the case.
    /// - [`BehandlingError::IllegalUpdate`] when the co-signer would be the
    ///   assigned case officer.
    pub fn route_to_co_signer(
        &mut self,
        ident: Option<NavIdent>,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        if self.medunderskriver_ident() == ident.as_ref() {
            return Ok(self.commit(Vec::new()));
        }
        if self.medunderskriver_flow_state == FlowState::Sent {
            return Err(BehandlingError::MedunderskriverHarSaken {
                behandling_id: self.id,
            });
        }
        if let Some(ident) = &ident {
            if self.saksbehandler() == Some(ident) {
                return Err(BehandlingError::IllegalUpdate {
                    behandling_id: self.id,
                    reason: format!("{ident} is the assigned case officer"),
                });
            }
        }

        let now = Utc::now();
        let mut innslag = vec![Endringsinnslag::new(
            Felt::Medunderskriverident,
            render(self.medunderskriver_ident()),
            render(ident.as_ref()),
            Some(utfoerende_ident),
            now,
        )];
        if self.medunderskriver_flow_state != FlowState::NotSent {
            innslag.push(Endringsinnslag::new(
                Felt::MedunderskriverFlowState,
                Some(self.medunderskriver_flow_state.to_string()),
                Some(FlowState::NotSent.to_string()),
                Some(utfoerende_ident),
                now,
            ));
        }

        self.medunderskriver = Some(MedunderskriverTildeling {
            saksbehandlerident: ident,
            tidspunkt: now,
        });
        self.medunderskriver_flow_state = FlowState::NotSent;
        self.record_medunderskriver(now);
        Ok(self.commit(innslag))
    }

    /// Hand the case to the chosen co-signer.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::ConcurrentModification`] on a stale
    ///   `expected_version`.
    /// - [`BehandlingError::ManglerMedunderskriver`] when no co-signer is
    ///   chosen.
    /// - [`BehandlingError::InvalidFlowTransition`] when already SENT.
    pub fn send_to_co_signer(
        &mut self,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        if self.medunderskriver_ident().is_none() {
            return Err(BehandlingError::ManglerMedunderskriver {
                behandling_id: self.id,
                reason: "no co-signer is chosen".to_string(),
            });
        }
        self.move_medunderskriver_flow(FlowState::Sent, utfoerende_ident)
    }

    /// The co-signer hands the case back to the case officer.
    ///
    /// # Errors
    ///
    /// [`BehandlingError::ConcurrentModification`] on a stale
    /// `expected_version`, otherwise
    /// [`BehandlingError::InvalidFlowTransition`] unless SENT.
    pub fn return_from_co_signer(
        &mut self,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        self.move_medunderskriver_flow(FlowState::Returned, utfoerende_ident)
    }

    fn move_medunderskriver_flow(
        &mut self,
        to: FlowState,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        let from = self.medunderskriver_flow_state;
        if !flow_transition_allowed(from, to) {
            return Err(BehandlingError::InvalidFlowTransition {
                behandling_id: self.id,
                flow: "medunderskriver",
                from,
                to,
            });
        }
        let now = Utc::now();
        self.medunderskriver_flow_state = to;
        self.record_medunderskriver(now);
        let innslag = Endringsinnslag::new(
            Felt::MedunderskriverFlowState,
            Some(from.to_string()),
            Some(to.to_string()),
            Some(utfoerende_ident),
            now,
        );
        Ok(self.commit(vec![innslag]))
    }

    fn record_medunderskriver(&mut self, tidspunkt: DateTime<Utc>) {
        self.medunderskriver_historikk.push(MedunderskriverHistorikk {
            medunderskriver: self.medunderskriver_ident().cloned(),
            flow_state: self.medunderskriver_flow_state,
            tidspunkt,
        });
    }

    // ── Medical Advisor Flow ────────────────────────────────────────

    /// Choose the medical advisor, or clear it with `None`.
    ///
    /// While the case is SENT to the advisor pool without a named advisor,
    /// an advisor may be named without leaving SENT. Otherwise the flow
    /// reverts to NOT_SENT.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::ConcurrentModification`] on a stale
    ///   `expected_version`.
    /// - [`BehandlingError::RolHarSaken`] when a named advisor holds the
    ///   case.
    pub fn set_rol(
        &mut self,
        ident: Option<NavIdent>,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        if self.rol_ident() == ident.as_ref() {
            return Ok(self.commit(Vec::new()));
        }
        let picking_from_pool =
            self.rol_flow_state == FlowState::Sent && self.rol_ident().is_none() && ident.is_some();
        if self.rol_flow_state == FlowState::Sent && !picking_from_pool {
            return Err(BehandlingError::RolHarSaken {
                behandling_id: self.id,
            });
        }

        let now = Utc::now();
        let mut innslag = vec![Endringsinnslag::new(
            Felt::RolIdent,
            render(self.rol_ident()),
            render(ident.as_ref()),
            Some(utfoerende_ident),
            now,
        )];
        let next_flow = if picking_from_pool {
            FlowState::Sent
        } else {
            FlowState::NotSent
        };
        if self.rol_flow_state != next_flow {
            innslag.push(Endringsinnslag::new(
                Felt::RolFlowState,
                Some(self.rol_flow_state.to_string()),
                Some(next_flow.to_string()),
                Some(utfoerende_ident),
                now,
            ));
        }
        self.rol = Some(RolTildeling {
            rol_ident: ident,
            tidspunkt: now,
        });
        self.rol_flow_state = next_flow;
        Ok(self.commit(innslag))
    }

    /// Hand the case to the medical advisor. A named advisor is optional.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::InvalidFlowTransition`] when already SENT.
    pub fn send_to_rol(
        &mut self,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        self.move_rol_flow(FlowState::Sent, utfoerende_ident)
    }

    /// The medical advisor hands the case back.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::InvalidFlowTransition`] unless SENT.
    pub fn return_from_rol(
        &mut self,
        expected_version: Option<u64>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.check_version(expected_version)?;
        self.ensure_open()?;
        self.move_rol_flow(FlowState::Returned, utfoerende_ident)
    }

    fn move_rol_flow(
        &mut self,
        to: FlowState,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        let from = self.rol_flow_state;
        if !flow_transition_allowed(from, to) {
            return Err(BehandlingError::InvalidFlowTransition {
                behandling_id: self.id,
                flow: "rol",
                from,
                to,
            });
        }
        let now = Utc::now();
        self.rol_flow_state = to;
        let innslag = Endringsinnslag::new(
            Felt::RolFlowState,
            Some(from.to_string()),
            Some(to.to_string()),
            Some(utfoerende_ident),
            now,
        );
        Ok(self.commit(vec![innslag]))
    }

    // ── Holds ───────────────────────────────────────────────────────

    /// Put the case on hold for `from..=to`.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::Invalid`] for a bad window or reason.
    /// - [`BehandlingError::IllegalOperation`] when already on hold.
    pub fn put_on_hold(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
        reason_id: &str,
        reason: Option<String>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if self.satt_paa_vent.is_some() {
            return Err(BehandlingError::IllegalOperation {
                behandling_id: self.id,
                operation: "putOnHold",
                reason: "the case is already on hold".to_string(),
            });
        }
        let hold = SattPaaVent::new(from, to, reason_id, reason)?;

        let now = Utc::now();
        let til = Some(format!("{}..{} ({})", hold.from, hold.to, hold.reason_id));
        self.satt_paa_vent_historikk.push(SattPaaVentHistorikk {
            satt_paa_vent: Some(hold.clone()),
            tidspunkt: now,
            utfoerende_ident: utfoerende_ident.clone(),
        });
        self.satt_paa_vent = Some(hold);
        let innslag = Endringsinnslag::new(Felt::SattPaaVent, None, til, Some(utfoerende_ident), now);
        Ok(self.commit(vec![innslag]))
    }

    /// Take the case off hold.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::IllegalOperation`] when not on hold.
    pub fn take_off_hold(
        &mut self,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        let Some(hold) = self.satt_paa_vent.take() else {
            return Err(BehandlingError::IllegalOperation {
                behandling_id: self.id,
                operation: "takeOffHold",
                reason: "the case is not on hold".to_string(),
            });
        };

        let now = Utc::now();
        self.satt_paa_vent_historikk.push(SattPaaVentHistorikk {
            satt_paa_vent: None,
            tidspunkt: now,
            utfoerende_ident: utfoerende_ident.clone(),
        });
        let fra = Some(format!("{}..{} ({})", hold.from, hold.to, hold.reason_id));
        let innslag = Endringsinnslag::new(Felt::SattPaaVent, fra, None, Some(utfoerende_ident), now);
        Ok(self.commit(vec![innslag]))
    }

    // ── Case Data ───────────────────────────────────────────────────

    /// Set or clear the outcome.
    pub fn set_utfall(
        &mut self,
        utfall: Option<Utfall>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if self.utfall == utfall {
            return Ok(self.commit(Vec::new()));
        }
        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::Utfall,
            render(self.utfall.as_ref()),
            render(utfall.as_ref()),
            Some(utfoerende_ident),
            now,
        );
        self.utfall = utfall;
        Ok(self.commit(vec![innslag]))
    }

    /// Replace the registered legal bases.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::Invalid`] when any entry is blank.
    pub fn set_registreringshjemler(
        &mut self,
        hjemler: BTreeSet<String>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if hjemler.iter().any(|h| h.trim().is_empty()) {
            return Err(BehandlingError::invalid(
                "registreringshjemler",
                "entries must not be blank",
            ));
        }
        if self.registreringshjemler == hjemler {
            return Ok(self.commit(Vec::new()));
        }
        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::Registreringshjemler,
            Some(join(&self.registreringshjemler)),
            Some(join(&hjemler)),
            Some(utfoerende_ident),
            now,
        );
        self.registreringshjemler = hjemler;
        Ok(self.commit(vec![innslag]))
    }

    /// Change the processing deadline.
    pub fn set_frist(
        &mut self,
        frist: NaiveDate,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if self.frist == frist {
            return Ok(self.commit(Vec::new()));
        }
        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::Frist,
            Some(self.frist.to_string()),
            Some(frist.to_string()),
            Some(utfoerende_ident),
            now,
        );
        self.frist = frist;
        Ok(self.commit(vec![innslag]))
    }

    /// Correct the date the appeals body received the case.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::Invalid`] for a time in the future.
    pub fn set_mottatt_klageinstans(
        &mut self,
        mottatt: DateTime<Utc>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        let now = Utc::now();
        if mottatt > now {
            return Err(BehandlingError::invalid(
                "mottattKlageinstans",
                "must not be in the future",
            ));
        }
        if self.mottatt_klageinstans == mottatt {
            return Ok(self.commit(Vec::new()));
        }
        let innslag = Endringsinnslag::new(
            Felt::MottattKlageinstans,
            Some(self.mottatt_klageinstans.to_rfc3339()),
            Some(mottatt.to_rfc3339()),
            Some(utfoerende_ident),
            now,
        );
        self.mottatt_klageinstans = mottatt;
        Ok(self.commit(vec![innslag]))
    }

    /// Set or clear the legal representative.
    pub fn set_prosessfullmektig(
        &mut self,
        prosessfullmektig: Option<Prosessfullmektig>,
        utfoerende_ident: &NavIdent,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if self.prosessfullmektig == prosessfullmektig {
            return Ok(self.commit(Vec::new()));
        }
        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::Prosessfullmektig,
            self.prosessfullmektig.as_ref().map(describe_fullmektig),
            prosessfullmektig.as_ref().map(describe_fullmektig),
            Some(utfoerende_ident),
            now,
        );
        self.prosessfullmektig = prosessfullmektig;
        Ok(self.commit(vec![innslag]))
    }

    /// Link an archived document to the case. Linking twice is a no-op.
    pub fn add_saksdokument(
        &mut self,
        journalpost_id: impl Into<String>,
        dokument_info_id: impl Into<String>,
        utfoerende_ident: Option<&NavIdent>,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        let dokument = Saksdokument {
            journalpost_id: journalpost_id.into(),
            dokument_info_id: dokument_info_id.into(),
        };
        if dokument.journalpost_id.trim().is_empty() || dokument.dokument_info_id.trim().is_empty() {
            return Err(BehandlingError::invalid(
                "saksdokument",
                "journalpostId and dokumentInfoId are required",
            ));
        }
        if self.saksdokumenter.contains(&dokument) {
            return Ok(self.commit(Vec::new()));
        }
        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::Saksdokument,
            None,
            Some(dokument.to_string()),
            utfoerende_ident,
            now,
        );
        self.saksdokumenter.insert(dokument);
        Ok(self.commit(vec![innslag]))
    }

    // ── Terminal Transitions ────────────────────────────────────────

    /// Finalize the case.
    ///
    /// # Errors
    ///
    /// In order of evaluation:
    /// - [`BehandlingError::Avsluttet`] / [`BehandlingError::Feilregistrert`]
    ///   on a terminal case.
    /// - [`BehandlingError::MedunderskriverHarSaken`] /
    ///   [`BehandlingError::RolHarSaken`] while a reviewer holds the case.
    /// - [`BehandlingError::ManglerMedunderskriver`] when `rules` require a
    ///   co-signer decision for this type and the flow is not RETURNED.
    /// - [`BehandlingError::Invalid`] without an outcome, without required
    ///   legal bases, or with a blank name.
    /// - [`BehandlingError::IllegalOperation`] without an assigned case
    ///   officer.
    pub fn finalize(
        &mut self,
        avsluttet_av_saksbehandler: DateTime<Utc>,
        nav_ident: NavIdent,
        navn: impl Into<String>,
        rules: &FinalizeRules,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if self.medunderskriver_flow_state == FlowState::Sent {
            return Err(BehandlingError::MedunderskriverHarSaken {
                behandling_id: self.id,
            });
        }
        if self.rol_flow_state == FlowState::Sent {
            return Err(BehandlingError::RolHarSaken {
                behandling_id: self.id,
            });
        }
        if rules.requires_medunderskriver(self.behandling_type)
            && !(self.medunderskriver_flow_state == FlowState::Returned
                && self.medunderskriver_ident().is_some())
        {
            return Err(BehandlingError::ManglerMedunderskriver {
                behandling_id: self.id,
                reason: format!(
                    "{} requires a returned co-signer decision",
                    self.behandling_type
                ),
            });
        }
        let Some(utfall) = self.utfall else {
            return Err(BehandlingError::invalid("utfall", "an outcome is required"));
        };
        if utfall.requires_registreringshjemler() && self.registreringshjemler.is_empty() {
            return Err(BehandlingError::invalid(
                "registreringshjemler",
                format!("outcome {utfall} requires registered legal bases"),
            ));
        }
        if self.saksbehandler().is_none() {
            return Err(BehandlingError::IllegalOperation {
                behandling_id: self.id,
                operation: "finalize",
                reason: "no case officer is assigned".to_string(),
            });
        }
        let navn = navn.into();
        if navn.trim().is_empty() {
            return Err(BehandlingError::invalid("navn", "must not be blank"));
        }

        let now = Utc::now();
        let innslag = Endringsinnslag::new(
            Felt::AvsluttetAvSaksbehandler,
            None,
            Some(avsluttet_av_saksbehandler.to_rfc3339()),
            Some(&nav_ident),
            now,
        );
        self.ferdigstilling = Some(Ferdigstilling {
            avsluttet_av_saksbehandler,
            nav_ident,
            navn,
            avsluttet: None,
        });
        Ok(self.commit(vec![innslag]))
    }

    /// Record that downstream processing of a finalized case completed.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::IllegalOperation`] unless the case is
    /// finalized and not yet closed.
    pub fn record_avsluttet(
        &mut self,
        avsluttet: DateTime<Utc>,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        let id = self.id;
        let Some(ferdigstilling) = self.ferdigstilling.as_mut() else {
            return Err(BehandlingError::IllegalOperation {
                behandling_id: id,
                operation: "recordAvsluttet",
                reason: "the case is not finalized".to_string(),
            });
        };
        if ferdigstilling.avsluttet.is_some() {
            return Err(BehandlingError::IllegalOperation {
                behandling_id: id,
                operation: "recordAvsluttet",
                reason: "the case is already closed".to_string(),
            });
        }
        ferdigstilling.avsluttet = Some(avsluttet);
        let innslag = Endringsinnslag::new(
            Felt::Avsluttet,
            None,
            Some(avsluttet.to_rfc3339()),
            None,
            Utc::now(),
        );
        Ok(self.commit(vec![innslag]))
    }

    /// Register the case as void.
    ///
    /// # Errors
    ///
    /// - [`BehandlingError::Avsluttet`] / [`BehandlingError::Feilregistrert`]
    ///   on a terminal case.
    /// - [`BehandlingError::IllegalUpdate`] while a case officer is
    ///   assigned.
    /// - [`BehandlingError::Invalid`] for a blank reason or fagsystem.
    pub fn feilregistrer(
        &mut self,
        reason: impl Into<String>,
        nav_ident: NavIdent,
        fagsystem: impl Into<String>,
    ) -> Result<BehandlingEndretEvent, BehandlingError> {
        self.ensure_open()?;
        if let Some(assigned) = self.saksbehandler() {
            return Err(BehandlingError::IllegalUpdate {
                behandling_id: self.id,
                reason: format!("the case is assigned to {assigned}"),
            });
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(BehandlingError::invalid("reason", "must not be blank"));
        }
        let fagsystem = fagsystem.into();
        if fagsystem.trim().is_empty() {
            return Err(BehandlingError::invalid("fagsystem", "must not be blank"));
        }

        let now = Utc::now();
        let innslag =
            Endringsinnslag::new(Felt::Feilregistrering, None, Some(reason.clone()), Some(&nav_ident), now);
        self.feilregistrering = Some(Feilregistrering {
            nav_ident,
            registered: now,
            reason,
            fagsystem,
        });
        Ok(self.commit(vec![innslag]))
    }

    // ── Helpers ─────────────────────────────────────────────────────

    /// Check that the case is not terminal.
    ///
    /// # Errors
    ///
    /// [`BehandlingError::Feilregistrert`] takes precedence over
    /// [`BehandlingError::Avsluttet`].
    pub fn ensure_open(&self) -> Result<(), BehandlingError> {
        if self.feilregistrering.is_some() {
            return Err(BehandlingError::Feilregistrert {
                behandling_id: self.id,
            });
        }
        if self.ferdigstilling.is_some() {
            return Err(BehandlingError::Avsluttet {
                behandling_id: self.id,
            });
        }
        Ok(())
    }

    fn commit(&mut self, endringsinnslag: Vec<Endringsinnslag>) -> BehandlingEndretEvent {
        if !endringsinnslag.is_empty() {
            self.version += 1;
            self.modified = endringsinnslag
                .last()
                .map(|e| e.tidspunkt)
                .unwrap_or_else(Utc::now);
        }
        BehandlingEndretEvent {
            behandling: self.clone(),
            endringsinnslag,
        }
    }
}

fn flow_transition_allowed(from: FlowState, to: FlowState) -> bool {
    matches!(
        (from, to),
        (FlowState::NotSent, FlowState::Sent)
            | (FlowState::Returned, FlowState::Sent)
            | (FlowState::Sent, FlowState::Returned)
    )
}

fn render<T: std::fmt::Display>(value: Option<&T>) -> Option<String> {
    value.map(ToString::to_string)
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(",")
}

fn describe_fullmektig(p: &Prosessfullmektig) -> String {
    match (&p.part_id, &p.navn) {
        (Some(id), _) => id.value().to_string(),
        (None, Some(navn)) => navn.clone(),
        (None, None) => String::new(),
    }
}
