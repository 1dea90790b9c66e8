//! # Case Status Derivation
//!
//! A case's [`Status`] is never stored. It is recomputed from six persisted
//! fields every time it is needed, by strict precedence:
//!
//! ```text
//! feilregistrering set            → FEILREGISTRERT
//! ferdigstilling set              → FULLFOERT
//! sattPaaVent set                 → SATT_PAA_VENT
//! medunderskriver flow SENT       → SENDT_TIL_MEDUNDERSKRIVER
//! medunderskriver flow RETURNED   → RETURNERT_TIL_SAKSBEHANDLER
//! medunderskriver ident set       → MEDUNDERSKRIVER_VALGT
//! tildeling ident set             → TILDELT
//! otherwise                       → IKKE_TILDELT
//! ```
//!
//! Keeping status a pure function of the persisted fields rules out a
//! stored status drifting away from the facts it summarizes.

use serde::{Deserialize, Serialize};

use kabal_core::{FlowState, MedunderskriverTildeling, Tildeling};

use crate::behandling::{Behandling, Feilregistrering, Ferdigstilling};
use crate::vent::SattPaaVent;

/// The single current status of a case.
///
/// `AVSLUTTET_AV_SAKSBEHANDLER` and `UKJENT` are part of the wire vocabulary
/// shared with downstream consumers but are never produced by
/// [`derive_status`]. Unrecognized values deserialize to `UKJENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// No case officer holds the case.
    IkkeTildelt,
    /// A case officer holds the case.
    Tildelt,
    /// A co-signer is chosen but has not received the case.
    MedunderskriverValgt,
    /// The co-signer holds the case.
    SendtTilMedunderskriver,
    /// The co-signer handed the case back.
    ReturnertTilSaksbehandler,
    /// Reserved for consumers that distinguish officer sign-off from
    /// completion.
    AvsluttetAvSaksbehandler,
    /// The case is finalized.
    Fullfoert,
    /// The case is on hold.
    SattPaaVent,
    /// The case is void.
    Feilregistrert,
    /// Unknown status value.
    #[serde(other)]
    Ukjent,
}

impl Status {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IkkeTildelt => "IKKE_TILDELT",
            Self::Tildelt => "TILDELT",
            Self::MedunderskriverValgt => "MEDUNDERSKRIVER_VALGT",
            Self::SendtTilMedunderskriver => "SENDT_TIL_MEDUNDERSKRIVER",
            Self::ReturnertTilSaksbehandler => "RETURNERT_TIL_SAKSBEHANDLER",
            Self::AvsluttetAvSaksbehandler => "AVSLUTTET_AV_SAKSBEHANDLER",
            Self::Fullfoert => "FULLFOERT",
            Self::SattPaaVent => "SATT_PAA_VENT",
            Self::Feilregistrert => "FEILREGISTRERT",
            Self::Ukjent => "UKJENT",
        }
    }

    /// Whether no further status-affecting change is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fullfoert | Self::Feilregistrert)
    }

    /// Derive the status from the six fields that determine it.
    pub fn from_parts(
        feilregistrering: Option<&Feilregistrering>,
        ferdigstilling: Option<&Ferdigstilling>,
        satt_paa_vent: Option<&SattPaaVent>,
        medunderskriver: Option<&MedunderskriverTildeling>,
        medunderskriver_flow_state: FlowState,
        tildeling: Option<&Tildeling>,
    ) -> Self {
        if feilregistrering.is_some() {
            return Self::Feilregistrert;
        }
        if ferdigstilling.is_some() {
            return Self::Fullfoert;
        }
        if satt_paa_vent.is_some() {
            return Self::SattPaaVent;
        }
        match medunderskriver_flow_state {
            FlowState::Sent => return Self::SendtTilMedunderskriver,
            FlowState::Returned => return Self::ReturnertTilSaksbehandler,
            FlowState::NotSent => {}
        }
        if medunderskriver.is_some_and(|m| m.saksbehandlerident.is_some()) {
            return Self::MedunderskriverValgt;
        }
        if tildeling.is_some_and(Tildeling::is_assigned) {
            return Self::Tildelt;
        }
        Self::IkkeTildelt
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the current status of a case. Pure and idempotent; valid at any
/// point in the case's life, including after finalization.
pub fn derive_status(behandling: &Behandling) -> Status {
    Status::from_parts(
        behandling.feilregistrering.as_ref(),
        behandling.ferdigstilling.as_ref(),
        behandling.satt_paa_vent.as_ref(),
        behandling.medunderskriver.as_ref(),
        behandling.medunderskriver_flow_state,
        behandling.tildeling.as_ref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use kabal_core::NavIdent;

    fn ident(s: &str) -> NavIdent {
        NavIdent::new(s).unwrap()
    }

    fn tildeling() -> Tildeling {
        Tildeling {
            saksbehandlerident: Some(ident("B100001")),
            enhet: Some("4291".to_string()),
            tidspunkt: Utc::now(),
        }
    }

    fn medunderskriver() -> MedunderskriverTildeling {
        MedunderskriverTildeling {
            saksbehandlerident: Some(ident("A200000")),
            tidspunkt: Utc::now(),
        }
    }

    fn hold() -> SattPaaVent {
        let d = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        SattPaaVent::new(d, d, "1", None).unwrap()
    }

    fn ferdigstilling() -> Ferdigstilling {
        Ferdigstilling {
            avsluttet_av_saksbehandler: Utc::now(),
            nav_ident: ident("B100001"),
            navn: "Saks Behandler".to_string(),
            avsluttet: None,
        }
    }

    fn feilregistrering() -> Feilregistrering {
        Feilregistrering {
            nav_ident: ident("B100001"),
            registered: Utc::now(),
            reason: "duplikat".to_string(),
            fagsystem: "K9".to_string(),
        }
    }

    #[test]
    fn empty_case_is_ikke_tildelt() {
        let s = Status::from_parts(None, None, None, None, FlowState::NotSent, None);
        assert_eq!(s, Status::IkkeTildelt);
    }

    #[test]
    fn released_tildeling_is_ikke_tildelt() {
        let released = Tildeling {
            saksbehandlerident: None,
            enhet: None,
            tidspunkt: Utc::now(),
        };
        let s = Status::from_parts(None, None, None, None, FlowState::NotSent, Some(&released));
        assert_eq!(s, Status::IkkeTildelt);
    }

    #[test]
    fn precedence_table() {
        let t = tildeling();
        let m = medunderskriver();
        let h = hold();
        let fs = ferdigstilling();
        let fr = feilregistrering();

        assert_eq!(
            Status::from_parts(None, None, None, None, FlowState::NotSent, Some(&t)),
            Status::Tildelt
        );
        assert_eq!(
            Status::from_parts(None, None, None, Some(&m), FlowState::NotSent, Some(&t)),
            Status::MedunderskriverValgt
        );
        assert_eq!(
            Status::from_parts(None, None, None, Some(&m), FlowState::Returned, Some(&t)),
            Status::ReturnertTilSaksbehandler
        );
        assert_eq!(
            Status::from_parts(None, None, None, Some(&m), FlowState::Sent, Some(&t)),
            Status::SendtTilMedunderskriver
        );
        assert_eq!(
            Status::from_parts(None, None, Some(&h), Some(&m), FlowState::Sent, Some(&t)),
            Status::SattPaaVent
        );
        assert_eq!(
            Status::from_parts(None, Some(&fs), Some(&h), Some(&m), FlowState::Sent, Some(&t)),
            Status::Fullfoert
        );
        assert_eq!(
            Status::from_parts(Some(&fr), Some(&fs), Some(&h), Some(&m), FlowState::Sent, Some(&t)),
            Status::Feilregistrert
        );
    }

    #[test]
    fn unknown_wire_value_is_ukjent() {
        let s: Status = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(s, Status::Ukjent);
        let json = serde_json::to_string(&Status::SendtTilMedunderskriver).unwrap();
        assert_eq!(json, "\"SENDT_TIL_MEDUNDERSKRIVER\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(Status::Fullfoert.is_terminal());
        assert!(Status::Feilregistrert.is_terminal());
        assert!(!Status::SattPaaVent.is_terminal());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn flow() -> impl Strategy<Value = FlowState> {
            prop_oneof![
                Just(FlowState::NotSent),
                Just(FlowState::Sent),
                Just(FlowState::Returned),
            ]
        }

        proptest! {
            #[test]
            fn feilregistrering_dominates(
                ferdig in any::<bool>(),
                vent in any::<bool>(),
                med in any::<bool>(),
                flow_state in flow(),
                tildelt in any::<bool>(),
            ) {
                let (fs, h, m, t) = (ferdigstilling(), hold(), medunderskriver(), tildeling());
                let fr = feilregistrering();
                let status = Status::from_parts(
                    Some(&fr),
                    ferdig.then_some(&fs),
                    vent.then_some(&h),
                    med.then_some(&m),
                    flow_state,
                    tildelt.then_some(&t),
                );
                prop_assert_eq!(status, Status::Feilregistrert);
            }

            #[test]
            fn never_derives_reserved_statuses(
                feil in any::<bool>(),
                ferdig in any::<bool>(),
                vent in any::<bool>(),
                med in any::<bool>(),
                flow_state in flow(),
                tildelt in any::<bool>(),
            ) {
                let (fs, h, m, t) = (ferdigstilling(), hold(), medunderskriver(), tildeling());
                let fr = feilregistrering();
                let status = Status::from_parts(
                    feil.then_some(&fr),
                    ferdig.then_some(&fs),
                    vent.then_some(&h),
                    med.then_some(&m),
                    flow_state,
                    tildelt.then_some(&t),
                );
                prop_assert_ne!(status, Status::Ukjent);
                prop_assert_ne!(status, Status::AvsluttetAvSaksbehandler);
            }
        }
    }
}
