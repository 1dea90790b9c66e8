//! # Event Projections
//!
//! Read-side views derived from [`BehandlingEndretEvent`]s and finalized
//! cases:
//!
//! - [`notifications_for`] turns a change event into the personal
//!   notifications the affected employees should receive.
//! - [`KvalitetsvurderingExport`] is the payload handed to the
//!   quality-review board when a case is finalized.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::{BehandlingId, FlowState, NavIdent};

use crate::behandling::{Behandling, BehandlingType, Utfall};
use crate::error::BehandlingError;
use crate::event::{BehandlingEndretEvent, Endringsinnslag, Felt};

/// Kinds of personal notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A case was assigned to the recipient.
    Tildelt,
    /// The recipient lost a case they held.
    TildelingFjernet,
    /// The recipient was chosen as co-signer and received the case.
    SendtTilMedunderskriver,
    /// The co-signer returned the recipient's case.
    ReturnertFraMedunderskriver,
    /// The recipient was sent a case as medical advisor.
    SendtTilRol,
    /// The medical advisor returned the recipient's case.
    ReturnertFraRol,
}

/// A personal notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What happened.
    pub notification_type: NotificationType,
    /// Who should be told.
    pub mottaker: NavIdent,
    /// The case concerned.
    pub behandling_id: BehandlingId,
    /// The case type.
    pub behandling_type: BehandlingType,
    /// Who caused the notification, when known.
    pub utfoerende_ident: Option<NavIdent>,
    /// When it happened.
    pub tidspunkt: DateTime<Utc>,
}

/// Derive the notifications for a change event.
///
/// Employees are never notified about their own actions.
pub fn notifications_for(event: &BehandlingEndretEvent) -> Vec<Notification> {
    let behandling = &event.behandling;
    let mut out = Vec::new();
    for innslag in &event.endringsinnslag {
        match innslag.felt {
            Felt::Tildeling => {
                if let Some(ny) = parse_ident(innslag.til.as_deref()) {
                    push(&mut out, behandling, innslag, NotificationType::Tildelt, ny);
                }
                if innslag.fra != innslag.til {
                    if let Some(tidligere) = parse_ident(innslag.fra.as_deref()) {
                        push(
                            &mut out,
                            behandling,
                            innslag,
                            NotificationType::TildelingFjernet,
                            tidligere,
                        );
                    }
                }
            }
            Felt::MedunderskriverFlowState => {
                let target = match innslag.til.as_deref() {
                    Some(s) if s == FlowState::Sent.as_str() => behandling
                        .medunderskriver_ident()
                        .map(|m| (NotificationType::SendtTilMedunderskriver, m.clone())),
                    Some(s) if s == FlowState::Returned.as_str() => behandling
                        .saksbehandler()
                        .map(|s| (NotificationType::ReturnertFraMedunderskriver, s.clone())),
                    _ => None,
                };
                if let Some((kind, mottaker)) = target {
                    push(&mut out, behandling, innslag, kind, mottaker);
                }
            }
            Felt::RolFlowState => {
                let target = match innslag.til.as_deref() {
                    Some(s) if s == FlowState::Sent.as_str() => behandling
                        .rol_ident()
                        .map(|r| (NotificationType::SendtTilRol, r.clone())),
                    Some(s) if s == FlowState::Returned.as_str() => behandling
                        .saksbehandler()
                        .map(|s| (NotificationType::ReturnertFraRol, s.clone())),
                    _ => None,
                };
                if let Some((kind, mottaker)) = target {
                    push(&mut out, behandling, innslag, kind, mottaker);
                }
            }
            _ => {}
        }
    }
    out
}

fn parse_ident(value: Option<&str>) -> Option<NavIdent> {
    value.and_then(|v| NavIdent::new(v).ok())
}

fn push(
    out: &mut Vec<Notification>,
    behandling: &Behandling,
    innslag: &Endringsinnslag,
    notification_type: NotificationType,
    mottaker: NavIdent,
) {
    if innslag.saksbehandlerident.as_ref() == Some(&mottaker) {
        return;
    }
    out.push(Notification {
        notification_type,
        mottaker,
        behandling_id: behandling.id,
        behandling_type: behandling.behandling_type,
        utfoerende_ident: innslag.saksbehandlerident.clone(),
        tidspunkt: innslag.tidspunkt,
    });
}

/// Finalize-time export for the quality-review board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvalitetsvurderingExport {
    /// The finalized case.
    pub behandling_id: BehandlingId,
    /// Case type.
    pub behandling_type: BehandlingType,
    /// Benefit area.
    pub ytelse: String,
    /// Originating system.
    pub fagsystem: String,
    /// Case id in the originating system.
    pub fagsak_id: String,
    /// Outcome.
    pub utfall: Utfall,
    /// Registered legal bases.
    pub registreringshjemler: BTreeSet<String>,
    /// The signing case officer.
    pub saksbehandler: NavIdent,
    /// The case officer's unit.
    pub enhet: Option<String>,
    /// The co-signer, if one was used.
    pub medunderskriver: Option<NavIdent>,
    /// When the appeals body received the case.
    pub mottatt_klageinstans: DateTime<Utc>,
    /// When the case officer signed off.
    pub avsluttet_av_saksbehandler: DateTime<Utc>,
}

impl KvalitetsvurderingExport {
    /// Build the export from a finalized case.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::IllegalOperation`] unless the case is
    /// finalized with an outcome.
    pub fn from_behandling(behandling: &Behandling) -> Result<Self, BehandlingError> {
        let not_ready = |reason: &str| BehandlingError::IllegalOperation {
            behandling_id: behandling.id,
            operation: "kvalitetsvurderingExport",
            reason: reason.to_string(),
        };
        let ferdigstilling = behandling
            .ferdigstilling
            .as_ref()
            .ok_or_else(|| not_ready("the case is not finalized"))?;
        let utfall = behandling
            .utfall
            .ok_or_else(|| not_ready("the case has no outcome"))?;

        Ok(Self {
            behandling_id: behandling.id,
            behandling_type: behandling.behandling_type,
            ytelse: behandling.ytelse.clone(),
            fagsystem: behandling.fagsystem.clone(),
            fagsak_id: behandling.fagsak_id.clone(),
            utfall,
            registreringshjemler: behandling.registreringshjemler.clone(),
            saksbehandler: ferdigstilling.nav_ident.clone(),
            enhet: behandling.tildeling.as_ref().and_then(|t| t.enhet.clone()),
            medunderskriver: behandling.medunderskriver_ident().cloned(),
            mottatt_klageinstans: behandling.mottatt_klageinstans,
            avsluttet_av_saksbehandler: ferdigstilling.avsluttet_av_saksbehandler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behandling::tests::{ident, test_behandling};
    use crate::rules::FinalizeRules;

    #[test]
    fn assignment_notifies_new_and_previous_officer() {
        let mut b = test_behandling(BehandlingType::Klage);
        let leder = ident("L500000");
        let event = b.assign(Some(ident("B100001")), None, None, Some(&leder)).unwrap();
        let n = notifications_for(&event);
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].notification_type, NotificationType::Tildelt);
        assert_eq!(n[0].mottaker, ident("B100001"));

        let event = b.assign(Some(ident("B100002")), None, None, Some(&leder)).unwrap();
        let kinds: Vec<_> = notifications_for(&event)
            .into_iter()
            .map(|n| (n.notification_type, n.mottaker))
            .collect();
        assert!(kinds.contains(&(NotificationType::Tildelt, ident("B100002"))));
        assert!(kinds.contains(&(NotificationType::TildelingFjernet, ident("B100001"))));
    }

    #[test]
    fn self_assignment_is_silent() {
        let mut b = test_behandling(BehandlingType::Klage);
        let me = ident("B100001");
        let event = b.assign(Some(me.clone()), None, None, Some(&me)).unwrap();
        assert!(notifications_for(&event).is_empty());
    }

    #[test]
    fn co_signer_hand_offs_notify_the_other_party() {
        let mut b = test_behandling(BehandlingType::Klage);
        let officer = ident("B100001");
        let co_signer = ident("A200000");
        b.assign(Some(officer.clone()), None, None, Some(&officer)).unwrap();
        b.route_to_co_signer(Some(co_signer.clone()), None, &officer).unwrap();

        let sent = b.send_to_co_signer(None, &officer).unwrap();
        let n = notifications_for(&sent);
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].notification_type, NotificationType::SendtTilMedunderskriver);
        assert_eq!(n[0].mottaker, co_signer);

        let returned = b.return_from_co_signer(None, &co_signer).unwrap();
        let n = notifications_for(&returned);
        assert_eq!(n[0].notification_type, NotificationType::ReturnertFraMedunderskriver);
        assert_eq!(n[0].mottaker, officer);
    }

    #[test]
    fn export_requires_finalized_case() {
        let mut b = test_behandling(BehandlingType::Klage);
        let officer = ident("B100001");
        assert!(KvalitetsvurderingExport::from_behandling(&b).is_err());

        b.assign(Some(officer.clone()), Some("4291".into()), None, None).unwrap();
        b.set_utfall(Some(Utfall::Trukket), &officer).unwrap();
        b.finalize(Utc::now(), officer.clone(), "Saks Behandler", &FinalizeRules::default())
            .unwrap();
        let export = KvalitetsvurderingExport::from_behandling(&b).unwrap();
        assert_eq!(export.utfall, Utfall::Trukket);
        assert_eq!(export.saksbehandler, officer);
        assert_eq!(export.enhet.as_deref(), Some("4291"));
    }
}
