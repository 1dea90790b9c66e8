//! # Assignments and Flow States
//!
//! Who holds a case: the case officer ([`Tildeling`]), the co-signer
//! ([`MedunderskriverTildeling`]) and the medical advisor ([`RolTildeling`]).
//! Co-signer and medical advisor hand-offs are tracked by [`FlowState`].
//!
//! History records are append-only. They are created by the case aggregate
//! whenever an assignment changes and are never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::NavIdent;

/// Where a case is in a hand-off to a second reviewer.
///
/// ```text
/// NOT_SENT ──send──▶ SENT ──return──▶ RETURNED
///                      ▲                  │
///                      └──────send────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// The reviewer has not received the case.
    #[default]
    NotSent,
    /// The reviewer holds the case.
    Sent,
    /// The reviewer has handed the case back to the case officer.
    Returned,
}

impl FlowState {
    /// The canonical string name of this flow state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotSent => "NOT_SENT",
            Self::Sent => "SENT",
            Self::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-officer assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tildeling {
    /// The assigned case officer. `None` means the case was released.
    pub saksbehandlerident: Option<NavIdent>,
    /// The unit the case officer works for.
    pub enhet: Option<String>,
    /// When the assignment was made.
    pub tidspunkt: DateTime<Utc>,
}

impl Tildeling {
    /// Whether a case officer currently holds the case.
    pub fn is_assigned(&self) -> bool {
        self.saksbehandlerident.is_some()
    }
}

/// Co-signer assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedunderskriverTildeling {
    /// The chosen co-signer. `None` means the co-signer was cleared.
    pub saksbehandlerident: Option<NavIdent>,
    /// When the co-signer was chosen.
    pub tidspunkt: DateTime<Utc>,
}

/// Medical advisor (rådgivende overlege) assignment.
///
/// A case may be sent to the medical advisor pool without a named advisor,
/// so the ident is optional even while the flow is [`FlowState::Sent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolTildeling {
    /// The named medical advisor, if any.
    pub rol_ident: Option<NavIdent>,
    /// When the advisor was chosen.
    pub tidspunkt: DateTime<Utc>,
}

/// Append-only record of a case-officer assignment change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TildelingHistorikk {
    /// The assignment after the change.
    pub tildeling: Tildeling,
    /// Who made the change.
    pub utfoerende_ident: Option<NavIdent>,
}

/// Append-only record of a co-signer change or hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedunderskriverHistorikk {
    /// The co-signer after the change.
    pub medunderskriver: Option<NavIdent>,
    /// The flow state after the change.
    pub flow_state: FlowState,
    /// When the change happened.
    pub tidspunkt: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_state_defaults_to_not_sent() {
        assert_eq!(FlowState::default(), FlowState::NotSent);
    }

    #[test]
    fn flow_state_wire_names() {
        let json = serde_json::to_string(&FlowState::NotSent).unwrap();
        assert_eq!(json, "\"NOT_SENT\"");
        let back: FlowState = serde_json::from_str("\"RETURNED\"").unwrap();
        assert_eq!(back, FlowState::Returned);
    }

    #[test]
    fn released_tildeling_is_not_assigned() {
        let t = Tildeling {
            saksbehandlerident: None,
            enhet: Some("4295".to_string()),
            tidspunkt: Utc::now(),
        };
        assert!(!t.is_assigned());
    }
}
