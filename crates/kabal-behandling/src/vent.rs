//! # Holds (satt på vent)
//!
//! A hold suspends activity on a case for a date window. Putting a case on
//! hold and taking it off each append a [`SattPaaVentHistorikk`] record;
//! the history is never rewritten.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::NavIdent;

use crate::error::BehandlingError;

/// Why a case was put on hold.
///
/// Each reason has a stable numeric id used on the wire by the excluded
/// HTTP layer. [`Annet`](SattPaaVentReason::Annet) requires a free-text
/// explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SattPaaVentReason {
    /// Waiting for a party to respond.
    VenterPaaTilsvar,
    /// Waiting for documentation.
    VenterPaaDokumentasjon,
    /// Blocked by another case.
    BlokkertAvAnnenSak,
    /// Waiting for the medical advisor.
    VenterPaaRol,
    /// Any other reason; a text explanation is required.
    Annet,
}

impl SattPaaVentReason {
    /// All reasons as a slice.
    pub fn all() -> &'static [SattPaaVentReason] {
        &[
            Self::VenterPaaTilsvar,
            Self::VenterPaaDokumentasjon,
            Self::BlokkertAvAnnenSak,
            Self::VenterPaaRol,
            Self::Annet,
        ]
    }

    /// The stable wire id.
    pub fn id(&self) -> &'static str {
        match self {
            Self::VenterPaaTilsvar => "1",
            Self::VenterPaaDokumentasjon => "2",
            Self::BlokkertAvAnnenSak => "3",
            Self::VenterPaaRol => "4",
            Self::Annet => "5",
        }
    }

    /// Resolve a reason from its wire id.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::Invalid`] for an unknown id.
    pub fn from_id(id: &str) -> Result<Self, BehandlingError> {
        Self::all()
            .iter()
            .copied()
            .find(|r| r.id() == id)
            .ok_or_else(|| BehandlingError::invalid("sattPaaVentReasonId", format!("unknown id {id:?}")))
    }

    /// Whether a text explanation must accompany this reason.
    pub fn requires_text(&self) -> bool {
        matches!(self, Self::Annet)
    }
}

impl std::fmt::Display for SattPaaVentReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// An active hold window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SattPaaVent {
    /// First day of the hold.
    pub from: NaiveDate,
    /// Last day of the hold.
    pub to: NaiveDate,
    /// Why the case is on hold.
    pub reason_id: SattPaaVentReason,
    /// Free-text explanation.
    pub reason: Option<String>,
}

impl SattPaaVent {
    /// Build a validated hold window.
    ///
    /// # Errors
    ///
    /// Returns [`BehandlingError::Invalid`] when `from` is after `to`, the
    /// reason id is unknown, or the reason needs text and none is given.
    pub fn new(
        from: NaiveDate,
        to: NaiveDate,
        reason_id: &str,
        reason: Option<String>,
    ) -> Result<Self, BehandlingError> {
        if from > to {
            return Err(BehandlingError::invalid(
                "sattPaaVent",
                format!("from {from} is after to {to}"),
            ));
        }
        let reason_id = SattPaaVentReason::from_id(reason_id)?;
        let reason = reason.filter(|r| !r.trim().is_empty());
        if reason_id.requires_text() && reason.is_none() {
            return Err(BehandlingError::invalid(
                "sattPaaVentReason",
                "reason text is required for ANNET",
            ));
        }
        Ok(Self {
            from,
            to,
            reason_id,
            reason,
        })
    }

    /// Whether the hold window has passed on `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today > self.to
    }
}

/// Append-only record of a hold change. `satt_paa_vent` is `None` for a
/// take-off-hold record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SattPaaVentHistorikk {
    /// The hold after the change.
    pub satt_paa_vent: Option<SattPaaVent>,
    /// When the change happened.
    pub tidspunkt: DateTime<Utc>,
    /// Who made the change.
    pub utfoerende_ident: NavIdent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reason_ids_roundtrip() {
        for reason in SattPaaVentReason::all() {
            assert_eq!(SattPaaVentReason::from_id(reason.id()).unwrap(), *reason);
        }
        assert!(SattPaaVentReason::from_id("99").is_err());
    }

    #[test]
    fn window_must_be_ordered() {
        let err = SattPaaVent::new(date(2026, 3, 2), date(2026, 3, 1), "1", None).unwrap_err();
        assert!(matches!(err, BehandlingError::Invalid { field: "sattPaaVent", .. }));
    }

    #[test]
    fn annet_requires_text() {
        assert!(SattPaaVent::new(date(2026, 3, 1), date(2026, 3, 9), "5", None).is_err());
        assert!(SattPaaVent::new(date(2026, 3, 1), date(2026, 3, 9), "5", Some(" ".into())).is_err());
        let ok = SattPaaVent::new(date(2026, 3, 1), date(2026, 3, 9), "5", Some("venter på NAV Arbeid".into()))
            .unwrap();
        assert_eq!(ok.reason_id, SattPaaVentReason::Annet);
    }

    #[test]
    fn expiry_is_after_last_day() {
        let hold = SattPaaVent::new(date(2026, 3, 1), date(2026, 3, 9), "2", None).unwrap();
        assert!(!hold.is_expired(date(2026, 3, 9)));
        assert!(hold.is_expired(date(2026, 3, 10)));
    }
}
