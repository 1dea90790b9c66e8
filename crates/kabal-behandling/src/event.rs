//! # Case Change Events
//!
//! Every state-affecting mutation of a [`Behandling`] yields a
//! [`BehandlingEndretEvent`]: a snapshot of the case after the change plus
//! one [`Endringsinnslag`] per changed field. Operations that turn out to be
//! no-ops return an event with no entries, which the service layer does not
//! publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kabal_core::NavIdent;

use crate::behandling::Behandling;

/// A changed field, named as downstream consumers know it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Felt {
    /// The case was created from intake.
    Opprettet,
    /// Case-officer assignment.
    Tildeling,
    /// Chosen co-signer.
    Medunderskriverident,
    /// Co-signer flow state.
    MedunderskriverFlowState,
    /// Chosen medical advisor.
    RolIdent,
    /// Medical advisor flow state.
    RolFlowState,
    /// Hold window.
    SattPaaVent,
    /// Outcome.
    Utfall,
    /// Legal bases registered at finalization.
    Registreringshjemler,
    /// Deadline.
    Frist,
    /// Date the appeals body received the case.
    MottattKlageinstans,
    /// Legal representative.
    Prosessfullmektig,
    /// Case documents linked from the archive.
    Saksdokument,
    /// Officer sign-off time.
    AvsluttetAvSaksbehandler,
    /// Final closing time.
    Avsluttet,
    /// Void registration.
    Feilregistrering,
}

/// One field change within an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endringsinnslag {
    /// The changed field.
    pub felt: Felt,
    /// Value before the change, rendered as text.
    pub fra: Option<String>,
    /// Value after the change, rendered as text.
    pub til: Option<String>,
    /// Who made the change, when known.
    pub saksbehandlerident: Option<NavIdent>,
    /// When the change happened.
    pub tidspunkt: DateTime<Utc>,
}

impl Endringsinnslag {
    pub(crate) fn new(
        felt: Felt,
        fra: Option<String>,
        til: Option<String>,
        saksbehandlerident: Option<&NavIdent>,
        tidspunkt: DateTime<Utc>,
    ) -> Self {
        Self {
            felt,
            fra,
            til,
            saksbehandlerident: saksbehandlerident.cloned(),
            tidspunkt,
        }
    }
}

/// Outbound change event for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehandlingEndretEvent {
    /// The case after the change.
    pub behandling: Behandling,
    /// The field changes, in the order they were applied.
    pub endringsinnslag: Vec<Endringsinnslag>,
}

impl BehandlingEndretEvent {
    /// Whether the operation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.endringsinnslag.is_empty()
    }

    /// Whether the event touches `felt`.
    pub fn touches(&self, felt: Felt) -> bool {
        self.endringsinnslag.iter().any(|e| e.felt == felt)
    }
}
