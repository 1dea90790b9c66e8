//! Service error types.

use kabal_behandling::{BehandlingError, SourceKey};
use kabal_core::{BehandlingId, DokumentId, ErrorKind};
use kabal_dokument::DokumentError;
use kabal_gateway::GatewayError;
use thiserror::Error;

/// Errors from service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No case with this id.
    #[error("behandling {0} not found")]
    BehandlingNotFound(BehandlingId),

    /// No document with this id.
    #[error("dokument {0} not found")]
    DokumentNotFound(DokumentId),

    /// A case with the same source key already exists.
    #[error("a behandling already exists for {}/{}/{} ({}): {existing}", key.fagsystem, key.fagsak_id, key.kilde_referanse, key.behandling_type)]
    DuplicateSource {
        /// The clashing source key.
        key: SourceKey,
        /// The existing case.
        existing: BehandlingId,
    },

    /// The case still has documents that are not archived.
    #[error("behandling {behandling_id} has {} unfinished document(s)", dokument_ids.len())]
    UnfinishedDocuments {
        /// The case.
        behandling_id: BehandlingId,
        /// The unfinished documents.
        dokument_ids: Vec<DokumentId>,
    },

    /// A case rule rejected the operation.
    #[error(transparent)]
    Behandling(#[from] BehandlingError),

    /// A document rule rejected the operation.
    #[error(transparent)]
    Dokument(#[from] DokumentError),

    /// A collaborator failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ServiceError {
    /// The error-kind category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BehandlingNotFound(_) | Self::DokumentNotFound(_) => ErrorKind::NotFound,
            Self::DuplicateSource { .. } | Self::UnfinishedDocuments { .. } => ErrorKind::StateConflict,
            Self::Behandling(e) => e.kind(),
            Self::Dokument(e) => e.kind(),
            Self::Gateway(e) => e.kind(),
        }
    }
}
