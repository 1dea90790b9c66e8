//! # Archive Gating and Upload Limits
//!
//! A document may only be archived when the service has confirmed that its
//! content is virus-clean and valid PDF/A. The core never calls the
//! scanners itself; it receives their verdict as an [`ArchiveClearance`].

use serde::{Deserialize, Serialize};

use kabal_core::DokumentId;

use crate::error::DokumentError;

/// Default maximum upload size: 8 MiB.
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 8 * 1024 * 1024;

/// Verdict of the archive preconditions for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveClearance {
    /// Whether virus scanning passed.
    pub virus_clean: bool,
    /// PDF/A validator messages. Empty means valid.
    pub pdfa_errors: Vec<String>,
}

impl ArchiveClearance {
    /// A clearance with no findings.
    pub fn clean() -> Self {
        Self {
            virus_clean: true,
            pdfa_errors: Vec::new(),
        }
    }

    /// Whether archiving may proceed.
    pub fn is_clear(&self) -> bool {
        self.virus_clean && self.pdfa_errors.is_empty()
    }

    /// Turn the verdict into an error for `dokument_id`.
    ///
    /// # Errors
    ///
    /// [`DokumentError::VirusInfected`] takes precedence over
    /// [`DokumentError::PdfaInvalid`].
    pub fn check(&self, dokument_id: DokumentId) -> Result<(), DokumentError> {
        if !self.virus_clean {
            return Err(DokumentError::VirusInfected { dokument_id });
        }
        if !self.pdfa_errors.is_empty() {
            return Err(DokumentError::PdfaInvalid {
                dokument_id,
                errors: self.pdfa_errors.clone(),
            });
        }
        Ok(())
    }
}

/// Size limits for uploaded documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    /// Largest accepted upload in bytes.
    pub max_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl UploadLimits {
    /// Check an upload size.
    ///
    /// # Errors
    ///
    /// [`DokumentError::AttachmentIsEmpty`] with code `EMPTY` for zero
    /// bytes, [`DokumentError::AttachmentTooLarge`] with code `TOO_LARGE`
    /// above `max_bytes`.
    pub fn check(&self, size: u64) -> Result<(), DokumentError> {
        if size == 0 {
            return Err(DokumentError::AttachmentIsEmpty {
                code: DokumentError::EMPTY,
            });
        }
        if size > self.max_bytes {
            return Err(DokumentError::AttachmentTooLarge {
                code: DokumentError::TOO_LARGE,
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }
}
