//! Service configuration.
//!
//! Loaded from environment variables with defaults. Malformed values are
//! errors rather than silently falling back, so a typo in deployment
//! configuration fails at startup.

use std::time::Duration;

use kabal_behandling::{BehandlingType, FinalizeRules};
use kabal_dokument::UploadLimits;
use kabal_gateway::RetryPolicy;

/// Configuration for [`KabalService`](crate::KabalService).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KabalConfig {
    /// Upload size limits.
    pub upload_limits: UploadLimits,
    /// Backoff policy for collaborator calls.
    pub retry: RetryPolicy,
    /// Extra finalization rules.
    pub finalize_rules: FinalizeRules,
    /// Emit logs as JSON.
    pub log_json: bool,
}

impl KabalConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `KABAL_MAX_ATTACHMENT_BYTES` (default: 8 MiB)
    /// - `KABAL_RETRY_MAX_ATTEMPTS` (default: 3 retries after the first call)
    /// - `KABAL_RETRY_BASE_DELAY_MS` (default: 200)
    /// - `KABAL_REQUIRE_MEDUNDERSKRIVER_FOR` (comma-separated case types,
    ///   default: none)
    /// - `KABAL_LOG_JSON` (`true`/`false`, default: `false`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_bytes = parse_u64(&lookup, "KABAL_MAX_ATTACHMENT_BYTES")?
            .unwrap_or(defaults.upload_limits.max_bytes);
        if max_bytes == 0 {
            return Err(ConfigError::Invalid {
                var: "KABAL_MAX_ATTACHMENT_BYTES",
                value: "0".to_string(),
            });
        }

        let max_retries = match parse_u64(&lookup, "KABAL_RETRY_MAX_ATTEMPTS")? {
            Some(n) => u32::try_from(n).map_err(|_| ConfigError::Invalid {
                var: "KABAL_RETRY_MAX_ATTEMPTS",
                value: n.to_string(),
            })?,
            None => defaults.retry.max_retries,
        };
        let base_delay = parse_u64(&lookup, "KABAL_RETRY_BASE_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);

        let mut finalize_rules = FinalizeRules::default();
        if let Some(raw) = lookup("KABAL_REQUIRE_MEDUNDERSKRIVER_FOR") {
            for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let t: BehandlingType = part.parse().map_err(|_| ConfigError::Invalid {
                    var: "KABAL_REQUIRE_MEDUNDERSKRIVER_FOR",
                    value: part.to_string(),
                })?;
                finalize_rules.require_medunderskriver_for.insert(t);
            }
        }

        let log_json = match lookup("KABAL_LOG_JSON").as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                return Err(ConfigError::Invalid {
                    var: "KABAL_LOG_JSON",
                    value: v.to_string(),
                })
            }
        };

        Ok(Self {
            upload_limits: UploadLimits { max_bytes },
            retry: RetryPolicy {
                max_retries,
                base_delay,
            },
            finalize_rules,
            log_json,
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable has a malformed value.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// The variable.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}
