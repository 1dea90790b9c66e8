//! # kabal-cli — Command-Line Tool for the Appeals Case Core
//!
//! Provides the `kabal` binary:
//!
//! - `kabal behandling status <FILE>` — derive the status of a stored case.
//! - `kabal behandling create <MOTTAK>` — create a case from an intake file.
//! - `kabal demo` — run a complete case through the service with in-memory
//!   collaborators.
//!
//! ```bash
//! kabal behandling create mottak.json --out behandling.json
//! kabal behandling status behandling.json
//! kabal -v demo --json
//! ```

pub mod behandling;
pub mod demo;

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Pretty-print `value` to `path`, or to stdout when `path` is `None`.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => std::fs::write(path, rendered + "\n")
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
