//! # Case Files — `kabal behandling`
//!
//! Works on cases and intakes stored as JSON files, without a running
//! service.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use serde::Serialize;

use kabal_behandling::{create_behandling_from_mottak, Behandling, Mottak, Status};
use kabal_core::BehandlingId;

use crate::{read_json, write_json};

/// Case subcommand arguments.
#[derive(Args, Debug)]
pub struct BehandlingArgs {
    #[command(subcommand)]
    pub command: BehandlingCommand,
}

/// Available case subcommands.
#[derive(Subcommand, Debug)]
pub enum BehandlingCommand {
    /// Derive the status of a case stored as JSON.
    Status {
        /// Case file.
        file: PathBuf,

        /// Print a JSON report instead of a single line.
        #[arg(long)]
        json: bool,
    },

    /// Create a case from an intake file.
    Create {
        /// Intake (mottak) file.
        mottak: PathBuf,

        /// Write the case here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the creation event instead of the case.
        #[arg(long)]
        event: bool,
    },
}

/// Status report for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub behandling_id: BehandlingId,
    pub status: Status,
    pub terminal: bool,
    pub frist: NaiveDate,
    pub version: u64,
}

impl StatusReport {
    /// Report for `behandling`.
    pub fn of(behandling: &Behandling) -> Self {
        Self {
            behandling_id: behandling.id,
            status: behandling.status(),
            terminal: behandling.is_terminal(),
            frist: behandling.frist,
            version: behandling.version,
        }
    }
}

/// Execute the case subcommand.
pub fn run_behandling(args: &BehandlingArgs) -> Result<u8> {
    match &args.command {
        BehandlingCommand::Status { file, json } => run_status(file, *json),
        BehandlingCommand::Create { mottak, out, event } => {
            run_create(mottak, out.as_deref(), *event)
        }
    }
}

fn run_status(file: &Path, json: bool) -> Result<u8> {
    let behandling: Behandling = read_json(file)?;
    let report = StatusReport::of(&behandling);
    tracing::debug!(behandling_id = %report.behandling_id, status = %report.status, "status derived");
    if json {
        write_json(&report, None)?;
    } else {
        println!("{} {} {}", report.behandling_id, behandling.behandling_type, report.status);
    }
    Ok(0)
}

fn run_create(mottak: &Path, out: Option<&Path>, event: bool) -> Result<u8> {
    let mottak: Mottak = read_json(mottak)?;
    let (behandling, opprettet) = create_behandling_from_mottak(&mottak)
        .context("intake rejected")?;
    tracing::info!(behandling_id = %behandling.id, frist = %behandling.frist, "behandling created");
    if event {
        write_json(&opprettet, out)?;
    } else {
        write_json(&behandling, out)?;
    }
    Ok(0)
}
