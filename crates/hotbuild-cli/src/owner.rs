//! Inspecting and controlling the current owner from outside the protocol.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use hotbuild_config::{log_cli_debug, log_cli_info};
use hotbuild_coord::{Canceller, Delivery, SignalCanceller};
use hotbuild_lock::{LockError, StateLayout};
use serde::Serialize;

use crate::Project;

#[derive(Debug, Serialize)]
struct Artifact {
    path: PathBuf,
    present: bool,
}

impl Artifact {
    fn new(path: &Path, present: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            present,
        }
    }
}

#[derive(Debug, Serialize)]
struct OwnerState {
    pid: u32,
    alive: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    base: String,
    build_slot: Artifact,
    kill_slot: Artifact,
    record: Artifact,
    trampoline: Artifact,
    log: Artifact,
    owner: Option<OwnerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    malformed_record: Option<String>,
}

/// Read the ownership record, treating a malformed one as absent.
fn recorded_owner(layout: &StateLayout) -> Result<(Option<u32>, Option<String>)> {
    match layout.record().read() {
        Ok(pid) => Ok((pid, None)),
        Err(LockError::MalformedRecord { contents, .. }) => Ok((None, Some(contents))),
        Err(e) => Err(e).context("Failed to read ownership record"),
    }
}

fn report(layout: &StateLayout) -> Result<StatusReport> {
    let (pid, malformed_record) = recorded_owner(layout)?;
    let build_slot = layout.build_slot();
    let kill_slot = layout.kill_slot();
    let record = layout.record();
    let trampoline = layout.trampoline();
    let log = layout.log_path();

    Ok(StatusReport {
        base: layout.base().to_string(),
        build_slot: Artifact::new(build_slot.path(), build_slot.exists()),
        kill_slot: Artifact::new(kill_slot.path(), kill_slot.exists()),
        record: Artifact::new(record.path(), record.exists()),
        trampoline: Artifact::new(trampoline.path(), trampoline.exists()),
        log: Artifact::new(&log, log.exists()),
        owner: pid.map(|pid| OwnerState {
            pid,
            alive: SignalCanceller.is_alive(pid),
        }),
        malformed_record,
    })
}

pub fn status(project: &Project, json: bool) -> Result<ExitCode> {
    let report = report(&project.layout)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Project: {}", project.root.display());
    println!("Base:    {}", report.base);
    match &report.owner {
        Some(owner) if owner.alive => println!("Owner:   {} (running)", owner.pid),
        Some(owner) => println!("Owner:   {} (dead, run `hotbuild reset`)", owner.pid),
        None => println!("Owner:   none"),
    }
    if let Some(contents) = &report.malformed_record {
        println!("         malformed record: {:?}", contents);
    }
    println!();
    for (name, artifact) in [
        ("build slot", &report.build_slot),
        ("kill slot", &report.kill_slot),
        ("record", &report.record),
        ("trampoline", &report.trampoline),
        ("log", &report.log),
    ] {
        let mark = if artifact.present { "*" } else { "-" };
        println!("  {} {:<11} {}", mark, name, artifact.path.display());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn cancel(project: &Project, wait: bool) -> Result<ExitCode> {
    let (pid, _) = recorded_owner(&project.layout)?;
    let Some(pid) = pid else {
        println!("No build in progress");
        return Ok(ExitCode::SUCCESS);
    };

    match SignalCanceller.cancel(pid)? {
        Delivery::Delivered => println!("Cancelled owner {}", pid),
        Delivery::Gone => {
            println!("Owner {} is not running; run `hotbuild reset`", pid);
            return Ok(ExitCode::SUCCESS);
        }
    }

    if !wait {
        return Ok(ExitCode::SUCCESS);
    }
    let retry = &project.config.retry;
    let record = project.layout.record();
    for _ in 0..retry.teardown_attempts {
        if record.read().ok().flatten() != Some(pid) {
            log_cli_debug!("Owner tore down", pid = pid);
            return Ok(ExitCode::SUCCESS);
        }
        tokio::time::sleep(retry.teardown_backoff()).await;
    }
    anyhow::bail!(
        "owner {} did not tear down after {} attempts",
        pid,
        retry.teardown_attempts
    )
}

/// Clear artifacts of an owner that died without tearing down.
pub fn reset(project: &Project) -> Result<ExitCode> {
    let layout = &project.layout;
    let (pid, _) = recorded_owner(layout)?;
    if let Some(pid) = pid {
        if SignalCanceller.is_alive(pid) {
            anyhow::bail!(
                "owner {} is still running; use `hotbuild cancel` instead",
                pid
            );
        }
    }

    let build_slot = layout.build_slot();
    let kill_slot = layout.kill_slot();
    let mut removed = Vec::new();
    if build_slot.exists() {
        build_slot.release()?;
        removed.push(build_slot.path().to_path_buf());
    }
    if kill_slot.exists() {
        kill_slot.release()?;
        removed.push(kill_slot.path().to_path_buf());
    }
    let trampoline = layout.trampoline();
    if trampoline.remove()? {
        removed.push(trampoline.path().to_path_buf());
    }
    let record = layout.record();
    if record.remove()? {
        removed.push(record.path().to_path_buf());
    }

    if removed.is_empty() {
        println!("Nothing to reset");
    } else {
        for path in &removed {
            println!("Removed {}", path.display());
        }
    }
    log_cli_info!("Reset", removed = removed.len());
    Ok(ExitCode::SUCCESS)
}
