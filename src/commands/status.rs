// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Status command: install directory, unit state, storage mount and board
//! model

use std::path::Path;

use crossterm::style::Color;
use serde::Serialize;

use super::print_labelled;
use crate::cli::args::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::exec::{CommandRunner, SystemRunner};
use crate::provision::Provisioner;
use crate::system::systemd::{self, UnitState};
use crate::system::{board, storage, SystemRoot};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub install: Option<InstallStatus>,
    pub units: Vec<UnitState>,
    pub mount_point: String,
    pub mounted: bool,
    pub board: Option<String>,
    pub is_raspberry_pi: bool,
}

/// Deployed files for the service user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStatus {
    pub user: String,
    pub install_dir: String,
    pub present: bool,
    pub credentials_present: bool,
    pub script_present: bool,
}

/// Gather status without changing anything.
///
/// `user` and `install_dir` select the install directory to inspect, as for
/// `install`. Without an explicit user it is skipped when the invoking user
/// cannot be resolved. The recorder unit is only queried when its unit file
/// exists.
pub async fn collect(
    settings: &Settings,
    runner: &dyn CommandRunner,
    root: &SystemRoot,
    user: Option<&str>,
    install_dir: Option<&Path>,
) -> Result<StatusReport> {
    let install = install_status(settings, runner, root, user, install_dir).await?;

    let mut unit_names = vec![settings.daemon.unit_name()];
    let recorder = settings.recorder.unit_name();
    if root.unit_path(&recorder).is_file() {
        unit_names.push(recorder);
    }

    let mut units = Vec::with_capacity(unit_names.len());
    for name in &unit_names {
        units.push(systemd::unit_state(runner, name).await?);
    }

    let mount_point = settings.storage.mount_point.clone();
    let mounts = std::fs::read_to_string(root.proc_mounts()).unwrap_or_default();
    let mounted = storage::is_mounted(&mounts, Path::new(&mount_point));

    let model = board::model(root);
    let is_raspberry_pi = model.as_deref().is_some_and(board::is_raspberry_pi);

    Ok(StatusReport {
        install,
        units,
        mount_point,
        mounted,
        board: model,
        is_raspberry_pi,
    })
}

async fn install_status(
    settings: &Settings,
    runner: &dyn CommandRunner,
    root: &SystemRoot,
    user: Option<&str>,
    install_dir: Option<&Path>,
) -> Result<Option<InstallStatus>> {
    let provisioner = Provisioner::new(settings, runner, root.clone());
    let account = match provisioner.resolve_account(user).await {
        Ok(account) => account,
        Err(err) if user.is_none() => {
            tracing::debug!("not inspecting an install directory: {}", err);
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    let dir = provisioner.install_dir(&account, install_dir)?;
    let host = root.resolve(&dir);

    Ok(Some(InstallStatus {
        user: account.name,
        install_dir: dir.display().to_string(),
        present: host.is_dir(),
        credentials_present: host.join(&settings.daemon.credentials).is_file(),
        script_present: host.join(&settings.daemon.script).is_file(),
    }))
}

/// Execute the status command
pub async fn execute(
    settings: &Settings,
    root: &SystemRoot,
    user: Option<&str>,
    install_dir: Option<&Path>,
    format: &OutputFormat,
) -> Result<()> {
    let status = collect(settings, &SystemRunner::quiet(), root, user, install_dir).await?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n=== Litter-Robot Service Status ===\n");
    if let Some(install) = &status.install {
        let (color, state) = match (
            install.present,
            install.credentials_present && install.script_present,
        ) {
            (true, true) => (Color::Green, "deployed".to_string()),
            (true, false) => (Color::Yellow, "incomplete".to_string()),
            (false, _) => (Color::Red, "missing".to_string()),
        };
        print_labelled(
            color,
            &format!("{:<24}", install.install_dir),
            &format!("{} (user {})", state, install.user),
        )?;
    }
    for unit in &status.units {
        let color = if unit.is_healthy() {
            Color::Green
        } else {
            Color::Red
        };
        print_labelled(
            color,
            &format!("{:<24}", unit.unit),
            &format!("{} / {}", unit.enabled, unit.active),
        )?;
    }

    let (color, state) = if status.mounted {
        (Color::Green, "mounted")
    } else {
        (Color::Yellow, "not mounted")
    };
    print_labelled(color, &format!("{:<24}", status.mount_point), state)?;

    match &status.board {
        Some(model) => println!("Board: {}", model),
        None => println!("Board: unknown (no device-tree model)"),
    }
    if status.board.is_some() && !status.is_raspberry_pi {
        println!("Note: this does not look like a Raspberry Pi");
    }
    println!();

    Ok(())
}
