// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! systemd unit rendering and service control

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::exec::{run_checked, CommandRunner, CommandSpec};

/// A long-running service unit with a restart-on-failure policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnit {
    /// Unit file name, e.g. `litter-robot.service`
    pub name: String,
    pub description: String,
    pub user: String,
    pub group: String,
    pub working_directory: PathBuf,
    /// Program followed by its arguments
    pub exec_start: Vec<String>,
    pub restart_sec: u32,
    pub start_limit_interval_sec: u32,
    pub start_limit_burst: u32,
    pub environment: Vec<(String, String)>,
    /// Mount points that must be available before the service starts
    pub requires_mounts_for: Vec<PathBuf>,
}

impl ServiceUnit {
    /// Render the unit file.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Managed by litterbot-provision; rewritten on every run.");
        let _ = writeln!(out, "[Unit]");
        let _ = writeln!(out, "Description={}", self.description);
        let _ = writeln!(out, "Wants=network-online.target");
        let _ = writeln!(out, "After=network-online.target");
        for mount in &self.requires_mounts_for {
            let _ = writeln!(out, "RequiresMountsFor={}", quote_word(&mount.display().to_string()));
        }
        let _ = writeln!(out, "StartLimitIntervalSec={}", self.start_limit_interval_sec);
        let _ = writeln!(out, "StartLimitBurst={}", self.start_limit_burst);
        let _ = writeln!(out);
        let _ = writeln!(out, "[Service]");
        let _ = writeln!(out, "Type=simple");
        let _ = writeln!(out, "User={}", self.user);
        let _ = writeln!(out, "Group={}", self.group);
        let _ = writeln!(
            out,
            "WorkingDirectory={}",
            quote_word(&self.working_directory.display().to_string())
        );
        for (key, value) in &self.environment {
            let _ = writeln!(out, "Environment={}", quote_word(&format!("{}={}", key, value)));
        }
        let exec = self
            .exec_start
            .iter()
            .map(|arg| escape_exec_arg(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "ExecStart={}", exec);
        let _ = writeln!(out, "Restart=on-failure");
        let _ = writeln!(out, "RestartSec={}", self.restart_sec);
        let _ = writeln!(out, "NoNewPrivileges=true");
        let _ = writeln!(out, "PrivateTmp=true");
        let _ = writeln!(out, "StandardOutput=journal");
        let _ = writeln!(out, "StandardError=journal");
        let _ = writeln!(out);
        let _ = writeln!(out, "[Install]");
        let _ = writeln!(out, "WantedBy=multi-user.target");
        out
    }
}

/// Escape a command-line word for `ExecStart=`, where `$` also starts a
/// variable expansion.
fn escape_exec_arg(arg: &str) -> String {
    quote_word(&arg.replace('$', "$$"))
}

/// Quote a word for a unit file line. systemd splits on whitespace and
/// understands C-style double-quoted strings; `%` starts a specifier.
fn quote_word(arg: &str) -> String {
    let escaped = arg.replace('%', "%%");
    if escaped.is_empty()
        || escaped
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '\'' || c == ';')
    {
        format!(
            "\"{}\"",
            escaped.replace('\\', "\\\\").replace('"', "\\\"")
        )
    } else {
        escaped
    }
}

/// Outcome of writing a unit file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitWrite {
    Created,
    Changed,
    Unchanged,
}

/// Write the unit file unconditionally and report how it compares with
/// what was there before.
pub fn write_unit(path: &Path, content: &str) -> Result<UnitWrite> {
    let previous = std::fs::read_to_string(path).ok();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;

    let outcome = match previous {
        None => UnitWrite::Created,
        Some(prev) if prev == content => UnitWrite::Unchanged,
        Some(_) => UnitWrite::Changed,
    };
    match outcome {
        UnitWrite::Created => tracing::info!("created {}", path.display()),
        UnitWrite::Changed => tracing::info!("updated {}", path.display()),
        UnitWrite::Unchanged => tracing::info!("rewrote {} (content unchanged)", path.display()),
    }
    Ok(outcome)
}

fn systemctl() -> CommandSpec {
    CommandSpec::new("systemctl")
}

pub async fn daemon_reload(runner: &dyn CommandRunner) -> Result<()> {
    run_checked(runner, &systemctl().arg("daemon-reload")).await?;
    Ok(())
}

/// Enable the unit at boot and (re)start it now.
pub async fn enable_and_restart(runner: &dyn CommandRunner, unit: &str) -> Result<()> {
    run_checked(runner, &systemctl().args(["enable", unit])).await?;
    run_checked(runner, &systemctl().args(["restart", unit])).await?;
    Ok(())
}

/// State reported by `systemctl is-enabled` / `is-active`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitState {
    pub unit: String,
    /// Raw `is-enabled` answer (`enabled`, `disabled`, `not-found`, ...)
    pub enabled: String,
    /// Raw `is-active` answer (`active`, `inactive`, `failed`, ...)
    pub active: String,
}

impl UnitState {
    pub fn is_enabled(&self) -> bool {
        self.enabled == "enabled"
    }

    pub fn is_active(&self) -> bool {
        self.active == "active"
    }

    pub fn is_healthy(&self) -> bool {
        self.is_enabled() && self.is_active()
    }
}

/// Ask systemd about a unit. Both queries exit non-zero for "no", so their
/// stdout is read regardless of exit status.
pub async fn unit_state(runner: &dyn CommandRunner, unit: &str) -> Result<UnitState> {
    let answer = |stdout: &str| {
        let text = stdout.trim();
        if text.is_empty() {
            "unknown".to_string()
        } else {
            text.lines().next().unwrap_or("unknown").to_string()
        }
    };

    let enabled = runner
        .run(&CommandSpec::query("systemctl").args(["is-enabled", unit]))
        .await?;
    let active = runner
        .run(&CommandSpec::query("systemctl").args(["is-active", unit]))
        .await?;

    Ok(UnitState {
        unit: unit.to_string(),
        enabled: answer(&enabled.stdout),
        active: answer(&active.stdout),
    })
}
