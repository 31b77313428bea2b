// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-step record of what a provisioning run did.

use serde::Serialize;

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Preflight,
    Packages,
    VersionManager,
    ShellProfile,
    Runtime,
    Library,
    Deploy,
    ServiceUnit,
    Storage,
    Recorder,
    Verify,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::Preflight => "preflight",
            Step::Packages => "OS packages",
            Step::VersionManager => "pyenv",
            Step::ShellProfile => "shell profile",
            Step::Runtime => "python runtime",
            Step::Library => "python library",
            Step::Deploy => "deploy files",
            Step::ServiceUnit => "service unit",
            Step::Storage => "external drive",
            Step::Recorder => "recorder",
            Step::Verify => "verify",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened in a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "kebab-case")]
pub enum Outcome {
    /// The step changed (or re-applied) system state
    Applied(String),
    /// Nothing to do; the system was already in the wanted state
    Skipped(String),
    /// The step did not complete as intended but the run continues
    Warning(String),
    /// Dry run: the change that would have been made
    Planned(String),
}

impl Outcome {
    pub fn detail(&self) -> &str {
        match self {
            Outcome::Applied(d) | Outcome::Skipped(d) | Outcome::Warning(d) | Outcome::Planned(d) => d,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Ordered outcomes of a provisioning run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub dry_run: bool,
    pub records: Vec<StepRecord>,
    /// Commands a dry run would have executed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planned_commands: Vec<String>,
}

impl Report {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn push(&mut self, step: Step, outcome: Outcome) {
        self.records.push(StepRecord { step, outcome });
    }

    pub fn applied(&mut self, step: Step, detail: impl Into<String>) {
        self.push(step, Outcome::Applied(detail.into()));
    }

    pub fn skipped(&mut self, step: Step, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::info!("{}: skipped ({})", step, detail);
        self.push(step, Outcome::Skipped(detail));
    }

    pub fn warn(&mut self, step: Step, detail: impl Into<String>) {
        let detail = detail.into();
        tracing::warn!("{}: {}", step, detail);
        self.push(step, Outcome::Warning(detail));
    }

    pub fn planned(&mut self, step: Step, detail: impl Into<String>) {
        self.push(step, Outcome::Planned(detail.into()));
    }

    /// Outcomes recorded for `step`, in order.
    pub fn outcomes(&self, step: Step) -> Vec<&Outcome> {
        self.records
            .iter()
            .filter(|r| r.step == step)
            .map(|r| &r.outcome)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&StepRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Warning(_)))
            .collect()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings().is_empty()
    }
}
