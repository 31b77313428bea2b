// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Install command: provision this machine and print the step summary

use std::sync::Arc;

use crossterm::style::Color;

use super::print_labelled;
use crate::cli::args::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::exec::{CommandRunner, DryRunRunner, SystemRunner};
use crate::provision::{Outcome, ProvisionRequest, Provisioner, Report};
use crate::system::SystemRoot;

/// Execute the install command
pub async fn execute(
    request: &ProvisionRequest,
    settings: &Settings,
    root: SystemRoot,
    format: &OutputFormat,
) -> Result<Report> {
    // Command output would corrupt the JSON document on stdout.
    let system = match format {
        OutputFormat::Json => SystemRunner::quiet(),
        OutputFormat::Text => SystemRunner::new(),
    };

    let report = if request.dry_run {
        let runner = DryRunRunner::new(Arc::new(system));
        provision(request, settings, &runner, root, Some(&runner)).await?
    } else {
        provision(request, settings, &system, root, None).await?
    };

    print_report(&report, format)?;
    Ok(report)
}

/// Run the provisioner and attach the commands a dry run held back.
pub async fn provision(
    request: &ProvisionRequest,
    settings: &Settings,
    runner: &dyn CommandRunner,
    root: SystemRoot,
    dry_run: Option<&DryRunRunner>,
) -> Result<Report> {
    let mut report = Provisioner::new(settings, runner, root).run(request).await?;
    if let Some(dry_run) = dry_run {
        report.planned_commands = dry_run
            .planned()
            .iter()
            .map(|command| command.to_string())
            .collect();
    }
    Ok(report)
}

fn badge(outcome: &Outcome) -> (&'static str, Color) {
    match outcome {
        Outcome::Applied(_) => ("  done   ", Color::Green),
        Outcome::Skipped(_) => ("  skip   ", Color::DarkGrey),
        Outcome::Warning(_) => ("  warn   ", Color::Yellow),
        Outcome::Planned(_) => ("  plan   ", Color::Cyan),
    }
}

/// One-line tally printed under the step list.
pub fn summary_line(report: &Report) -> String {
    let count = |f: fn(&Outcome) -> bool| report.records.iter().filter(|r| f(&r.outcome)).count();
    let applied = count(|o| matches!(o, Outcome::Applied(_)));
    let skipped = count(|o| matches!(o, Outcome::Skipped(_)));
    let warnings = count(|o| matches!(o, Outcome::Warning(_)));

    if report.dry_run {
        let planned = count(|o| matches!(o, Outcome::Planned(_)));
        format!(
            "Dry run: {} change(s) and {} command(s) planned, {} already in place, {} warning(s)",
            planned,
            report.planned_commands.len(),
            skipped,
            warnings
        )
    } else {
        format!(
            "Done: {} applied, {} already in place, {} warning(s)",
            applied, skipped, warnings
        )
    }
}

fn print_report(report: &Report, format: &OutputFormat) -> Result<()> {
    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!();
    for record in &report.records {
        let (label, color) = badge(&record.outcome);
        print_labelled(
            color,
            label,
            &format!("{:<16} {}", record.step.label(), record.outcome.detail()),
        )?;
    }

    if !report.planned_commands.is_empty() {
        println!("\nCommands that would run:");
        for command in &report.planned_commands {
            println!("  {}", command);
        }
    }

    println!("\n{}", summary_line(report));
    Ok(())
}
