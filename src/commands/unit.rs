// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! render-unit command

use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::config::Settings;
use crate::error::Result;
use crate::exec::{CommandRunner, SystemRunner};
use crate::provision::{ProvisionRequest, Provisioner};
use crate::system::paths::SYSTEMD_UNIT_DIR;
use crate::system::SystemRoot;

#[derive(Debug, Serialize)]
pub struct RenderedUnit {
    pub name: String,
    pub path: String,
    pub content: String,
}

/// Render every unit install would write for this request.
pub async fn render(
    request: &ProvisionRequest,
    settings: &Settings,
    runner: &dyn CommandRunner,
    root: SystemRoot,
) -> Result<Vec<RenderedUnit>> {
    let provisioner = Provisioner::new(settings, runner, root);
    let target = provisioner.resolve_target(request).await?;

    Ok(provisioner
        .units(&target)
        .into_iter()
        .map(|unit| RenderedUnit {
            path: format!("{}/{}", SYSTEMD_UNIT_DIR, unit.name),
            content: unit.render(),
            name: unit.name,
        })
        .collect())
}

/// Execute the render-unit command
pub async fn execute(
    request: &ProvisionRequest,
    settings: &Settings,
    root: SystemRoot,
    format: &OutputFormat,
) -> Result<()> {
    let units = render(request, settings, &SystemRunner::quiet(), root).await?;

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    for (i, unit) in units.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("# {}", unit.path);
        print!("{}", unit.content);
    }
    Ok(())
}
