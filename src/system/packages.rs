// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OS package installation through apt-get

use crate::error::Result;
use crate::exec::{run_checked, CommandRunner, CommandSpec};

fn apt_get() -> CommandSpec {
    CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

/// Refresh the package index and install `packages`.
///
/// Duplicate names are dropped, order is kept. apt-get already skips
/// packages that are installed, so this is safe to repeat.
pub async fn install(runner: &dyn CommandRunner, packages: &[String]) -> Result<usize> {
    let mut unique: Vec<&str> = Vec::with_capacity(packages.len());
    for package in packages {
        let package = package.trim();
        if !package.is_empty() && !unique.contains(&package) {
            unique.push(package);
        }
    }
    if unique.is_empty() {
        return Ok(0);
    }

    run_checked(runner, &apt_get().arg("update")).await?;
    run_checked(
        runner,
        &apt_get().args(["install", "-y"]).args(unique.iter().copied()),
    )
    .await?;

    tracing::info!("installed/verified {} OS packages", unique.len());
    Ok(unique.len())
}
