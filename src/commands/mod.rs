// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Subcommand implementations
//!
//! Each submodule exposes an `execute` entry point called from `main`, plus
//! the pure formatting helpers it prints with.

pub mod install;
pub mod status;
pub mod unit;

use std::io::{self, Write};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use crate::error::Result;

/// Print `label` in `color`, then `rest` uncoloured, then a newline.
pub(crate) fn print_labelled(color: Color, label: &str, rest: &str) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(color))?;
    print!("{}", label);
    stdout.execute(ResetColor)?;
    println!(" {}", rest);
    stdout.flush()?;
    Ok(())
}
