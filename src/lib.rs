// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! litterbot-provision - set up a Raspberry Pi to run the Litter-Robot
//! polling daemon.
//!
//! This crate exposes the provisioning engine used by the
//! `litterbot-provision` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `provision`: the ordered provisioning run and its step report
//! - `system`: apt, pyenv, shell profile, systemd, fstab, users, board
//! - `exec`: the `CommandRunner` seam every external command goes through
//! - `config`: TOML settings with per-section defaults
//! - `cli`, `commands`: argument parsing and subcommand output

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod provision;
pub mod system;

pub use error::{ProvisionError, Result};
