// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for litterbot-provision.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::provision::ProvisionRequest;

/// Set up a single-board computer to run the Litter-Robot polling daemon
#[derive(Parser, Debug)]
#[command(name = "litterbot-provision")]
#[command(
    version,
    about = "Set up a single-board computer to run the Litter-Robot polling daemon"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// User the service runs as (default: the user who invoked sudo)
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Install directory (default: <home>/litter-robot)
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Resolve system files against this directory instead of /
    #[arg(long, global = true, hide = true, default_value = "/")]
    pub root: PathBuf,

    #[command(flatten)]
    pub install: InstallArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision this machine (default when no command is given)
    Install(InstallArgs),

    /// Show install directory, service, mount and board status
    Status,

    /// Print the unit file(s) install would write
    RenderUnit(RenderUnitArgs),
}

/// Arguments for provisioning
#[derive(clap::Args, Debug, Clone, Default)]
pub struct InstallArgs {
    /// UUID of an external drive to add to fstab and mount
    #[arg(short = 'e', long = "external-drive", value_name = "UUID")]
    pub external_drive: Option<String>,

    /// Directory containing account_info.json and the scripts
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub source_dir: PathBuf,

    /// Also deploy the webcam recorder service
    #[arg(long)]
    pub with_recorder: bool,

    /// Show what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the render-unit subcommand
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RenderUnitArgs {
    /// UUID of the external drive the recorder depends on
    #[arg(short = 'e', long = "external-drive", value_name = "UUID")]
    pub external_drive: Option<String>,

    /// Include the recorder unit
    #[arg(long)]
    pub with_recorder: bool,
}

/// Output format options
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    /// Parse the process arguments, exiting with a usage error when install
    /// options are combined with another command.
    pub fn parse_checked() -> Self {
        let cli = Self::parse();
        if let Err(err) = cli.check() {
            err.exit();
        }
        cli
    }

    /// Top-level install options only make sense without a command or
    /// with `install`, which takes them after the command name.
    pub fn check(&self) -> Result<(), clap::Error> {
        if self.command.is_some() && self.install.is_set() {
            return Err(Self::command().error(
                ErrorKind::ArgumentConflict,
                "--external-drive, --source-dir, --with-recorder and --dry-run \
                 must follow the command they belong to",
            ));
        }
        Ok(())
    }

    /// Install arguments, whether given at the top level or after `install`.
    pub fn install_args(&self) -> &InstallArgs {
        match &self.command {
            Some(Commands::Install(args)) => args,
            _ => &self.install,
        }
    }
}

impl InstallArgs {
    /// Whether any option differs from its default.
    fn is_set(&self) -> bool {
        self.external_drive.is_some()
            || self.source_dir != Path::new(".")
            || self.with_recorder
            || self.dry_run
    }

    /// Combine with the global target options into a provisioning request.
    pub fn to_request(&self, user: Option<String>, install_dir: Option<PathBuf>) -> ProvisionRequest {
        ProvisionRequest {
            user,
            install_dir,
            drive_uuid: self.external_drive.clone(),
            source_dir: self.source_dir.clone(),
            with_recorder: self.with_recorder,
            dry_run: self.dry_run,
        }
    }
}

impl RenderUnitArgs {
    pub fn to_request(&self, user: Option<String>, install_dir: Option<PathBuf>) -> ProvisionRequest {
        ProvisionRequest {
            user,
            install_dir,
            drive_uuid: self.external_drive.clone(),
            with_recorder: self.with_recorder,
            ..ProvisionRequest::default()
        }
    }
}
