// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! litterbot-provision - set up a Raspberry Pi to run the Litter-Robot daemon
//!
//! Entry point for the litterbot-provision CLI application.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use litterbot_provision::cli::{Cli, Commands};
use litterbot_provision::commands;
use litterbot_provision::config::Settings;
use litterbot_provision::error::Result;
use litterbot_provision::system::SystemRoot;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_checked();

    init_tracing(cli.verbose);
    let verbose = cli.verbose;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            if !err.is_precondition() && verbose == 0 {
                eprintln!("Re-run with -v to log every command.");
            }
            ExitCode::from(err.exit_code())
        }
    }
}

/// Set up logging on stderr. `RUST_LOG` takes precedence; otherwise this
/// crate logs at info (`-v` debug, `-vv` trace) and everything else at warn.
fn init_tracing(verbose: u8) {
    let env_filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => {
            let level = match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            let mut filter = EnvFilter::new("warn");
            if let Ok(parsed) = format!("litterbot_provision={}", level).parse() {
                filter = filter.add_directive(parsed);
            }
            filter
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    // Load settings
    let root = SystemRoot::new(&cli.root);
    let cwd = std::env::current_dir()?;
    let (settings, source) = Settings::discover(cli.config.as_deref(), &cwd, &root)?;
    if let Some(path) = source {
        tracing::debug!("settings loaded from {}", path.display());
    }

    // Dispatch to appropriate command
    match &cli.command {
        None | Some(Commands::Install(_)) => {
            let request = cli
                .install_args()
                .to_request(cli.user.clone(), cli.install_dir.clone());
            commands::install::execute(&request, &settings, root, &cli.format).await?;
        }
        Some(Commands::Status) => {
            commands::status::execute(
                &settings,
                &root,
                cli.user.as_deref(),
                cli.install_dir.as_deref(),
                &cli.format,
            )
            .await?;
        }
        Some(Commands::RenderUnit(args)) => {
            let request = args.to_request(cli.user.clone(), cli.install_dir.clone());
            commands::unit::execute(&request, &settings, root, &cli.format).await?;
        }
    }

    Ok(())
}
