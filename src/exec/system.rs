// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Process-spawning runner used in production.

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::error::{ProvisionError, Result};

/// Spawns real processes.
///
/// Output of mutating commands is echoed to the terminal while it is being
/// captured, so long package builds show progress. Queries stay silent.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    quiet: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never echo command output.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let argv = command.argv();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ProvisionError::InvalidInput("empty command".to_string()))?;

        let mut process = Command::new(program);
        process
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if command.input().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if command.env_on_process() {
            process.envs(command.get_env().iter().map(|(k, v)| (k, v)));
        }

        let mut child = process.spawn().map_err(|source| ProvisionError::Spawn {
            program: program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut stdin)) = (command.input(), child.stdin.take()) {
            stdin.write_all(input).await?;
            // Dropping the handle closes the pipe so `bash -s` sees EOF.
            drop(stdin);
        }

        let echo = command.is_mutating() && !self.quiet;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (stdout_output, stderr_output) = tokio::join!(
            drain(stdout, echo.then(|| Box::new(std::io::stdout()) as Box<dyn Write + Send>)),
            drain(stderr, echo.then(|| Box::new(std::io::stderr()) as Box<dyn Write + Send>)),
        );

        let status = child.wait().await?;
        Ok(CommandOutput {
            code: status.code(),
            stdout: stdout_output,
            stderr: stderr_output,
        })
    }
}

/// Read a pipe to EOF, optionally mirroring each chunk to `mirror`.
///
/// Raw byte reads rather than lines, so `\r` progress output still shows up.
async fn drain<R>(pipe: Option<R>, mut mirror: Option<Box<dyn Write + Send>>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return String::new();
    };

    let mut collected = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(out) = mirror.as_mut() {
                    let _ = out.write_all(&buf[..n]);
                    let _ = out.flush();
                }
                collected.extend_from_slice(&buf[..n]);
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&collected).into_owned()
}
