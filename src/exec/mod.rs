// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! External command execution
//!
//! Every interaction with the package manager, pyenv, pip, systemd and the
//! mount tools goes through the [`CommandRunner`] trait. The production
//! implementation spawns real processes; [`DryRunRunner`] only lets read-only
//! queries through, and [`ScriptedRunner`] replays canned output for tests.

mod dry_run;
mod scripted;
mod system;

pub use dry_run::DryRunRunner;
pub use scripted::ScriptedRunner;
pub use system::SystemRunner;

use async_trait::async_trait;

use crate::error::{ProvisionError, Result};

/// Number of trailing stderr lines kept in a [`ProvisionError::CommandFailed`].
const STDERR_TAIL_LINES: usize = 20;

/// Description of a single external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    run_as: Option<String>,
    stdin: Option<Vec<u8>>,
    mutating: bool,
}

impl CommandSpec {
    /// A command that changes system state.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            run_as: None,
            stdin: None,
            mutating: true,
        }
    }

    /// A read-only command. Dry runs still execute these.
    pub fn query(program: impl Into<String>) -> Self {
        Self {
            mutating: false,
            ..Self::new(program)
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the command as another user (through `sudo -u <user> -H`).
    pub fn run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = Some(user.into());
        self
    }

    /// Feed the given bytes to the command's stdin.
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn user(&self) -> Option<&str> {
        self.run_as.as_deref()
    }

    pub fn input(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    /// The command line as written, without the privilege-drop wrapper.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| quote(part))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Full argument vector that is actually spawned.
    ///
    /// `sudo` resets the environment, so user-scoped commands carry their
    /// variables through `env`.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(user) = &self.run_as {
            argv.extend(["sudo", "-u", user.as_str(), "-H", "--"].map(String::from));
            if !self.env.is_empty() {
                argv.push("env".to_string());
                argv.extend(self.env.iter().map(|(k, v)| format!("{}={}", k, v)));
            }
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Whether the environment must be applied on the spawned process itself
    /// (as opposed to being forwarded through `env` inside the sudo wrapper).
    pub(crate) fn env_on_process(&self) -> bool {
        self.run_as.is_none()
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.run_as {
            Some(user) => write!(f, "[as {}] {}", user, self.command_line()),
            None => f.write_str(&self.command_line()),
        }
    }
}

fn quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed exit with the given code and stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into [`ProvisionError::CommandFailed`].
    pub fn check(self, command: &CommandSpec) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(ProvisionError::CommandFailed {
            command: command.to_string(),
            code: self.code,
            stderr: stderr_tail(&self.stderr),
        })
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Seam between provisioning logic and the operating system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion. A non-zero exit is reported in the
    /// output, not as an error; only failure to spawn is an error.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Run a command and require a zero exit status.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
) -> Result<CommandOutput> {
    tracing::debug!(command = %command, "running");
    runner.run(command).await?.check(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_only_when_needed() {
        let cmd = CommandSpec::new("bash")
            .arg("-c")
            .arg("echo 'hi there'");
        assert_eq!(cmd.command_line(), r#"bash -c 'echo '\''hi there'\'''"#);

        let cmd = CommandSpec::new("apt-get").args(["install", "-y", "libssl-dev"]);
        assert_eq!(cmd.command_line(), "apt-get install -y libssl-dev");
    }

    #[test]
    fn test_argv_without_user_is_plain() {
        let cmd = CommandSpec::new("systemctl")
            .arg("daemon-reload")
            .env("SYSTEMD_PAGER", "");
        assert_eq!(cmd.argv(), vec!["systemctl", "daemon-reload"]);
        assert!(cmd.env_on_process());
    }

    #[test]
    fn test_argv_as_user_wraps_with_sudo_and_env() {
        let cmd = CommandSpec::new("/home/pi/.pyenv/bin/pyenv")
            .args(["install", "-s", "3.11.9"])
            .env("PYENV_ROOT", "/home/pi/.pyenv")
            .run_as("pi");
        assert_eq!(
            cmd.argv(),
            vec![
                "sudo",
                "-u",
                "pi",
                "-H",
                "--",
                "env",
                "PYENV_ROOT=/home/pi/.pyenv",
                "/home/pi/.pyenv/bin/pyenv",
                "install",
                "-s",
                "3.11.9",
            ]
        );
        assert!(!cmd.env_on_process());
        assert_eq!(
            cmd.to_string(),
            "[as pi] /home/pi/.pyenv/bin/pyenv install -s 3.11.9"
        );
    }

    #[test]
    fn test_query_is_not_mutating() {
        assert!(!CommandSpec::query("id").arg("-u").is_mutating());
        assert!(CommandSpec::new("mount").is_mutating());
    }

    #[test]
    fn test_check_success_passes_output_through() {
        let cmd = CommandSpec::query("id").arg("-u");
        let out = CommandOutput::ok("0\n").check(&cmd).unwrap();
        assert_eq!(out.stdout, "0\n");
    }

    #[test]
    fn test_check_failure_keeps_stderr_tail() {
        let cmd = CommandSpec::new("apt-get").arg("update");
        let stderr: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let err = CommandOutput::failed(100, stderr).check(&cmd).unwrap_err();
        match err {
            ProvisionError::CommandFailed {
                command,
                code,
                stderr,
            } => {
                assert_eq!(command, "apt-get update");
                assert_eq!(code, Some(100));
                assert!(stderr.starts_with("line 10"));
                assert!(stderr.ends_with("line 29"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_checked_uses_runner() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.command_line() == "systemctl is-active litter-robot.service")
            .times(1)
            .returning(|_| Ok(CommandOutput::failed(3, "inactive")));

        let cmd = CommandSpec::query("systemctl").args(["is-active", "litter-robot.service"]);
        let err = run_checked(&runner, &cmd).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
