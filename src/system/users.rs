// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Target-user lookup and privilege checks

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ProvisionError, Result};
use crate::exec::{run_checked, CommandRunner, CommandSpec};

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}\$?$").expect("username regex must be valid")
});

/// A local account, as reported by `getent passwd`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

impl UserAccount {
    /// Parse one `/etc/passwd`-format line.
    pub fn parse_passwd_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split(':').collect();
        if fields.len() < 7 {
            return None;
        }
        Some(Self {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    }

    /// `uid:gid`, as taken by `chown`.
    pub fn owner_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

/// Check that a name is usable as a POSIX login name.
pub fn validate_username(name: &str) -> Result<()> {
    if USERNAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidInput(format!(
            "'{}' is not a valid user name",
            name
        )))
    }
}

/// The user the service should run as when none was given.
///
/// Under sudo the invoking user is in `SUDO_USER`; otherwise fall back to
/// `USER`. A `SUDO_USER` of root (sudo from a root shell) is ignored.
pub fn default_user<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("SUDO_USER")
        .filter(|user| !user.is_empty() && user != "root")
        .or_else(|| lookup("USER").filter(|user| !user.is_empty()))
}

/// Same as [`default_user`] against the process environment.
pub fn default_user_from_env() -> Option<String> {
    default_user(|key| std::env::var(key).ok())
}

/// Effective uid of this process, via `id -u`.
pub async fn effective_uid(runner: &dyn CommandRunner) -> Result<String> {
    let out = run_checked(runner, &CommandSpec::query("id").arg("-u")).await?;
    Ok(out.stdout.trim().to_string())
}

/// Fail unless this process runs as root.
pub async fn require_root(runner: &dyn CommandRunner) -> Result<()> {
    let uid = effective_uid(runner).await?;
    if uid == "0" {
        Ok(())
    } else {
        Err(ProvisionError::NotPrivileged(uid))
    }
}

/// Look up a user with `getent passwd`.
pub async fn lookup_user(runner: &dyn CommandRunner, name: &str) -> Result<UserAccount> {
    validate_username(name)?;

    let out = runner
        .run(&CommandSpec::query("getent").args(["passwd", name]))
        .await?;
    // getent exits 2 when the key is not found.
    if !out.success() {
        return Err(ProvisionError::UnknownUser(name.to_string()));
    }

    out.stdout
        .lines()
        .filter_map(UserAccount::parse_passwd_line)
        .find(|account| account.name == name)
        .ok_or_else(|| ProvisionError::UnknownUser(name.to_string()))
}
