// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Source-file checks and copying files into the install directory.

use std::path::Path;

use crate::error::{ProvisionError, Result};

/// Keys the polling daemon reads from the credentials file.
const CREDENTIAL_KEYS: [&str; 2] = ["user", "password"];

/// Credentials are only readable by the service user.
pub const CREDENTIALS_MODE: u32 = 0o600;
pub const SCRIPT_MODE: u32 = 0o644;

/// Confirm the credentials file is a JSON object.
///
/// The content is copied verbatim; parsing only catches obvious mistakes.
/// Returns the expected keys that are missing.
pub fn check_credentials(path: &Path) -> Result<Vec<&'static str>> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ProvisionError::InvalidCredentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let object = value
        .as_object()
        .ok_or_else(|| ProvisionError::InvalidCredentials {
            path: path.to_path_buf(),
            reason: "expected a JSON object".to_string(),
        })?;

    Ok(CREDENTIAL_KEYS
        .into_iter()
        .filter(|key| !object.contains_key(*key))
        .collect())
}

/// Require a regular file to exist.
pub fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ProvisionError::MissingFile(path.to_path_buf()))
    }
}

/// Copy `source` to `dest` byte-for-byte and set its permission bits.
pub fn install_file(source: &Path, dest: &Path, mode: u32) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, dest)?;
    set_mode(dest, mode)?;
    tracing::debug!("installed {} -> {} ({:o})", source.display(), dest.display(), mode);
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
