// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::system::SystemRoot;

use super::Settings;

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "LITTERBOT_PROVISION_CONFIG";

/// File name looked up in the working directory.
const LOCAL_CONFIG: &str = "provision.toml";

/// System-wide settings file.
const SYSTEM_CONFIG: &str = "/etc/litterbot-provision/provision.toml";

impl Settings {
    /// Load settings from a specific path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Locate and load the settings file.
    ///
    /// Search order: explicit path, `$LITTERBOT_PROVISION_CONFIG`,
    /// `./provision.toml`, `/etc/litterbot-provision/provision.toml` under
    /// `root`. An explicitly named file must exist; otherwise a missing file
    /// means defaults.
    pub fn discover(
        explicit: Option<&Path>,
        working_dir: &Path,
        root: &SystemRoot,
    ) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                let path = PathBuf::from(path);
                return Ok((Self::load_from(&path)?, Some(path)));
            }
        }

        for candidate in [working_dir.join(LOCAL_CONFIG), root.resolve(SYSTEM_CONFIG)] {
            if candidate.is_file() {
                tracing::debug!("using settings from {}", candidate.display());
                return Ok((Self::load_from(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Serialize to TOML, e.g. to seed a settings file.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
