// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ProvisionError, Result};

use super::Settings;

static UNIT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9:_.@\-]+$").expect("unit regex must be valid"));

impl Settings {
    /// Reject settings that would produce a broken unit or fstab line.
    pub fn validate(&self) -> Result<()> {
        for (field, name) in [
            ("daemon.service_name", &self.daemon.service_name),
            ("recorder.service_name", &self.recorder.service_name),
        ] {
            if !UNIT_NAME_RE.is_match(name) || name.ends_with(".service") {
                return Err(ProvisionError::Config(format!(
                    "{} must be a bare systemd unit name, got '{}'",
                    field, name
                )));
            }
        }
        if self.daemon.service_name == self.recorder.service_name {
            return Err(ProvisionError::Config(
                "daemon and recorder must use different unit names".to_string(),
            ));
        }

        if self.daemon.restart_sec == 0 {
            return Err(ProvisionError::Config(
                "daemon.restart_sec must be greater than zero".to_string(),
            ));
        }
        if self.daemon.start_limit_burst == 0 || self.daemon.start_limit_interval_sec == 0 {
            return Err(ProvisionError::Config(
                "daemon.start_limit_burst and daemon.start_limit_interval_sec must be greater than zero"
                    .to_string(),
            ));
        }

        if self.python.version.trim().is_empty() {
            return Err(ProvisionError::Config(
                "python.version must not be empty".to_string(),
            ));
        }
        if self.python.library.trim().is_empty() {
            return Err(ProvisionError::Config(
                "python.library must not be empty".to_string(),
            ));
        }

        if !self.storage.mount_point.starts_with('/') || self.storage.mount_point == "/" {
            return Err(ProvisionError::Config(format!(
                "storage.mount_point must be an absolute path below /, got '{}'",
                self.storage.mount_point
            )));
        }
        for (field, value) in [
            ("storage.fstype", &self.storage.fstype),
            ("storage.options", &self.storage.options),
        ] {
            if value.is_empty() || value.chars().any(char::is_whitespace) {
                return Err(ProvisionError::Config(format!(
                    "{} must be a single non-empty word, got '{}'",
                    field, value
                )));
            }
        }

        for (field, name) in [
            ("daemon.script", &self.daemon.script),
            ("daemon.credentials", &self.daemon.credentials),
            ("recorder.script", &self.recorder.script),
        ] {
            if name.is_empty() || name.contains('/') {
                return Err(ProvisionError::Config(format!(
                    "{} must be a plain file name, got '{}'",
                    field, name
                )));
            }
        }

        Ok(())
    }
}
