// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for litterbot-provision
//!
//! This module defines all error types used throughout the application.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The account credentials file is not where it was expected
    #[error("Credentials file not found: {} (copy your account_info.json next to the script)", .0.display())]
    MissingCredentials(PathBuf),

    /// The credentials file exists but is not usable JSON
    #[error("Invalid credentials file {}: {reason}", path.display())]
    InvalidCredentials { path: PathBuf, reason: String },

    /// A file that must be deployed is missing
    #[error("Required file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// The caller is not root
    #[error("Permission denied: must be run as root (effective uid {0}); try sudo")]
    NotPrivileged(String),

    /// The service-run user does not exist on this machine
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// An external command exited unsuccessfully
    #[error("Command failed ({}): {command}{}", exit_label(.code), stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An external command could not be started at all
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote installer failed
    #[error("Download failed: {0}")]
    Download(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(String),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

impl ProvisionError {
    /// Process exit code for this error.
    ///
    /// A failed external command hands its own status through so callers see
    /// what the underlying tool reported; everything else exits with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::CommandFailed {
                code: Some(code), ..
            } if (1..=255).contains(code) => *code as u8,
            _ => 1,
        }
    }

    /// Whether this error is one of the validated preconditions.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ProvisionError::MissingCredentials(_)
                | ProvisionError::InvalidCredentials { .. }
                | ProvisionError::MissingFile(_)
                | ProvisionError::NotPrivileged(_)
                | ProvisionError::UnknownUser(_)
                | ProvisionError::InvalidInput(_)
        )
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl From<toml::de::Error> for ProvisionError {
    fn from(err: toml::de::Error) -> Self {
        ProvisionError::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for ProvisionError {
    fn from(err: toml::ser::Error) -> Self {
        ProvisionError::Toml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_mentions_path() {
        let err = ProvisionError::MissingCredentials(PathBuf::from("/srv/account_info.json"));
        assert!(err.to_string().contains("/srv/account_info.json"));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_not_privileged() {
        let err = ProvisionError::NotPrivileged("1000".to_string());
        assert!(err.to_string().contains("must be run as root"));
        assert!(err.to_string().contains("1000"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unknown_user() {
        let err = ProvisionError::UnknownUser("ghost".to_string());
        assert_eq!(err.to_string(), "Unknown user: ghost");
    }

    #[test]
    fn test_command_failed_display_with_stderr() {
        let err = ProvisionError::CommandFailed {
            command: "apt-get install -y git".to_string(),
            code: Some(100),
            stderr: "E: Unable to locate package\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("exit status 100"));
        assert!(text.contains("apt-get install -y git"));
        assert!(text.ends_with("E: Unable to locate package"));
    }

    #[test]
    fn test_command_failed_display_without_stderr() {
        let err = ProvisionError::CommandFailed {
            command: "systemctl restart x".to_string(),
            code: None,
            stderr: "   ".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command failed (terminated by signal): systemctl restart x"
        );
    }

    #[test]
    fn test_exit_code_propagates_command_status() {
        let err = ProvisionError::CommandFailed {
            command: "pyenv install 3.11.9".to_string(),
            code: Some(2),
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 2);
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_exit_code_out_of_range_falls_back() {
        let err = ProvisionError::CommandFailed {
            command: "x".to_string(),
            code: Some(-1),
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 1);

        let err = ProvisionError::CommandFailed {
            command: "x".to_string(),
            code: Some(300),
            stderr: String::new(),
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProvisionError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: ProvisionError = toml_err.into();
        assert!(matches!(err, ProvisionError::Toml(_)));
    }
}
