// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provisioning settings
//!
//! Every section is optional in the TOML file; missing keys fall back to the
//! defaults below, which describe a stock Raspberry Pi OS install.

use serde::{Deserialize, Serialize};

mod io;
mod validation;

pub use io::CONFIG_ENV;

/// Main settings structure, stored in provision.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// OS packages
    #[serde(default)]
    pub packages: PackagesConfig,

    /// Python runtime, version manager and library
    #[serde(default)]
    pub python: PythonConfig,

    /// The polling daemon and its unit
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// External storage volume
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional webcam recorder service
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// OS package configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackagesConfig {
    /// Packages installed with apt-get before anything else
    #[serde(default = "default_apt_packages")]
    pub apt: Vec<String>,
}

/// Python runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PythonConfig {
    /// Runtime version installed through pyenv
    #[serde(default = "default_python_version")]
    pub version: String,

    /// Where the pyenv installer script is fetched from
    #[serde(default = "default_installer_url")]
    pub installer_url: String,

    /// Device-control library installed with pip
    #[serde(default = "default_library")]
    pub library: String,

    /// Additional pip packages for the daemon
    #[serde(default)]
    pub extra_pip: Vec<String>,

    /// Shell profile files (relative to the user's home) that get the pyenv
    /// initialisation lines
    #[serde(default = "default_profile_files")]
    pub profile_files: Vec<String>,
}

/// Polling daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// systemd unit name, without the `.service` suffix
    #[serde(default = "default_daemon_service")]
    pub service_name: String,

    /// Unit description
    #[serde(default = "default_daemon_description")]
    pub description: String,

    /// Script file name, read from the source directory
    #[serde(default = "default_daemon_script")]
    pub script: String,

    /// Credentials file name, read from the source directory
    #[serde(default = "default_credentials")]
    pub credentials: String,

    /// Install directory name under the user's home when `--install-dir`
    /// is not given
    #[serde(default = "default_install_dir_name")]
    pub install_dir_name: String,

    /// Seconds systemd waits before restarting a failed service
    #[serde(default = "default_restart_sec")]
    pub restart_sec: u32,

    /// Window for the restart burst limit, in seconds
    #[serde(default = "default_start_limit_interval_sec")]
    pub start_limit_interval_sec: u32,

    /// Restarts allowed within the window
    #[serde(default = "default_start_limit_burst")]
    pub start_limit_burst: u32,
}

/// External drive configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Where the volume is mounted
    #[serde(default = "default_mount_point")]
    pub mount_point: String,

    /// Filesystem type written to fstab
    #[serde(default = "default_fstype")]
    pub fstype: String,

    /// Mount options written to fstab
    #[serde(default = "default_mount_options")]
    pub options: String,

    #[serde(default)]
    pub dump: u8,

    #[serde(default = "default_fsck_pass")]
    pub pass: u8,
}

/// Webcam recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecorderConfig {
    #[serde(default = "default_recorder_service")]
    pub service_name: String,

    #[serde(default = "default_recorder_description")]
    pub description: String,

    #[serde(default = "default_recorder_script")]
    pub script: String,

    /// Extra OS packages the recorder needs
    #[serde(default = "default_recorder_apt")]
    pub apt: Vec<String>,

    /// pip packages the recorder needs
    #[serde(default = "default_recorder_pip")]
    pub pip: Vec<String>,

    /// Recording directory, relative to the storage mount point
    #[serde(default = "default_recorder_output_subdir")]
    pub output_subdir: String,

    /// Extra command-line arguments passed to the recorder
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl DaemonConfig {
    /// Full unit file name (`<service_name>.service`).
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }
}

impl RecorderConfig {
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }
}

// ==================== Defaults ====================

fn default_apt_packages() -> Vec<String> {
    [
        "git",
        "curl",
        "make",
        "build-essential",
        "libssl-dev",
        "zlib1g-dev",
        "libbz2-dev",
        "libreadline-dev",
        "libsqlite3-dev",
        "libncursesw5-dev",
        "xz-utils",
        "tk-dev",
        "libxml2-dev",
        "libxmlsec1-dev",
        "libffi-dev",
        "liblzma-dev",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_python_version() -> String {
    "3.11.9".to_string()
}

fn default_installer_url() -> String {
    "https://pyenv.run".to_string()
}

fn default_library() -> String {
    "pylitterbot".to_string()
}

fn default_profile_files() -> Vec<String> {
    vec![".bashrc".to_string()]
}

fn default_daemon_service() -> String {
    "litter-robot".to_string()
}

fn default_daemon_description() -> String {
    "Litter-Robot polling daemon".to_string()
}

fn default_daemon_script() -> String {
    "litter-robot.py".to_string()
}

fn default_credentials() -> String {
    "account_info.json".to_string()
}

fn default_install_dir_name() -> String {
    "litter-robot".to_string()
}

fn default_restart_sec() -> u32 {
    30
}

fn default_start_limit_interval_sec() -> u32 {
    600
}

fn default_start_limit_burst() -> u32 {
    5
}

fn default_mount_point() -> String {
    "/mnt/video_storage".to_string()
}

fn default_fstype() -> String {
    "auto".to_string()
}

fn default_mount_options() -> String {
    "defaults,nofail".to_string()
}

fn default_fsck_pass() -> u8 {
    2
}

fn default_recorder_service() -> String {
    "litter-mon".to_string()
}

fn default_recorder_description() -> String {
    "Litter box webcam recorder".to_string()
}

fn default_recorder_script() -> String {
    "litter-mon.py".to_string()
}

fn default_recorder_apt() -> Vec<String> {
    vec!["libgl1".to_string(), "v4l-utils".to_string()]
}

fn default_recorder_pip() -> Vec<String> {
    vec!["opencv-python-headless".to_string()]
}

fn default_recorder_output_subdir() -> String {
    "recordings".to_string()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            apt: default_apt_packages(),
        }
    }
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            version: default_python_version(),
            installer_url: default_installer_url(),
            library: default_library(),
            extra_pip: Vec::new(),
            profile_files: default_profile_files(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            service_name: default_daemon_service(),
            description: default_daemon_description(),
            script: default_daemon_script(),
            credentials: default_credentials(),
            install_dir_name: default_install_dir_name(),
            restart_sec: default_restart_sec(),
            start_limit_interval_sec: default_start_limit_interval_sec(),
            start_limit_burst: default_start_limit_burst(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_point: default_mount_point(),
            fstype: default_fstype(),
            options: default_mount_options(),
            dump: 0,
            pass: default_fsck_pass(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            service_name: default_recorder_service(),
            description: default_recorder_description(),
            script: default_recorder_script(),
            apt: default_recorder_apt(),
            pip: default_recorder_pip(),
            output_subdir: default_recorder_output_subdir(),
            extra_args: Vec::new(),
        }
    }
}
