// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use litterbot_provision::config::Settings;
use litterbot_provision::error::ProvisionError;
use litterbot_provision::system::SystemRoot;
use tempfile::TempDir;

#[test]
fn test_settings_default_values() {
    let settings = Settings::default();

    assert_eq!(settings.python.version, "3.11.9");
    assert_eq!(settings.python.installer_url, "https://pyenv.run");
    assert_eq!(settings.python.library, "pylitterbot");
    assert_eq!(settings.python.profile_files, vec![".bashrc"]);
    assert_eq!(settings.daemon.unit_name(), "litter-robot.service");
    assert_eq!(settings.daemon.restart_sec, 30);
    assert_eq!(settings.daemon.start_limit_interval_sec, 600);
    assert_eq!(settings.daemon.start_limit_burst, 5);
    assert_eq!(settings.storage.mount_point, "/mnt/video_storage");
    assert_eq!(settings.storage.options, "defaults,nofail");
    assert_eq!(settings.recorder.unit_name(), "litter-mon.service");
}

#[test]
fn test_default_packages_cover_pyenv_build() {
    let settings = Settings::default();
    for package in ["git", "curl", "build-essential", "libssl-dev", "libffi-dev"] {
        assert!(
            settings.packages.apt.iter().any(|p| p == package),
            "missing {}",
            package
        );
    }
}

#[test]
fn test_default_settings_are_valid() {
    assert!(Settings::default().validate().is_ok());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let settings: Settings = toml::from_str(
        r#"
[python]
version = "3.12.4"

[daemon]
restart_sec = 60
"#,
    )
    .expect("valid settings");

    assert_eq!(settings.python.version, "3.12.4");
    assert_eq!(settings.python.library, "pylitterbot");
    assert_eq!(settings.daemon.restart_sec, 60);
    assert_eq!(settings.daemon.start_limit_burst, 5);
    assert_eq!(settings.storage, Settings::default().storage);
}

#[test]
fn test_validation_rejects_zero_restart() {
    let mut settings = Settings::default();
    settings.daemon.restart_sec = 0;
    assert!(matches!(
        settings.validate(),
        Err(ProvisionError::Config(_))
    ));
}

#[test]
fn test_validation_rejects_relative_mount_point() {
    let mut settings = Settings::default();
    settings.storage.mount_point = "video_storage".to_string();
    let err = settings.validate().unwrap_err();
    assert!(err.to_string().contains("storage.mount_point"));
}

#[test]
fn test_validation_rejects_unit_suffix() {
    let mut settings = Settings::default();
    settings.daemon.service_name = "litter-robot.service".to_string();
    assert!(settings.validate().is_err());
}

#[test]
fn test_validation_rejects_empty_python_version() {
    let mut settings = Settings::default();
    settings.python.version = "  ".to_string();
    assert!(settings.validate().is_err());
}

#[test]
fn test_discover_reads_working_directory_file() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("provision.toml"),
        "[storage]\nmount_point = \"/mnt/cats\"\n",
    )
    .unwrap();

    let root = SystemRoot::new(temp.path());
    let (settings, source) = Settings::discover(None, temp.path(), &root).unwrap();
    assert_eq!(settings.storage.mount_point, "/mnt/cats");
    assert_eq!(source, Some(temp.path().join("provision.toml")));
}

#[test]
fn test_discover_validates_loaded_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.toml");
    std::fs::write(&path, "[daemon]\nstart_limit_burst = 0\n").unwrap();

    let root = SystemRoot::new(temp.path());
    let err = Settings::discover(Some(&path), temp.path(), &root).unwrap_err();
    assert!(matches!(err, ProvisionError::Config(_)));
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let result = Settings::discover(
        Some(&temp.path().join("missing.toml")),
        temp.path(),
        &SystemRoot::new(temp.path()),
    );
    assert!(result.is_err());
}
