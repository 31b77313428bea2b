// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provisioning run
//!
//! [`Provisioner::run`] walks the steps in a fixed order and stops at the
//! first failure:
//!
//! 1. preflight: credentials and script present, caller is root, user exists
//! 2. OS packages
//! 3. pyenv, unless `~/.pyenv` already exists
//! 4. shell-profile lines, only those missing
//! 5. Python runtime, unless the version directory exists
//! 6. device-control library
//! 7. copy credentials and script into the install directory
//! 8. unit file (always rewritten), daemon-reload, enable, restart
//! 9. external drive, only if its UUID is attached
//! 10. recorder service, when requested
//! 11. verify that every deployed unit is enabled and active
//!
//! File reads and writes go through a [`SystemRoot`]; commands go through a
//! [`CommandRunner`].

pub mod deploy;
pub mod report;

pub use report::{Outcome, Report, Step, StepRecord};

use std::path::{Component, Path, PathBuf};

use chrono::Local;

use crate::config::Settings;
use crate::error::{ProvisionError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::system::profile::{ensure_lines, missing_lines};
use crate::system::pyenv::{self, PyenvLayout, PROFILE_HEADER};
use crate::system::storage::{self, FstabChange, FstabEntry};
use crate::system::systemd::{self, ServiceUnit, UnitWrite};
use crate::system::users::{self, UserAccount};
use crate::system::{packages, SystemRoot};

/// What the operator asked for
#[derive(Debug, Clone, Default)]
pub struct ProvisionRequest {
    /// Service-run user; defaults to the invoking user
    pub user: Option<String>,
    /// Install directory; defaults to `<home>/<install_dir_name>`
    pub install_dir: Option<PathBuf>,
    /// Filesystem UUID of the external drive
    pub drive_uuid: Option<String>,
    /// Directory holding the credentials file and scripts
    pub source_dir: PathBuf,
    pub with_recorder: bool,
    pub dry_run: bool,
}

/// Resolved user and locations for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub account: UserAccount,
    pub install_dir: PathBuf,
    pub drive_uuid: Option<String>,
    pub with_recorder: bool,
}

/// Validated source files
#[derive(Debug, Clone)]
struct Sources {
    credentials: PathBuf,
    script: PathBuf,
    recorder_script: Option<PathBuf>,
}

pub struct Provisioner<'a> {
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    root: SystemRoot,
}

impl<'a> Provisioner<'a> {
    pub fn new(settings: &'a Settings, runner: &'a dyn CommandRunner, root: SystemRoot) -> Self {
        Self {
            settings,
            runner,
            root,
        }
    }

    pub fn root(&self) -> &SystemRoot {
        &self.root
    }

    /// Run every step. Returns the per-step report on success.
    pub async fn run(&self, request: &ProvisionRequest) -> Result<Report> {
        let mut report = Report::new(request.dry_run);

        let (target, sources) = self.preflight(request, &mut report).await?;
        let layout = PyenvLayout::for_user(&target.account);
        let dry_run = request.dry_run;

        self.install_packages(&target, &mut report).await?;
        self.install_version_manager(&target, &layout, dry_run, &mut report)
            .await?;
        self.configure_shell_profile(&target, dry_run, &mut report)
            .await?;
        self.install_runtime(&target, &layout, &mut report).await?;
        self.install_library(&target, &layout, &mut report).await?;
        self.deploy_daemon(&target, &sources, dry_run, &mut report)
            .await?;

        let daemon_unit = self.daemon_unit(&target, &layout);
        self.register_unit(&daemon_unit, Step::ServiceUnit, dry_run, &mut report)
            .await?;

        if let Some(uuid) = &target.drive_uuid {
            self.mount_storage(&target, uuid, dry_run, &mut report)
                .await?;
        }

        let mut units = vec![daemon_unit.name.clone()];
        if let Some(script) = &sources.recorder_script {
            let unit = self
                .deploy_recorder(&target, &layout, script, dry_run, &mut report)
                .await?;
            units.push(unit.name);
        }

        self.verify(&units, dry_run, &mut report).await?;
        Ok(report)
    }

    // ==================== Target resolution ====================

    /// Resolve the service user: explicit name, else the invoking user.
    pub async fn resolve_account(&self, user: Option<&str>) -> Result<UserAccount> {
        let name = match user {
            Some(name) => name.to_string(),
            None => users::default_user_from_env().ok_or_else(|| {
                ProvisionError::InvalidInput(
                    "cannot determine the service user; pass --user".to_string(),
                )
            })?,
        };
        users::lookup_user(self.runner, &name).await
    }

    /// Absolute install directory for `account`.
    ///
    /// The directory ends up owned by the service user, so `/`, top-level
    /// directories, the home directory and its ancestors are refused.
    pub fn install_dir(&self, account: &UserAccount, explicit: Option<&Path>) -> Result<PathBuf> {
        let dir = match explicit {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => std::env::current_dir()?.join(dir),
            None => account.home.join(&self.settings.daemon.install_dir_name),
        };
        check_install_dir(&dir, &account.home)?;
        Ok(dir)
    }

    /// Resolve the target without touching any source file or requiring
    /// root. Used by `render-unit`.
    pub async fn resolve_target(&self, request: &ProvisionRequest) -> Result<Target> {
        let drive_uuid = drive_uuid(request)?;
        let account = self.resolve_account(request.user.as_deref()).await?;
        let install_dir = self.install_dir(&account, request.install_dir.as_deref())?;
        Ok(Target {
            account,
            install_dir,
            drive_uuid,
            with_recorder: request.with_recorder,
        })
    }

    async fn preflight(
        &self,
        request: &ProvisionRequest,
        report: &mut Report,
    ) -> Result<(Target, Sources)> {
        let daemon = &self.settings.daemon;

        let credentials = request.source_dir.join(&daemon.credentials);
        if !credentials.is_file() {
            return Err(ProvisionError::MissingCredentials(credentials));
        }
        let missing_keys = deploy::check_credentials(&credentials)?;
        if !missing_keys.is_empty() {
            report.warn(
                Step::Preflight,
                format!(
                    "{} has no {} key(s); the daemon will fail to log in",
                    credentials.display(),
                    missing_keys.join("/")
                ),
            );
        }

        let script = request.source_dir.join(&daemon.script);
        deploy::require_file(&script)?;

        let recorder_script = if request.with_recorder {
            let path = request.source_dir.join(&self.settings.recorder.script);
            deploy::require_file(&path)?;
            Some(path)
        } else {
            None
        };

        let drive_uuid = drive_uuid(request)?;

        match users::require_root(self.runner).await {
            Ok(()) => {}
            Err(ProvisionError::NotPrivileged(uid)) if request.dry_run => {
                report.warn(
                    Step::Preflight,
                    format!("running as uid {}; a real run requires root", uid),
                );
            }
            Err(err) => return Err(err),
        }

        let account = self.resolve_account(request.user.as_deref()).await?;
        let install_dir = self.install_dir(&account, request.install_dir.as_deref())?;
        tracing::info!(
            user = %account.name,
            install_dir = %install_dir.display(),
            "preflight passed"
        );
        report.applied(
            Step::Preflight,
            format!(
                "user {} (uid {}), install dir {}",
                account.name,
                account.uid,
                install_dir.display()
            ),
        );

        Ok((
            Target {
                account,
                install_dir,
                drive_uuid,
                with_recorder: request.with_recorder,
            },
            Sources {
                credentials,
                script,
                recorder_script,
            },
        ))
    }

    // ==================== Dependencies ====================

    async fn install_packages(&self, target: &Target, report: &mut Report) -> Result<()> {
        let mut wanted = self.settings.packages.apt.clone();
        if target.with_recorder {
            wanted.extend(self.settings.recorder.apt.iter().cloned());
        }
        let count = packages::install(self.runner, &wanted).await?;
        report.applied(Step::Packages, format!("{} packages", count));
        Ok(())
    }

    async fn install_version_manager(
        &self,
        target: &Target,
        layout: &PyenvLayout,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        if self.root.resolve(layout.root()).is_dir() {
            report.skipped(
                Step::VersionManager,
                format!("{} already exists", layout.root().display()),
            );
            return Ok(());
        }

        let url = &self.settings.python.installer_url;
        if dry_run {
            report.planned(
                Step::VersionManager,
                format!("fetch {} and run it as {}", url, target.account.name),
            );
            return Ok(());
        }

        tracing::info!("installing pyenv for {} from {}", target.account.name, url);
        let script = pyenv::fetch_installer(url).await?;
        pyenv::run_installer(self.runner, &target.account, layout, script).await?;
        report.applied(
            Step::VersionManager,
            format!("installed into {}", layout.root().display()),
        );
        Ok(())
    }

    async fn configure_shell_profile(
        &self,
        target: &Target,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        let wanted = pyenv::profile_lines();

        for file in &self.settings.python.profile_files {
            let path = target.account.home.join(file);
            let host_path = self.root.resolve(&path);

            if dry_run {
                let content = std::fs::read_to_string(&host_path).unwrap_or_default();
                let missing = missing_lines(&content, &wanted);
                if missing.is_empty() {
                    report.skipped(Step::ShellProfile, format!("{} already configured", path.display()));
                } else {
                    report.planned(
                        Step::ShellProfile,
                        format!("append {} line(s) to {}", missing.len(), path.display()),
                    );
                }
                continue;
            }

            let outcome = ensure_lines(&host_path, &wanted, Some(PROFILE_HEADER))?;
            if outcome.created {
                self.chown(&target.account, &path, false).await?;
            }
            if outcome.appended == 0 {
                report.skipped(Step::ShellProfile, format!("{} already configured", path.display()));
            } else {
                report.applied(
                    Step::ShellProfile,
                    format!("appended {} line(s) to {}", outcome.appended, path.display()),
                );
            }
        }
        Ok(())
    }

    async fn install_runtime(
        &self,
        target: &Target,
        layout: &PyenvLayout,
        report: &mut Report,
    ) -> Result<()> {
        let version = &self.settings.python.version;
        if self.root.resolve(layout.version_dir(version)).is_dir() {
            report.skipped(Step::Runtime, format!("Python {} already installed", version));
        } else {
            pyenv::install_version(self.runner, &target.account, layout, version).await?;
            report.applied(Step::Runtime, format!("Python {}", version));
        }
        pyenv::set_global(self.runner, &target.account, layout, version).await?;
        Ok(())
    }

    async fn install_library(
        &self,
        target: &Target,
        layout: &PyenvLayout,
        report: &mut Report,
    ) -> Result<()> {
        let python = &self.settings.python;
        let mut wanted = vec![python.library.clone()];
        wanted.extend(python.extra_pip.iter().cloned());
        pyenv::pip_install(self.runner, &target.account, layout, &python.version, &wanted).await?;
        report.applied(Step::Library, wanted.join(" "));
        Ok(())
    }

    // ==================== Deployment ====================

    async fn deploy_daemon(
        &self,
        target: &Target,
        sources: &Sources,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        let daemon = &self.settings.daemon;
        let files = [
            (&sources.credentials, &daemon.credentials, deploy::CREDENTIALS_MODE),
            (&sources.script, &daemon.script, deploy::SCRIPT_MODE),
        ];

        if dry_run {
            for (source, name, mode) in files {
                report.planned(
                    Step::Deploy,
                    format!(
                        "copy {} to {} ({:o})",
                        source.display(),
                        target.install_dir.join(name).display(),
                        mode
                    ),
                );
            }
            return Ok(());
        }

        let existed = self.root.resolve(&target.install_dir).is_dir();
        for (source, name, mode) in files {
            let dest = self.root.resolve(target.install_dir.join(name));
            deploy::install_file(source, &dest, mode)?;
        }

        // A directory outside home that was already there keeps its owner.
        if !existed || target.install_dir.starts_with(&target.account.home) {
            self.chown(&target.account, &target.install_dir, true).await?;
        } else {
            for (_, name, _) in files {
                self.chown(&target.account, &target.install_dir.join(name), false)
                    .await?;
            }
            report.warn(
                Step::Deploy,
                format!(
                    "{} already existed outside {}; only the deployed files were handed to {}",
                    target.install_dir.display(),
                    target.account.home.display(),
                    target.account.name
                ),
            );
        }
        report.applied(
            Step::Deploy,
            format!(
                "{} and {} in {}",
                daemon.credentials,
                daemon.script,
                target.install_dir.display()
            ),
        );
        Ok(())
    }

    /// The polling daemon's unit.
    pub fn daemon_unit(&self, target: &Target, layout: &PyenvLayout) -> ServiceUnit {
        let daemon = &self.settings.daemon;
        self.service_unit(
            target,
            daemon.unit_name(),
            daemon.description.clone(),
            vec![
                layout.python(&self.settings.python.version).display().to_string(),
                target.install_dir.join(&daemon.script).display().to_string(),
            ],
            Vec::new(),
        )
    }

    /// The recorder's unit; its output lands on the external drive.
    pub fn recorder_unit(&self, target: &Target, layout: &PyenvLayout) -> ServiceUnit {
        let recorder = &self.settings.recorder;
        let mut exec_start = vec![
            layout.python(&self.settings.python.version).display().to_string(),
            target.install_dir.join(&recorder.script).display().to_string(),
            "--output".to_string(),
            self.recording_dir().display().to_string(),
            "--headless".to_string(),
        ];
        exec_start.extend(recorder.extra_args.iter().cloned());

        let requires_mounts_for = if target.drive_uuid.is_some() {
            vec![PathBuf::from(&self.settings.storage.mount_point)]
        } else {
            Vec::new()
        };

        self.service_unit(
            target,
            recorder.unit_name(),
            recorder.description.clone(),
            exec_start,
            requires_mounts_for,
        )
    }

    /// Every unit a run with this target deploys, daemon first.
    pub fn units(&self, target: &Target) -> Vec<ServiceUnit> {
        let layout = PyenvLayout::for_user(&target.account);
        let mut units = vec![self.daemon_unit(target, &layout)];
        if target.with_recorder {
            units.push(self.recorder_unit(target, &layout));
        }
        units
    }

    fn service_unit(
        &self,
        target: &Target,
        name: String,
        description: String,
        exec_start: Vec<String>,
        requires_mounts_for: Vec<PathBuf>,
    ) -> ServiceUnit {
        let daemon = &self.settings.daemon;
        ServiceUnit {
            name,
            description,
            user: target.account.name.clone(),
            group: target.account.gid.to_string(),
            working_directory: target.install_dir.clone(),
            exec_start,
            restart_sec: daemon.restart_sec,
            start_limit_interval_sec: daemon.start_limit_interval_sec,
            start_limit_burst: daemon.start_limit_burst,
            environment: vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())],
            requires_mounts_for,
        }
    }

    fn recording_dir(&self) -> PathBuf {
        Path::new(&self.settings.storage.mount_point).join(&self.settings.recorder.output_subdir)
    }

    /// Write the unit file (unconditionally), reload systemd, enable and
    /// restart the service.
    async fn register_unit(
        &self,
        unit: &ServiceUnit,
        step: Step,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<()> {
        let path = self.root.unit_path(&unit.name);
        let write = if dry_run {
            report.planned(step, format!("write {}", path.display()));
            None
        } else {
            Some(systemd::write_unit(&path, &unit.render())?)
        };

        systemd::daemon_reload(self.runner).await?;
        systemd::enable_and_restart(self.runner, &unit.name).await?;

        if let Some(write) = write {
            let how = match write {
                UnitWrite::Created => "created",
                UnitWrite::Changed => "updated",
                UnitWrite::Unchanged => "rewritten (unchanged)",
            };
            report.applied(step, format!("{} {}, enabled and restarted", unit.name, how));
        }
        Ok(())
    }

    // ==================== Storage ====================

    /// Add the fstab entry and mount the drive. Returns whether the drive
    /// is attached.
    async fn mount_storage(
        &self,
        target: &Target,
        uuid: &str,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<bool> {
        // fstab gets the link name udev chose, whatever case was typed.
        let Some(uuid) = storage::find_attached(&self.root.disk_by_uuid_dir(), uuid) else {
            report.warn(
                Step::Storage,
                format!("no block device with UUID {} is attached; skipping mount", uuid),
            );
            return Ok(false);
        };
        let uuid = uuid.as_str();

        let storage_config = &self.settings.storage;
        let mount_point = Path::new(&storage_config.mount_point);
        let entry = FstabEntry::new(uuid, storage_config);
        let fstab = self.root.fstab();
        let current = std::fs::read_to_string(&fstab).unwrap_or_default();

        if let Some(existing) = storage::fstab_mount_point(&current, uuid) {
            if !Path::new(&existing).components().eq(mount_point.components()) {
                report.warn(
                    Step::Storage,
                    format!(
                        "fstab already mounts UUID={} at {}, not {}; leaving the drive alone",
                        uuid,
                        existing,
                        mount_point.display()
                    ),
                );
                return Ok(true);
            }
        }

        if dry_run {
            if storage::fstab_has_uuid(&current, uuid) {
                report.skipped(Step::Storage, format!("fstab already lists UUID={}", uuid));
            } else {
                report.planned(Step::Storage, format!("append to fstab: {}", entry.to_line()));
            }
        } else {
            std::fs::create_dir_all(self.root.resolve(mount_point))?;
            match storage::ensure_fstab_entry(&fstab, &entry, Local::now())? {
                FstabChange::AlreadyPresent => {
                    report.skipped(Step::Storage, format!("fstab already lists UUID={}", uuid));
                }
                FstabChange::Appended { .. } => {
                    // systemd generates mount units from fstab.
                    systemd::daemon_reload(self.runner).await?;
                    report.applied(Step::Storage, format!("fstab entry for UUID={}", uuid));
                }
            }
        }

        let mounts = std::fs::read_to_string(self.root.proc_mounts()).unwrap_or_default();
        if storage::is_mounted(&mounts, mount_point) {
            report.skipped(Step::Storage, format!("{} already mounted", mount_point.display()));
        } else {
            storage::mount(self.runner, &storage_config.mount_point).await?;
            if dry_run {
                report.planned(Step::Storage, format!("mount {}", mount_point.display()));
            } else {
                report.applied(Step::Storage, format!("mounted {}", mount_point.display()));
            }
        }

        // Filesystems without Unix ownership (vfat, exfat) refuse chown.
        let chown = self.chown_command(&target.account, mount_point, false);
        let out = self.runner.run(&chown).await?;
        if !out.success() {
            report.warn(
                Step::Storage,
                format!(
                    "could not hand {} to {}: {}",
                    mount_point.display(),
                    target.account.name,
                    out.stderr.trim()
                ),
            );
        }
        Ok(true)
    }

    // ==================== Recorder ====================

    async fn deploy_recorder(
        &self,
        target: &Target,
        layout: &PyenvLayout,
        script: &Path,
        dry_run: bool,
        report: &mut Report,
    ) -> Result<ServiceUnit> {
        let recorder = &self.settings.recorder;
        pyenv::pip_install(
            self.runner,
            &target.account,
            layout,
            &self.settings.python.version,
            &recorder.pip,
        )
        .await?;

        let dest = target.install_dir.join(&recorder.script);
        let output_dir = self.recording_dir();
        if dry_run {
            report.planned(
                Step::Recorder,
                format!("copy {} to {}", script.display(), dest.display()),
            );
            report.planned(
                Step::Recorder,
                format!("create {}", output_dir.display()),
            );
        } else {
            deploy::install_file(script, &self.root.resolve(&dest), deploy::SCRIPT_MODE)?;
            self.chown(&target.account, &dest, false).await?;
            std::fs::create_dir_all(self.root.resolve(&output_dir))?;
            self.chown(&target.account, &output_dir, false).await?;
            report.applied(
                Step::Recorder,
                format!("{} recording to {}", recorder.script, output_dir.display()),
            );
        }

        if target.drive_uuid.is_none() {
            report.warn(
                Step::Recorder,
                format!(
                    "no external drive configured; recordings go to {} on the root filesystem",
                    output_dir.display()
                ),
            );
        }

        let unit = self.recorder_unit(target, layout);
        self.register_unit(&unit, Step::Recorder, dry_run, report)
            .await?;
        Ok(unit)
    }

    // ==================== Verification ====================

    async fn verify(&self, units: &[String], dry_run: bool, report: &mut Report) -> Result<()> {
        for unit in units {
            if dry_run {
                report.skipped(Step::Verify, format!("{}: dry run", unit));
                continue;
            }
            let state = systemd::unit_state(self.runner, unit).await?;
            if state.is_healthy() {
                report.applied(Step::Verify, format!("{} enabled and active", unit));
            } else {
                report.warn(
                    Step::Verify,
                    format!(
                        "{} is {} / {}; check `journalctl -u {}`",
                        unit, state.enabled, state.active, unit
                    ),
                );
            }
        }
        Ok(())
    }

    // ==================== Helpers ====================

    fn chown_command(&self, account: &UserAccount, path: &Path, recursive: bool) -> CommandSpec {
        let mut command = CommandSpec::new("chown");
        if recursive {
            command = command.arg("-R");
        }
        command
            .arg(account.owner_spec())
            .arg(path.display().to_string())
    }

    async fn chown(&self, account: &UserAccount, path: &Path, recursive: bool) -> Result<()> {
        crate::exec::run_checked(self.runner, &self.chown_command(account, path, recursive))
            .await?;
        Ok(())
    }
}

/// Validated drive UUID in the case udev uses for it.
fn drive_uuid(request: &ProvisionRequest) -> Result<Option<String>> {
    request
        .drive_uuid
        .as_deref()
        .map(storage::normalize_uuid)
        .transpose()
}

fn check_install_dir(dir: &Path, home: &Path) -> Result<()> {
    let refuse = |why: &str| -> Result<()> {
        Err(ProvisionError::InvalidInput(format!(
            "refusing to use {} as the install directory: {}",
            dir.display(),
            why
        )))
    };

    if dir.components().any(|c| c == Component::ParentDir) {
        return refuse("it contains '..'");
    }
    let depth = dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if depth < 2 {
        return refuse("it is the root or a top-level directory");
    }
    if home.starts_with(dir) {
        return refuse("it is the user's home directory or one of its parents");
    }
    Ok(())
}
