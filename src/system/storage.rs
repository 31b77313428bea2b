// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! UUID-keyed fstab entries and mounting of the external drive.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::config::StorageConfig;
use crate::error::{ProvisionError, Result};
use crate::exec::{run_checked, CommandRunner, CommandSpec};

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}|[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}|[0-9A-Fa-f]{16})$",
    )
    .expect("uuid regex must be valid")
});

/// One line of `/etc/fstab`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub uuid: String,
    pub mount_point: String,
    pub fstype: String,
    pub options: String,
    pub dump: u8,
    pub pass: u8,
}

impl FstabEntry {
    pub fn new(uuid: &str, config: &StorageConfig) -> Self {
        Self {
            uuid: uuid.to_string(),
            mount_point: config.mount_point.clone(),
            fstype: config.fstype.clone(),
            options: config.options.clone(),
            dump: config.dump,
            pass: config.pass,
        }
    }

    /// Render as a tab-separated fstab line (no trailing newline).
    pub fn to_line(&self) -> String {
        format!(
            "UUID={}\t{}\t{}\t{}\t{}\t{}",
            self.uuid,
            escape_fstab_field(&self.mount_point),
            self.fstype,
            self.options,
            self.dump,
            self.pass
        )
    }
}

/// Check that a string looks like a filesystem UUID.
///
/// Accepts RFC 4122 UUIDs (ext4, btrfs, xfs), FAT/exFAT volume serials
/// (`ABCD-1234`) and 16-digit NTFS serials.
pub fn validate_uuid(uuid: &str) -> Result<()> {
    if UUID_RE.is_match(uuid) {
        Ok(())
    } else {
        Err(ProvisionError::InvalidInput(format!(
            "'{}' does not look like a filesystem UUID",
            uuid
        )))
    }
}

/// Validate `uuid` and spell it the way udev names its by-uuid link:
/// lower case for RFC 4122 UUIDs, upper case for FAT and NTFS serials.
pub fn normalize_uuid(uuid: &str) -> Result<String> {
    validate_uuid(uuid)?;
    if uuid.len() == 36 {
        Ok(uuid.to_ascii_lowercase())
    } else {
        Ok(uuid.to_ascii_uppercase())
    }
}

/// fstab and /proc/mounts encode blanks and backslashes as octal escapes.
fn escape_fstab_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            ' ' => out.push_str("\\040"),
            '\t' => out.push_str("\\011"),
            '\n' => out.push_str("\\012"),
            '\\' => out.push_str("\\134"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_fstab_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// The device field of an fstab line names this UUID.
fn spec_matches_uuid(spec: &str, uuid: &str) -> bool {
    let spec = spec.trim_matches('"');
    let value = if let Some(rest) = spec.strip_prefix("UUID=") {
        rest.trim_matches('"')
    } else if let Some(rest) = spec.strip_prefix("/dev/disk/by-uuid/") {
        rest
    } else {
        return false;
    };
    value.eq_ignore_ascii_case(uuid)
}

/// Whether any active (uncommented) entry in `fstab` refers to `uuid`.
pub fn fstab_has_uuid(fstab: &str, uuid: &str) -> bool {
    fstab
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
        .any(|spec| spec_matches_uuid(spec, uuid))
}

/// Mount point of the first active fstab entry for `uuid`.
pub fn fstab_mount_point(fstab: &str, uuid: &str) -> Option<String> {
    fstab
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            let spec = fields.next()?;
            if !spec_matches_uuid(spec, uuid) {
                return None;
            }
            fields.next().map(unescape_fstab_field)
        })
}

/// Whether `mount_point` appears as a mount target in `/proc/mounts` text.
pub fn is_mounted(mounts: &str, mount_point: &Path) -> bool {
    let wanted = normalize(mount_point);
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|target| normalize(Path::new(&unescape_fstab_field(target))) == wanted)
}

fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// Name of the by-uuid link for `uuid` in `by_uuid_dir`, if a device with
/// that UUID is attached. Falls back to a case-insensitive match.
pub fn find_attached(by_uuid_dir: &Path, uuid: &str) -> Option<String> {
    if by_uuid_dir.join(uuid).exists() {
        return Some(uuid.to_string());
    }
    std::fs::read_dir(by_uuid_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .find(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.eq_ignore_ascii_case(uuid))
                && entry.path().exists()
        })
        .and_then(|entry| entry.file_name().into_string().ok())
}

/// What [`ensure_fstab_entry`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FstabChange {
    AlreadyPresent,
    Appended { backup: Option<PathBuf> },
}

/// Append `entry` to the fstab at `path` unless its UUID is already listed.
///
/// A timestamped copy of the previous file is kept next to it before the
/// append.
pub fn ensure_fstab_entry(
    path: &Path,
    entry: &FstabEntry,
    now: DateTime<Local>,
) -> Result<FstabChange> {
    let current = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    if fstab_has_uuid(&current, &entry.uuid) {
        tracing::info!("fstab already has an entry for UUID={}", entry.uuid);
        return Ok(FstabChange::AlreadyPresent);
    }

    let backup = if path.exists() {
        let backup = backup_path(path, now);
        std::fs::copy(path, &backup)?;
        tracing::info!("saved fstab backup to {}", backup.display());
        Some(backup)
    } else {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        None
    };

    let mut block = String::new();
    if !current.is_empty() && !current.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&entry.to_line());
    block.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(block.as_bytes())?;
    tracing::info!("added fstab entry: {}", entry.to_line());

    Ok(FstabChange::Appended { backup })
}

fn backup_path(path: &Path, now: DateTime<Local>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "fstab".to_string());
    path.with_file_name(format!("{}.bak.{}", name, now.format("%Y%m%d%H%M%S")))
}

/// Mount the fstab entry for `mount_point`.
pub async fn mount(runner: &dyn CommandRunner, mount_point: &str) -> Result<()> {
    run_checked(runner, &CommandSpec::new("mount").arg(mount_point)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use tempfile::TempDir;

    const UUID: &str = "0a1b2c3d-4e5f-6789-abcd-ef0123456789";

    fn entry(uuid: &str) -> FstabEntry {
        FstabEntry::new(uuid, &StorageConfig::default())
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_entry_line() {
        assert_eq!(
            entry("ABCD-1234").to_line(),
            "UUID=ABCD-1234\t/mnt/video_storage\tauto\tdefaults,nofail\t0\t2"
        );
    }

    #[test]
    fn test_entry_line_escapes_spaces() {
        let mut e = entry("ABCD-1234");
        e.mount_point = "/mnt/video storage".to_string();
        assert!(e.to_line().contains("/mnt/video\\040storage"));
    }

    #[test]
    fn test_validate_uuid_formats() {
        assert!(validate_uuid(UUID).is_ok());
        assert!(validate_uuid("ABCD-1234").is_ok());
        assert!(validate_uuid("0123456789ABCDEF").is_ok());
        assert!(validate_uuid("not-a-uuid").is_err());
        assert!(validate_uuid("ABCD-1234 /etc").is_err());
        assert!(validate_uuid("").is_err());
    }

    #[test]
    fn test_fstab_has_uuid_variants() {
        let fstab = format!(
            "proc /proc proc defaults 0 0\n# UUID=DEAD-BEEF /old auto defaults 0 0\nUUID=\"{}\" /mnt/x ext4 defaults 0 2\n/dev/disk/by-uuid/ABCD-1234 /mnt/y vfat defaults 0 0\n",
            UUID.to_uppercase()
        );
        assert!(fstab_has_uuid(&fstab, UUID));
        assert!(fstab_has_uuid(&fstab, "abcd-1234"));
        assert!(!fstab_has_uuid(&fstab, "DEAD-BEEF"));
        assert!(!fstab_has_uuid("", UUID));
    }

    #[test]
    fn test_is_mounted_handles_escapes() {
        let mounts = "/dev/sda1 /mnt/video\\040storage ext4 rw,relatime 0 0\n/dev/root / ext4 rw 0 0\n";
        assert!(is_mounted(mounts, Path::new("/mnt/video storage")));
        assert!(is_mounted(mounts, Path::new("/mnt/video storage/")));
        assert!(!is_mounted(mounts, Path::new("/mnt/video_storage")));
    }

    #[test]
    fn test_unescape_leaves_plain_text() {
        assert_eq!(unescape_fstab_field("/mnt/a\\134b"), "/mnt/a\\b");
        assert_eq!(unescape_fstab_field("/mnt/end\\"), "/mnt/end\\");
        assert_eq!(unescape_fstab_field("/mnt/x\\9zz"), "/mnt/x\\9zz");
    }

    #[test]
    fn test_ensure_fstab_entry_appends_once_with_backup() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fstab");
        std::fs::write(&path, "proc /proc proc defaults 0 0").unwrap();

        let first = ensure_fstab_entry(&path, &entry(UUID), fixed_time()).unwrap();
        let backup = temp.path().join("fstab.bak.20261019083000");
        assert_eq!(
            first,
            FstabChange::Appended {
                backup: Some(backup.clone())
            }
        );
        assert_eq!(
            std::fs::read_to_string(&backup).unwrap(),
            "proc /proc proc defaults 0 0"
        );

        let second = ensure_fstab_entry(&path, &entry(UUID), fixed_time()).unwrap();
        assert_eq!(second, FstabChange::AlreadyPresent);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(UUID).count(), 1);
        assert!(content.starts_with("proc /proc proc defaults 0 0\nUUID="));
    }

    #[test]
    fn test_ensure_fstab_entry_creates_missing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("etc/fstab");
        let change = ensure_fstab_entry(&path, &entry("ABCD-1234"), fixed_time()).unwrap();
        assert_eq!(change, FstabChange::Appended { backup: None });
        assert!(fstab_has_uuid(&std::fs::read_to_string(&path).unwrap(), "ABCD-1234"));
    }

    #[test]
    fn test_find_attached() {
        let temp = TempDir::new().unwrap();
        assert_eq!(find_attached(temp.path(), "ABCD-1234"), None);
        std::fs::write(temp.path().join("ABCD-1234"), "").unwrap();
        assert_eq!(find_attached(temp.path(), "ABCD-1234").as_deref(), Some("ABCD-1234"));
        assert_eq!(find_attached(&temp.path().join("missing"), "ABCD-1234"), None);
    }

    #[test]
    fn test_find_attached_ignores_case() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(UUID), "").unwrap();
        let found = find_attached(temp.path(), &UUID.to_uppercase());
        assert_eq!(found.as_deref(), Some(UUID));
    }

    #[test]
    fn test_normalize_uuid_follows_udev_case() {
        assert_eq!(normalize_uuid(&UUID.to_uppercase()).unwrap(), UUID);
        assert_eq!(normalize_uuid("abcd-1234").unwrap(), "ABCD-1234");
        assert_eq!(normalize_uuid("0123456789abcdef").unwrap(), "0123456789ABCDEF");
        assert!(normalize_uuid("ABCD-1234 /etc").is_err());
    }

    #[test]
    fn test_fstab_mount_point() {
        let fstab = format!(
            "# UUID={uuid} /old auto defaults 0 0\nUUID={upper} /media/cat\\040videos ext4 defaults 0 2\n",
            uuid = UUID,
            upper = UUID.to_uppercase()
        );
        assert_eq!(fstab_mount_point(&fstab, UUID).as_deref(), Some("/media/cat videos"));
        assert_eq!(fstab_mount_point(&fstab, "ABCD-1234"), None);
    }

    proptest! {
        #[test]
        fn prop_repeated_ensure_never_duplicates(
            serial in "[0-9A-F]{4}-[0-9A-F]{4}",
            runs in 1usize..5,
            existing in proptest::collection::vec("[a-z/ ]{0,20}", 0..4),
        ) {
            let temp = TempDir::new().unwrap();
            let path = temp.path().join("fstab");
            std::fs::write(&path, existing.join("\n")).unwrap();

            for _ in 0..runs {
                ensure_fstab_entry(&path, &entry(&serial), fixed_time()).unwrap();
            }

            let content = std::fs::read_to_string(&path).unwrap();
            let hits = content
                .lines()
                .filter_map(|l| l.split_whitespace().next())
                .filter(|spec| spec_matches_uuid(spec, &serial))
                .count();
            prop_assert_eq!(hits, 1);
        }
    }
}
