// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Resolution of absolute system paths against a root directory.
//!
//! External commands always see the real absolute path; file access made by
//! this process goes through [`SystemRoot::resolve`], so pointing the root at
//! another directory redirects every read and write this process makes.

use std::path::{Component, Path, PathBuf};

pub const FSTAB: &str = "/etc/fstab";
pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";
pub const DISK_BY_UUID: &str = "/dev/disk/by-uuid";
pub const PROC_MOUNTS: &str = "/proc/self/mounts";
pub const DEVICE_TREE_MODEL: &str = "/proc/device-tree/model";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemRoot {
    root: PathBuf,
}

impl SystemRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The live system.
    pub fn host() -> Self {
        Self::new("/")
    }

    pub fn is_host(&self) -> bool {
        self.root == Path::new("/")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an absolute system path onto this root.
    ///
    /// Relative paths are returned unchanged; `..` components never climb
    /// above the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if !path.has_root() {
            return path.to_path_buf();
        }

        let mut resolved = self.root.clone();
        let base_depth = resolved.components().count();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    if resolved.components().count() > base_depth {
                        resolved.pop();
                    }
                }
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }
        resolved
    }

    pub fn fstab(&self) -> PathBuf {
        self.resolve(FSTAB)
    }

    pub fn unit_path(&self, unit_name: &str) -> PathBuf {
        self.resolve(Path::new(SYSTEMD_UNIT_DIR).join(unit_name))
    }

    pub fn disk_by_uuid_dir(&self) -> PathBuf {
        self.resolve(DISK_BY_UUID)
    }

    pub fn proc_mounts(&self) -> PathBuf {
        self.resolve(PROC_MOUNTS)
    }

    pub fn device_tree_model(&self) -> PathBuf {
        self.resolve(DEVICE_TREE_MODEL)
    }
}

impl Default for SystemRoot {
    fn default() -> Self {
        Self::host()
    }
}
