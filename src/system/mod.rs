// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Thin wrappers around the external tools a provisioning run drives:
//! apt-get, pyenv/pip, systemd, fstab and mount.

pub mod board;
pub mod packages;
pub mod paths;
pub mod profile;
pub mod pyenv;
pub mod storage;
pub mod systemd;
pub mod users;

pub use paths::SystemRoot;
pub use users::UserAccount;
