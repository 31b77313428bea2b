// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Single-board computer detection

use super::SystemRoot;

/// Board model from the device tree, e.g. "Raspberry Pi 4 Model B Rev 1.4".
pub fn model(root: &SystemRoot) -> Option<String> {
    let raw = std::fs::read(root.device_tree_model()).ok()?;
    // The device tree stores a NUL-terminated string.
    let text = String::from_utf8_lossy(&raw);
    let model = text.trim_end_matches('\0').trim();
    if model.is_empty() {
        None
    } else {
        Some(model.to_string())
    }
}

pub fn is_raspberry_pi(model: &str) -> bool {
    model.to_lowercase().contains("raspberry pi")
}
