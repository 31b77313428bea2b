// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Idempotent line appends for text files such as shell profiles.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Lines of `wanted` that do not already appear verbatim in `content`.
///
/// Comparison ignores surrounding whitespace on each line.
pub fn missing_lines<'a>(content: &str, wanted: &'a [String]) -> Vec<&'a str> {
    let present: Vec<&str> = content.lines().map(str::trim).collect();
    let mut missing: Vec<&str> = Vec::new();
    for line in wanted {
        let line = line.trim();
        if line.is_empty() || present.contains(&line) || missing.contains(&line) {
            continue;
        }
        missing.push(line);
    }
    missing
}

/// Append every line of `wanted` that the file does not contain yet.
///
/// `header` is written above the appended lines unless the file already
/// has it. Creates the file if needed. Returns the number of lines appended and
/// whether the file was created.
pub fn ensure_lines(path: &Path, wanted: &[String], header: Option<&str>) -> Result<EnsureOutcome> {
    let existed = path.exists();
    let content = if existed {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };

    let missing = missing_lines(&content, wanted);
    if missing.is_empty() {
        return Ok(EnsureOutcome {
            appended: 0,
            created: false,
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let header = header.filter(|h| !content.lines().any(|line| line.trim() == h.trim()));

    let mut block = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        block.push('\n');
    }
    if let Some(header) = header {
        if !content.is_empty() {
            block.push('\n');
        }
        block.push_str(header);
        block.push('\n');
    }
    for line in &missing {
        block.push_str(line);
        block.push('\n');
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(block.as_bytes())?;

    Ok(EnsureOutcome {
        appended: missing.len(),
        created: !existed,
    })
}

/// What [`ensure_lines`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureOutcome {
    pub appended: usize,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_lines_ignores_whitespace_and_dupes() {
        let content = "  export A=1  \nalias ll='ls -l'\n";
        let wanted = lines(&["export A=1", "export B=2", "export B=2", ""]);
        assert_eq!(missing_lines(content, &wanted), vec!["export B=2"]);
    }

    #[test]
    fn test_ensure_lines_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("home/pi/.bashrc");
        let outcome = ensure_lines(&path, &lines(&["a", "b"]), Some("# header")).unwrap();
        assert_eq!(
            outcome,
            EnsureOutcome {
                appended: 2,
                created: true
            }
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# header\na\nb\n");
    }

    #[test]
    fn test_ensure_lines_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".bashrc");
        std::fs::write(&path, "# existing").unwrap();

        let wanted = lines(&["export PYENV_ROOT=\"$HOME/.pyenv\"", "eval \"$(pyenv init - bash)\""]);
        let first = ensure_lines(&path, &wanted, Some("# pyenv")).unwrap();
        assert_eq!(first.appended, 2);
        assert!(!first.created);

        let after_first = std::fs::read_to_string(&path).unwrap();
        assert!(after_first.starts_with("# existing\n\n# pyenv\n"));

        let second = ensure_lines(&path, &wanted, Some("# pyenv")).unwrap();
        assert_eq!(second.appended, 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), after_first);
    }

    #[test]
    fn test_ensure_lines_appends_only_missing_subset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".bashrc");
        std::fs::write(&path, "export PYENV_ROOT=\"$HOME/.pyenv\"\n").unwrap();

        let wanted = lines(&["export PYENV_ROOT=\"$HOME/.pyenv\"", "eval \"$(pyenv init - bash)\""]);
        let outcome = ensure_lines(&path, &wanted, None).unwrap();
        assert_eq!(outcome.appended, 1);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("PYENV_ROOT=").count(), 1);
        assert!(content.ends_with("eval \"$(pyenv init - bash)\"\n"));
    }

    #[test]
    fn test_ensure_lines_writes_header_once() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".bashrc");
        std::fs::write(&path, "# pyenv\nexport PYENV_ROOT=\"$HOME/.pyenv\"\n").unwrap();

        let wanted = lines(&["export PYENV_ROOT=\"$HOME/.pyenv\"", "eval \"$(pyenv init - bash)\""]);
        let outcome = ensure_lines(&path, &wanted, Some("# pyenv")).unwrap();
        assert_eq!(outcome.appended, 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("# pyenv").count(), 1);
        assert_eq!(
            content,
            "# pyenv\nexport PYENV_ROOT=\"$HOME/.pyenv\"\neval \"$(pyenv init - bash)\"\n"
        );
    }
}
