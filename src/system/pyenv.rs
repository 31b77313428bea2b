// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! pyenv, the Python runtime it manages, and pip installs into that runtime.
//!
//! Everything here runs as the target user so the version manager and its
//! runtimes end up owned by that user under `~/.pyenv`.

use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::exec::{run_checked, CommandRunner, CommandSpec};
use crate::system::users::UserAccount;

/// Header written above the shell-profile lines.
pub const PROFILE_HEADER: &str = "# pyenv (added by litterbot-provision)";

/// User-agent sent when fetching the installer.
const USER_AGENT: &str = concat!("litterbot-provision/", env!("CARGO_PKG_VERSION"));

/// Paths of a per-user pyenv installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyenvLayout {
    root: PathBuf,
}

impl PyenvLayout {
    /// pyenv's default location, `~/.pyenv`.
    pub fn for_user(account: &UserAccount) -> Self {
        Self {
            root: account.home.join(".pyenv"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self) -> PathBuf {
        self.root.join("bin").join("pyenv")
    }

    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join("versions").join(version)
    }

    /// Interpreter of an installed version. Used directly in `ExecStart=`
    /// so the unit does not depend on shims or shell initialisation.
    pub fn python(&self, version: &str) -> PathBuf {
        self.version_dir(version).join("bin").join("python")
    }

    fn root_str(&self) -> String {
        self.root.display().to_string()
    }

    /// A pyenv subcommand run as `account`.
    fn pyenv(&self, account: &UserAccount) -> CommandSpec {
        CommandSpec::new(self.executable().display().to_string())
            .env("PYENV_ROOT", self.root_str())
            .run_as(account.name.clone())
    }
}

/// Shell-profile lines that put pyenv on `PATH` and load its shims.
pub fn profile_lines() -> Vec<String> {
    [
        r#"export PYENV_ROOT="$HOME/.pyenv""#,
        r#"command -v pyenv >/dev/null || export PATH="$PYENV_ROOT/bin:$PATH""#,
        r#"eval "$(pyenv init - bash)""#,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Download the pyenv installer script.
pub async fn fetch_installer(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProvisionError::Download(format!("failed to create HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProvisionError::Download(format!("{}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(ProvisionError::Download(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    let script = response.text().await?;
    if script.trim().is_empty() {
        return Err(ProvisionError::Download(format!("{} returned an empty script", url)));
    }
    Ok(script)
}

/// Run the installer script as `account` (`bash -s`, script on stdin).
pub async fn run_installer(
    runner: &dyn CommandRunner,
    account: &UserAccount,
    layout: &PyenvLayout,
    script: String,
) -> Result<()> {
    let command = CommandSpec::new("bash")
        .arg("-s")
        .env("PYENV_ROOT", layout.root_str())
        .run_as(account.name.clone())
        .stdin(script);
    run_checked(runner, &command).await?;
    Ok(())
}

/// Build and install a Python version. `-s` makes pyenv skip existing
/// versions on its own as well.
pub async fn install_version(
    runner: &dyn CommandRunner,
    account: &UserAccount,
    layout: &PyenvLayout,
    version: &str,
) -> Result<()> {
    run_checked(
        runner,
        &layout.pyenv(account).args(["install", "-s", version]),
    )
    .await?;
    Ok(())
}

/// Make `version` the user's default interpreter.
pub async fn set_global(
    runner: &dyn CommandRunner,
    account: &UserAccount,
    layout: &PyenvLayout,
    version: &str,
) -> Result<()> {
    run_checked(runner, &layout.pyenv(account).args(["global", version])).await?;
    Ok(())
}

/// `python -m pip install --upgrade <packages>` inside the pyenv runtime.
pub async fn pip_install(
    runner: &dyn CommandRunner,
    account: &UserAccount,
    layout: &PyenvLayout,
    version: &str,
    packages: &[String],
) -> Result<()> {
    if packages.is_empty() {
        return Ok(());
    }
    let command = CommandSpec::new(layout.python(version).display().to_string())
        .args(["-m", "pip", "install", "--upgrade"])
        .args(packages.iter().cloned())
        .env("PYENV_ROOT", layout.root_str())
        .run_as(account.name.clone());
    run_checked(runner, &command).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;

    fn pi() -> UserAccount {
        UserAccount {
            name: "pi".to_string(),
            uid: 1000,
            gid: 1000,
            home: PathBuf::from("/home/pi"),
            shell: "/bin/bash".to_string(),
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = PyenvLayout::for_user(&pi());
        assert_eq!(layout.root(), Path::new("/home/pi/.pyenv"));
        assert_eq!(layout.executable(), PathBuf::from("/home/pi/.pyenv/bin/pyenv"));
        assert_eq!(
            layout.python("3.11.9"),
            PathBuf::from("/home/pi/.pyenv/versions/3.11.9/bin/python")
        );
    }

    #[test]
    fn test_profile_lines_reference_pyenv_root() {
        let lines = profile_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("PYENV_ROOT"));
        assert!(lines[2].starts_with("eval"));
    }

    #[tokio::test]
    async fn test_installer_runs_as_user_with_script_on_stdin() {
        let runner = ScriptedRunner::new();
        let layout = PyenvLayout::for_user(&pi());
        run_installer(&runner, &pi(), &layout, "echo install".to_string())
            .await
            .unwrap();

        let history = runner.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].command_line(), "bash -s");
        assert_eq!(history[0].user(), Some("pi"));
        assert_eq!(history[0].input(), Some("echo install".as_bytes()));
    }

    #[tokio::test]
    async fn test_version_and_pip_commands() {
        let runner = ScriptedRunner::new();
        let layout = PyenvLayout::for_user(&pi());
        install_version(&runner, &pi(), &layout, "3.11.9").await.unwrap();
        set_global(&runner, &pi(), &layout, "3.11.9").await.unwrap();
        pip_install(&runner, &pi(), &layout, "3.11.9", &["pylitterbot".to_string()])
            .await
            .unwrap();
        pip_install(&runner, &pi(), &layout, "3.11.9", &[]).await.unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                "/home/pi/.pyenv/bin/pyenv install -s 3.11.9",
                "/home/pi/.pyenv/bin/pyenv global 3.11.9",
                "/home/pi/.pyenv/versions/3.11.9/bin/python -m pip install --upgrade pylitterbot",
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_installer() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/installer"))
            .respond_with(ResponseTemplate::new(200).set_body_string("#!/bin/bash\necho ok\n"))
            .mount(&mock_server)
            .await;

        let script = fetch_installer(&format!("{}/installer", mock_server.uri()))
            .await
            .unwrap();
        assert!(script.contains("echo ok"));
    }

    #[tokio::test]
    async fn test_fetch_installer_http_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let err = fetch_installer(&mock_server.uri()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Download(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_fetch_installer_empty_body() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&mock_server)
            .await;

        let err = fetch_installer(&mock_server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("empty script"));
    }
}
