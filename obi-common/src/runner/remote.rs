//! Runner for a single remote host reached over `ssh`.
//!
//! Authentication is left to the ssh agent and `~/.ssh/config`; obi only
//! passes `BatchMode=yes` so a missing key fails instead of prompting.

use super::{CommandOutput, CommandRunner, capture_child, exit_code};
use crate::errors::{ObiError, Result};
use crate::util::{shell_quote, shell_quote_path};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RemoteRunner {
    user: String,
    host: String,
    extra_path: Option<PathBuf>,
    echo: bool,
}

impl RemoteRunner {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            extra_path: None,
            echo: false,
        }
    }

    pub fn with_extra_path(mut self, dir: Option<PathBuf>) -> Self {
        self.extra_path = dir;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// `user@host` destination.
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }

    /// Text handed to the remote login shell.
    pub fn remote_command(&self, command: &str) -> String {
        let command = match &self.extra_path {
            Some(dir) => format!("export PATH={}:\"$PATH\"; {}", shell_quote_path(dir), command),
            None => command.to_string(),
        };
        format!("sh -lc {}", shell_quote(&command))
    }

    fn ssh(&self, command: &str, flags: &[&str]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(flags);
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg(self.destination());
        cmd.arg(self.remote_command(command));
        cmd
    }
}

fn spawn_error(source: std::io::Error) -> ObiError {
    ObiError::Spawn {
        program: "ssh".to_string(),
        source,
    }
}

/// ssh reserves exit status 255 for its own failures.
const SSH_FAILURE: i32 = 255;

#[async_trait]
impl CommandRunner for RemoteRunner {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_local(&self) -> bool {
        false
    }

    fn render(&self, command: &str) -> String {
        format!("ssh -t {} {}", self.destination(), shell_quote(command))
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("[{}] run: {}", self.host, command);
        let child = self
            .ssh(command, &["-T"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        capture_child(child, &self.host, self.echo).await
    }

    async fn execute_background(&self, command: &str) -> Result<()> {
        debug!("[{}] background: {}", self.host, command);
        // No pty: the session can close while the remote command keeps running.
        let output = self
            .ssh(command, &["-n", "-T"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(spawn_error)?;
        let code = exit_code(output.status);
        if code == 0 {
            Ok(())
        } else {
            Err(ObiError::CommandFailed {
                host: self.host.clone(),
                command: command.to_string(),
                exit_code: code,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    async fn execute_interactive(&self, command: &str) -> Result<i32> {
        debug!("[{}] interactive: {}", self.host, command);
        let status = self
            .ssh(command, &["-t"])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(spawn_error)?;
        Ok(exit_code(status))
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        let probe = format!("test -e {}", shell_quote_path(path));
        let output = self.execute(&probe).await?;
        match output.exit_code {
            0 => Ok(true),
            SSH_FAILURE => Err(ObiError::CommandFailed {
                host: self.host.clone(),
                command: probe,
                exit_code: SSH_FAILURE,
                stderr: output.stderr,
            }),
            _ => Ok(false),
        }
    }
}
