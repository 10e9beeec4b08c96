//! Runner for the invoking machine.

use super::{CommandOutput, CommandRunner, capture_child, exit_code};
use crate::errors::{ObiError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs commands through `sh -c` in the current environment.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    extra_path: Option<PathBuf>,
    echo: bool,
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `dir` to `PATH` for every command.
    pub fn with_extra_path(mut self, dir: Option<PathBuf>) -> Self {
        self.extra_path = dir;
        self
    }

    /// Echo output lines to the terminal while capturing them.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn path_value(&self) -> Option<OsString> {
        let extra = self.extra_path.as_ref()?;
        let mut dirs = vec![extra.clone()];
        if let Some(current) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&current));
        }
        std::env::join_paths(dirs).ok()
    }

    fn shell(&self, command: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(path) = self.path_value() {
            cmd.env("PATH", path);
        }
        cmd
    }
}

fn spawn_error(source: std::io::Error) -> ObiError {
    ObiError::Spawn {
        program: "sh".to_string(),
        source,
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    fn host(&self) -> &str {
        "localhost"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn render(&self, command: &str) -> String {
        command.to_string()
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("[localhost] run: {}", command);
        let child = self
            .shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        capture_child(child, "localhost", self.echo).await
    }

    async fn execute_background(&self, command: &str) -> Result<()> {
        debug!("[localhost] background: {}", command);
        // Dropping the handle leaves the process running.
        let _child = self
            .shell(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;
        Ok(())
    }

    async fn execute_interactive(&self, command: &str) -> Result<i32> {
        debug!("[localhost] interactive: {}", command);
        let status = self
            .shell(command)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(spawn_error)?;
        Ok(exit_code(status))
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }
}
