//! Command runners.
//!
//! Tasks never spawn processes themselves; they hand shell command text to
//! a [`CommandRunner`] chosen when the execution context is built:
//!
//! - [`LocalRunner`] runs `sh -c` on the invoking machine.
//! - [`RemoteRunner`] runs the command over `ssh` on one host.
//! - [`DryRunRunner`] wraps either and prints (or scripts) instead of running.
//! - [`RecordingRunner`] runs through the inner runner and appends each
//!   command to the local helper script.

pub mod dry_run;
pub mod local;
pub mod mock;
pub mod remote;
pub mod script;

pub use dry_run::{DryRunRunner, DryRunSink};
pub use local::LocalRunner;
pub use remote::RemoteRunner;
pub use script::{RecordingRunner, ScriptWriter};

use crate::errors::{ObiError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Synthetic success with no output.
    pub fn success() -> Self {
        Self::default()
    }

    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Host the runner executes on (`localhost` for local runners).
    fn host(&self) -> &str;

    fn is_local(&self) -> bool;

    /// Shell text that reproduces `command` from the invoking machine.
    fn render(&self, command: &str) -> String;

    /// Run `command` to completion, capturing its output.
    async fn execute(&self, command: &str) -> Result<CommandOutput>;

    /// Start `command` so that it keeps running after obi exits.
    async fn execute_background(&self, command: &str) -> Result<()>;

    /// Run `command` attached to the user's terminal; returns the exit code.
    async fn execute_interactive(&self, command: &str) -> Result<i32>;

    async fn path_exists(&self, path: &Path) -> Result<bool>;

    /// Like [`CommandRunner::execute`] but a non-zero exit is an error.
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let output = self.execute(command).await?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(ObiError::CommandFailed {
                host: self.host().to_string(),
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn drain<R>(reader: Option<R>, host: &str, stream: &str, echo: bool) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(String::new());
    };
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        // Tool output is not always UTF-8.
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if echo {
            if stream == "err" {
                eprintln!("[{host}] {stream}: {line}");
            } else {
                println!("[{host}] {stream}: {line}");
            }
        }
        captured.push_str(line);
        captured.push('\n');
    }
    Ok(captured)
}

/// Wait for `child`, echoing each output line prefixed with the host while
/// collecting both streams.
pub(crate) async fn capture_child(mut child: Child, host: &str, echo: bool) -> Result<CommandOutput> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let drained = tokio::try_join!(
        drain(stdout, host, "out", echo),
        drain(stderr, host, "err", echo)
    );
    let (stdout, stderr) = match drained {
        Ok(streams) => streams,
        Err(e) => {
            if let Err(kill_err) = child.kill().await {
                debug!("[{}] could not kill command after read error: {}", host, kill_err);
            }
            return Err(e.into());
        }
    };
    let status = child.wait().await?;
    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: exit_code(status),
    })
}

#[cfg(test)]
mod tests {
    use super::mock::MockRunner;
    use super::*;

    #[tokio::test]
    async fn test_run_maps_nonzero_exit_to_error() {
        let runner = MockRunner::remote("h1").respond("false", CommandOutput {
            stdout: String::new(),
            stderr: "nope".to_string(),
            exit_code: 3,
        });
        let err = runner.run("false").await.unwrap_err();
        match err {
            ObiError::CommandFailed {
                host,
                command,
                exit_code,
                stderr,
            } => {
                assert_eq!(host, "h1");
                assert_eq!(command, "false");
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.run("true").await.is_ok());
    }

    #[test]
    fn test_command_output_helpers() {
        assert!(CommandOutput::success().is_success());
        assert!(!CommandOutput::with_exit_code(1).is_success());
        assert_eq!(CommandOutput::with_stdout("x").stdout, "x");
    }
}
