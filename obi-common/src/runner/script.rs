//! Helper shell scripts recording what a task ran.
//!
//! For local rooms every task invocation produces `obi-<task>-<room>.sh`
//! next to `project.yaml`, so the exact command sequence can be re-run or
//! audited without obi.

use super::{CommandOutput, CommandRunner};
use crate::errors::Result;
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SCRIPT_HEADER: &str = "#!/usr/bin/env bash\n# Produced with obi!\nset -e\nset -v\n\n";

/// Append-only helper script.
#[derive(Debug)]
pub struct ScriptWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ScriptWriter {
    /// File name for a task run in a room, e.g. `obi-go-localhost.sh`.
    pub fn file_name(task: &str, room: &str) -> String {
        format!("obi-{}-{}.sh", task.replace(':', ""), room)
    }

    /// Create (or truncate) the script in `dir` and mark it executable.
    pub fn create(dir: &Path, task: &str, room: &str) -> Result<Self> {
        let path = dir.join(Self::file_name(task, room));
        fs::write(&path, SCRIPT_HEADER)?;
        make_executable(&path)?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Recorded commands, without the header.
    pub fn commands(&self) -> Result<Vec<String>> {
        let text = fs::read_to_string(&self.path)?;
        Ok(text
            .strip_prefix(SCRIPT_HEADER)
            .unwrap_or(&text)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Runs through `inner` and appends each command to the helper script.
pub struct RecordingRunner {
    inner: Arc<dyn CommandRunner>,
    script: Arc<ScriptWriter>,
}

impl RecordingRunner {
    pub fn new(inner: Arc<dyn CommandRunner>, script: Arc<ScriptWriter>) -> Self {
        Self { inner, script }
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn is_local(&self) -> bool {
        self.inner.is_local()
    }

    fn render(&self, command: &str) -> String {
        self.inner.render(command)
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        let output = self.inner.execute(command).await?;
        self.script.append(&self.inner.render(command))?;
        Ok(output)
    }

    async fn execute_background(&self, command: &str) -> Result<()> {
        self.inner.execute_background(command).await?;
        self.script.append(&self.inner.render(command))
    }

    async fn execute_interactive(&self, command: &str) -> Result<i32> {
        self.script.append(&self.inner.render(command))?;
        self.inner.execute_interactive(command).await
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        self.inner.path_exists(path).await
    }
}
