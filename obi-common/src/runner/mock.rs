//! In-memory runner for tests.
//!
//! Records every command, answers with scripted responses matched by
//! substring (most recently added wins), and reports paths as existing only
//! when registered with [`MockRunner::with_path`].

use super::{CommandOutput, CommandRunner};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Execute,
    Background,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub kind: CallKind,
    pub command: String,
}

#[derive(Debug)]
pub struct MockRunner {
    host: String,
    local: bool,
    calls: Mutex<Vec<MockCall>>,
    responses: Mutex<Vec<(String, CommandOutput)>>,
    paths: Mutex<HashSet<PathBuf>>,
}

impl MockRunner {
    pub fn local() -> Self {
        Self::new("localhost", true)
    }

    pub fn remote(host: &str) -> Self {
        Self::new(host, false)
    }

    fn new(host: &str, local: bool) -> Self {
        Self {
            host: host.to_string(),
            local,
            calls: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            paths: Mutex::new(HashSet::new()),
        }
    }

    /// Answer commands containing `needle` with `output`.
    pub fn respond(self, needle: &str, output: CommandOutput) -> Self {
        self.add_response(needle, output);
        self
    }

    pub fn add_response(&self, needle: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((needle.to_string(), output));
    }

    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        self.add_path(path);
        self
    }

    pub fn add_path(&self, path: impl Into<PathBuf>) {
        self.paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into());
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Command text of every call, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.commands().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn record(&self, kind: CallKind, command: &str) -> CommandOutput {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                kind,
                command: command.to_string(),
            });
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn render(&self, command: &str) -> String {
        command.to_string()
    }

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        Ok(self.record(CallKind::Execute, command))
    }

    async fn execute_background(&self, command: &str) -> Result<()> {
        self.record(CallKind::Background, command);
        Ok(())
    }

    async fn execute_interactive(&self, command: &str) -> Result<i32> {
        Ok(self.record(CallKind::Interactive, command).exit_code)
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        Ok(self
            .paths
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(path))
    }
}
