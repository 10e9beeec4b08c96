//! Dry-run decorator.
//!
//! Intercepts every command, emits how it would have been run, and reports
//! a synthetic success. Local existence probes are still answered because
//! they have no side effects; remote probes are assumed to succeed so that
//! no connection is opened.

use super::{CommandOutput, CommandRunner, ScriptWriter};
use crate::errors::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Where intercepted commands go.
#[derive(Debug, Clone)]
pub enum DryRunSink {
    /// Print each command on stdout.
    Stdout,
    /// Append each command to a helper script.
    Script(Arc<ScriptWriter>),
}

pub struct DryRunRunner {
    inner: Arc<dyn CommandRunner>,
    sink: DryRunSink,
}

impl DryRunRunner {
    pub fn new(inner: Arc<dyn CommandRunner>, sink: DryRunSink) -> Self {
        Self { inner, sink }
    }

    fn emit(&self, command: &str) -> Result<()> {
        let line = self.inner.render(command);
        match &self.sink {
            DryRunSink::Stdout => {
                println!("{line}");
                Ok(())
            }
            DryRunSink::Script(script) => script.append(&line),
        }
    }
}

#[async_trait]
impl CommandRunner for DryRunRunner {
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
        self.emit(command)?;
        Ok(CommandOutput::success())
    }

    async fn execute_background(&self, command: &str) -> Result<()> {
        self.emit(command)
    }

    async fn execute_interactive(&self, command: &str) -> Result<i32> {
        self.emit(command)?;
        Ok(0)
    }

    async fn path_exists(&self, path: &Path) -> Result<bool> {
        if self.inner.is_local() {
            self.inner.path_exists(path).await
        } else {
            debug!("[{}] dry run assumes {} exists", self.host(), path.display());
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RemoteRunner;
    use crate::runner::mock::MockRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_dry_run_never_reaches_inner() {
        let mock = Arc::new(MockRunner::local());
        let runner = DryRunRunner::new(mock.clone(), DryRunSink::Stdout);

        let output = runner.execute("rm -rf build").await.unwrap();
        assert!(output.is_success());
        runner.execute_background("./demo").await.unwrap();
        assert_eq!(runner.execute_interactive("gdb ./demo").await.unwrap(), 0);

        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_to_script_renders_ssh() {
        let tmp = TempDir::new().unwrap();
        let script = Arc::new(ScriptWriter::create(tmp.path(), "go", "wall").unwrap());
        let remote = Arc::new(RemoteRunner::new("ann", "wall-1"));
        let runner = DryRunRunner::new(remote, DryRunSink::Script(script.clone()));

        runner.run("mkdir -p /tmp/ann/demo").await.unwrap();
        assert_eq!(
            script.commands().unwrap(),
            vec!["ssh -t ann@wall-1 'mkdir -p /tmp/ann/demo'"]
        );
    }

    #[tokio::test]
    async fn test_dry_run_probes() {
        let local = Arc::new(MockRunner::local().with_path("/p/build/demo"));
        let runner = DryRunRunner::new(local, DryRunSink::Stdout);
        assert!(runner.path_exists(Path::new("/p/build/demo")).await.unwrap());
        assert!(!runner.path_exists(Path::new("/p/bin/demo")).await.unwrap());

        let remote = Arc::new(MockRunner::remote("h1"));
        let runner = DryRunRunner::new(remote, DryRunSink::Stdout);
        assert!(runner.path_exists(Path::new("/anything")).await.unwrap());
    }
}
