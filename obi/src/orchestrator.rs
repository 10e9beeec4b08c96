//! Composite commands and per-host fan-out.
//!
//! A composite command is a fixed sequence of task steps. The sequence runs
//! concurrently on every host of the room; within one host the steps run
//! strictly in order and the first failure ends that host's sequence.

use futures::future::join_all;
use obi_common::ExecutionContext;
use obi_common::tasks::{self, BuildOutcome, LaunchOptions, StopOptions};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Sync,
    Build,
    Clean,
    Stop(StopOptions),
    Launch(LaunchOptions),
    Fetch { files: Vec<String>, dir: PathBuf },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync => "rsync",
            Self::Build => "build",
            Self::Clean => "clean",
            Self::Stop(_) => "stop",
            Self::Launch(_) => "launch",
            Self::Fetch { .. } => "fetch",
        }
    }

    async fn run(&self, ctx: &ExecutionContext) -> obi_common::Result<()> {
        match self {
            Self::Sync => tasks::sync(ctx).await,
            Self::Build => {
                let outcome = tasks::build(ctx).await?;
                if outcome == BuildOutcome::Cached {
                    debug!("[{}] Reused existing build configuration", ctx.host);
                }
                Ok(())
            }
            Self::Clean => tasks::clean(ctx).await,
            Self::Stop(options) => tasks::stop(ctx, *options).await,
            Self::Launch(options) => tasks::launch(ctx, options).await,
            Self::Fetch { files, dir } => {
                let report = tasks::fetch(ctx, files, dir).await?;
                info!(
                    "[{}] Fetched {} pattern(s), skipped {}",
                    ctx.host,
                    report.fetched.len(),
                    report.skipped.len()
                );
                Ok(())
            }
        }
    }
}

/// A top-level command as a sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composite {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

impl Composite {
    pub fn go(launch: LaunchOptions) -> Self {
        Self {
            name: "go",
            steps: vec![
                Step::Sync,
                Step::Build,
                Step::Stop(StopOptions::default()),
                Step::Launch(launch),
            ],
        }
    }

    pub fn build() -> Self {
        Self {
            name: "build",
            steps: vec![Step::Sync, Step::Build],
        }
    }

    pub fn stop(force: bool) -> Self {
        Self {
            name: "stop",
            steps: vec![Step::Stop(StopOptions { force })],
        }
    }

    pub fn clean() -> Self {
        Self {
            name: "clean",
            steps: vec![Step::Clean],
        }
    }

    pub fn rsync() -> Self {
        Self {
            name: "rsync",
            steps: vec![Step::Sync],
        }
    }

    pub fn fetch(files: Vec<String>, dir: PathBuf) -> Self {
        Self {
            name: "fetch",
            steps: vec![
                Step::Stop(StopOptions::default()),
                Step::Fetch { files, dir },
            ],
        }
    }
}

/// Outcome of a composite command on one host.
#[derive(Debug)]
pub struct HostReport {
    pub host: String,
    /// Name of the step that failed, if any.
    pub failed_step: Option<&'static str>,
    pub result: obi_common::Result<()>,
}

impl HostReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub async fn run_on_host(ctx: &ExecutionContext, composite: &Composite) -> HostReport {
    for step in &composite.steps {
        debug!("[{}] {}: {}", ctx.host, composite.name, step.name());
        if let Err(e) = step.run(ctx).await {
            return HostReport {
                host: ctx.host.clone(),
                failed_step: Some(step.name()),
                result: Err(e),
            };
        }
    }
    HostReport {
        host: ctx.host.clone(),
        failed_step: None,
        result: Ok(()),
    }
}

/// Run `composite` on every context concurrently. Reports come back in
/// context order.
pub async fn fan_out(contexts: &[ExecutionContext], composite: &Composite) -> Vec<HostReport> {
    join_all(contexts.iter().map(|ctx| run_on_host(ctx, composite))).await
}
