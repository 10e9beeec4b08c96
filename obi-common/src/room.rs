//! Room resolution.
//!
//! A [`RoomPlan`] is built once per invocation from `project.yaml` and a
//! room name. It fixes locality, paths, target name and launch templates,
//! and hands out one [`ExecutionContext`] per host, each bound to its own
//! command runner.

use crate::config::{self, MergedConfig, ProjectConfig};
use crate::errors::{ObiError, Result};
use crate::runner::{
    CommandRunner, DryRunRunner, DryRunSink, LocalRunner, RecordingRunner, RemoteRunner,
    ScriptWriter,
};
use crate::util::{relative_to, shell_quote, target_basename};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Room name that is always local.
pub const LOCALHOST: &str = "localhost";

/// Default build directory below the project directory.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Locality rule, in priority order: explicit `is-local`, then the
/// `localhost` room name, then an empty host list.
pub fn decide_local(room_name: &str, hosts: &[String], is_local: Option<bool>) -> bool {
    match is_local {
        Some(explicit) => explicit,
        None => room_name == LOCALHOST || hosts.is_empty(),
    }
}

/// Default remote deployment directory: `/tmp/<user>/<project>`.
pub fn default_remote_project_dir(local_user: &str, project_name: &str) -> PathBuf {
    Path::new("/tmp").join(local_user).join(project_name)
}

/// How a non-debug launch is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchTemplate {
    /// Run attached to the terminal, copying merged output into the log.
    /// The target's exit status travels back on fd 3, so the command fails
    /// when the target does and not only when `tee` does.
    TeeForeground,
    /// Detach under `nohup`, both streams redirected into the log.
    NohupDetached,
}

impl LaunchTemplate {
    pub fn render(&self, env: &str, cmd: &str, log: &str) -> String {
        let prefix = if env.is_empty() {
            String::new()
        } else {
            format!("{env} ")
        };
        match self {
            Self::TeeForeground => format!(
                "{{ {{ {{ {prefix}{cmd} 2>&1; echo $? >&3; }} | tee {log} >&4; }} 3>&1 \
                 | {{ read -r status; exit \"$status\"; }}; }} 4>&1"
            ),
            Self::NohupDetached => {
                format!("{prefix}nohup {cmd} > {log} 2>&1 < /dev/null &")
            }
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::NohupDetached)
    }
}

/// How a debug launch is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTemplate {
    /// Debugger attached to the user's terminal.
    Inline,
    /// Debugger inside a detached tmux session named after the target.
    Multiplexer,
}

impl DebugTemplate {
    pub fn render(&self, env: &str, debugger: &str, cmd: &str, session: &str) -> String {
        let inner = crate::util::join_fragments([env, debugger, cmd]);
        match self {
            Self::Inline => inner,
            Self::Multiplexer => format!(
                "tmux new-session -d -s {} {}",
                shell_quote(session),
                shell_quote(&inner)
            ),
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Multiplexer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchTemplates {
    pub launch: LaunchTemplate,
    pub debug: DebugTemplate,
}

impl LaunchTemplates {
    pub fn for_locality(is_local: bool) -> Self {
        if is_local {
            Self {
                launch: LaunchTemplate::TeeForeground,
                debug: DebugTemplate::Inline,
            }
        } else {
            Self {
                launch: LaunchTemplate::NohupDetached,
                debug: DebugTemplate::Multiplexer,
            }
        }
    }
}

/// Invocation-wide knobs for building contexts.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Local OS user; default remote user and deployment path component.
    pub local_user: String,
    /// Directory the user invoked obi from; local paths display relative to it.
    pub cwd: PathBuf,
    /// Print commands instead of running them.
    pub dry_run: bool,
    /// Record commands into the helper script without running them.
    pub script_only: bool,
    /// Task name used for the helper script file.
    pub task: Option<String>,
    /// Directory prepended to `PATH` on every host.
    pub tool_bin: Option<PathBuf>,
    /// Echo command output to the terminal.
    pub echo: bool,
}

impl ContextOptions {
    pub fn new(local_user: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            local_user: local_user.into(),
            cwd: cwd.into(),
            dry_run: false,
            script_only: false,
            task: None,
            tool_bin: None,
            echo: true,
        }
    }

    /// Options for the current process: OS user and working directory.
    pub fn from_process() -> Self {
        let user = whoami::username().unwrap_or_else(|_| "unknown".to_string());
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(user, cwd)
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn script_only(mut self, script_only: bool) -> Self {
        self.script_only = script_only;
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn tool_bin(mut self, dir: Option<PathBuf>) -> Self {
        self.tool_bin = dir;
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// A resolved room, shared by every host's context.
#[derive(Debug, Clone)]
pub struct RoomPlan {
    pub room_name: String,
    pub project_name: String,
    pub is_local: bool,
    /// `["localhost"]` when local.
    pub hosts: Vec<String>,
    pub user: String,
    /// Working directory on the hosts.
    pub project_dir: PathBuf,
    /// Directory containing `project.yaml` on the invoking machine.
    pub local_project_dir: PathBuf,
    pub build_dir: PathBuf,
    pub target_name: String,
    pub config: MergedConfig,
    pub templates: LaunchTemplates,
    pub options: ContextOptions,
    script: Option<Arc<ScriptWriter>>,
}

impl RoomPlan {
    /// Resolve `room_name` against `project`. Fails with `RoomNotFound`
    /// before anything is written.
    pub fn resolve(project: &ProjectConfig, room_name: &str, options: ContextOptions) -> Result<Self> {
        let room = config::resolve_room(project, room_name)?;
        let merged = config::merge(project, room);
        let is_local = decide_local(room_name, &room.hosts, room.is_local);
        let local_project_dir = project.root().to_path_buf();
        if !is_local && room.hosts.is_empty() {
            return Err(ObiError::RoomHasNoHosts {
                room: room_name.to_string(),
            });
        }

        let (hosts, project_dir) = if is_local {
            (vec![LOCALHOST.to_string()], local_project_dir.clone())
        } else {
            let dir = match &room.project_dir {
                Some(dir) => PathBuf::from(dir),
                None => default_remote_project_dir(&options.local_user, &project.name),
            };
            (room.hosts.clone(), dir)
        };
        let user = room
            .user
            .clone()
            .unwrap_or_else(|| options.local_user.clone());

        let build_dir_name = merged
            .get_str("build-dir")?
            .unwrap_or_else(|| DEFAULT_BUILD_DIR.to_string());
        let build_dir = project_dir.join(build_dir_name);

        let target = merged.get_str("target")?;
        let target_name = target_basename(target.as_deref().unwrap_or(&project.name));

        let script = match &options.task {
            Some(task) if options.script_only || (is_local && !options.dry_run) => {
                let writer = ScriptWriter::create(&local_project_dir, task, room_name)?;
                debug!("Recording commands in {}", writer.path().display());
                Some(Arc::new(writer))
            }
            _ => None,
        };

        info!(
            "Room {} resolved: {} on {}",
            room_name,
            if is_local { "local" } else { "remote" },
            hosts.join(", ")
        );

        Ok(Self {
            room_name: room_name.to_string(),
            project_name: project.name.clone(),
            is_local,
            hosts,
            user,
            project_dir,
            local_project_dir,
            build_dir,
            target_name,
            config: merged,
            templates: LaunchTemplates::for_locality(is_local),
            options,
            script,
        })
    }

    /// Helper script written for this invocation, if any.
    pub fn script(&self) -> Option<&ScriptWriter> {
        self.script.as_deref()
    }

    fn decorate(&self, base: Arc<dyn CommandRunner>) -> Arc<dyn CommandRunner> {
        match (&self.script, self.options.script_only, self.options.dry_run) {
            (Some(script), true, _) => {
                Arc::new(DryRunRunner::new(base, DryRunSink::Script(script.clone())))
            }
            (_, _, true) => Arc::new(DryRunRunner::new(base, DryRunSink::Stdout)),
            (Some(script), false, false) if base.is_local() => {
                Arc::new(RecordingRunner::new(base, script.clone()))
            }
            _ => base,
        }
    }

    /// One context per host, each with its own runner.
    pub fn contexts(&self) -> Vec<ExecutionContext> {
        let tool_bin = self.options.tool_bin.clone();
        let local_base: Arc<dyn CommandRunner> = Arc::new(
            LocalRunner::new()
                .with_extra_path(tool_bin.clone())
                .with_echo(self.options.echo),
        );
        let local = self.decorate(local_base);

        self.hosts
            .iter()
            .map(|host| {
                let runner = if self.is_local {
                    local.clone()
                } else {
                    self.decorate(Arc::new(
                        RemoteRunner::new(self.user.clone(), host.clone())
                            .with_extra_path(tool_bin.clone())
                            .with_echo(self.options.echo),
                    ))
                };
                self.context_with(host, runner, local.clone())
            })
            .collect()
    }

    /// Context for `host` bound to the given runners.
    pub fn context_with(
        &self,
        host: &str,
        runner: Arc<dyn CommandRunner>,
        local: Arc<dyn CommandRunner>,
    ) -> ExecutionContext {
        ExecutionContext {
            room_name: self.room_name.clone(),
            host: host.to_string(),
            is_local: self.is_local,
            user: self.user.clone(),
            project_name: self.project_name.clone(),
            project_dir: self.project_dir.clone(),
            local_project_dir: self.local_project_dir.clone(),
            build_dir: self.build_dir.clone(),
            target_name: self.target_name.clone(),
            config: self.config.clone(),
            templates: self.templates,
            cwd: self.options.cwd.clone(),
            dry_run: self.options.dry_run || self.options.script_only,
            runner,
            local,
        }
    }
}

/// Everything a task needs to run against one host.
#[derive(Clone)]
pub struct ExecutionContext {
    pub room_name: String,
    pub host: String,
    pub is_local: bool,
    pub user: String,
    pub project_name: String,
    pub project_dir: PathBuf,
    pub local_project_dir: PathBuf,
    pub build_dir: PathBuf,
    pub target_name: String,
    pub config: MergedConfig,
    pub templates: LaunchTemplates,
    pub cwd: PathBuf,
    /// Commands are intercepted rather than run.
    pub dry_run: bool,
    /// Runs on the context's host.
    pub runner: Arc<dyn CommandRunner>,
    /// Runs on the invoking machine (rsync, local hooks).
    pub local: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("room_name", &self.room_name)
            .field("host", &self.host)
            .field("is_local", &self.is_local)
            .field("project_dir", &self.project_dir)
            .field("build_dir", &self.build_dir)
            .field("target_name", &self.target_name)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Path as it should appear in commands: relative to the invoking
    /// directory for local contexts, host-absolute for remote ones.
    pub fn display_path(&self, path: &Path) -> PathBuf {
        if self.is_local {
            relative_to(path, &self.cwd)
        } else {
            path.to_path_buf()
        }
    }

    /// Resolve a configured path against the project directory.
    pub fn project_path(&self, configured: &str) -> PathBuf {
        self.project_dir.join(configured)
    }

    /// Per-target log file in the project directory.
    pub fn log_file(&self) -> PathBuf {
        self.project_dir.join(format!("{}.log", self.target_name))
    }
}
