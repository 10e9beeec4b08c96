//! `obi go` launch step.

use super::run_hooks;
use crate::errors::{ObiError, Result};
use crate::room::ExecutionContext;
use crate::util::{join_fragments, join_quoted, relative_to, shell_quote, shell_quote_path, within};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Debugger name or alias; `None` for a normal launch.
    pub debugger: Option<String>,
    /// Trailing arguments passed through to the target.
    pub extras: Vec<String>,
}

/// Candidate locations for the target binary, in search order.
pub fn target_candidates(ctx: &ExecutionContext) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(target) = ctx.config.get_str("target")? {
        candidates.push(ctx.project_path(&target));
    }
    if !ctx.target_name.is_empty() {
        candidates.push(ctx.build_dir.join(&ctx.target_name));
        candidates.push(ctx.project_dir.join("bin").join(&ctx.target_name));
    }
    Ok(candidates)
}

/// First candidate that exists on the context's host.
pub async fn resolve_target(ctx: &ExecutionContext) -> Result<PathBuf> {
    let candidates = target_candidates(ctx)?;
    for candidate in &candidates {
        if ctx.runner.path_exists(candidate).await? {
            return Ok(candidate.clone());
        }
    }
    Err(ObiError::TargetNotFound {
        searched: candidates
            .iter()
            .map(|c| c.display().to_string())
            .collect(),
    })
}

/// Debugger command for `name`, via the `debuggers` alias table.
pub fn resolve_debugger(ctx: &ExecutionContext, name: &str) -> Result<String> {
    Ok(ctx
        .config
        .get_map("debuggers")?
        .into_iter()
        .find(|(alias, _)| alias == name)
        .map(|(_, command)| command)
        .unwrap_or_else(|| name.to_string()))
}

/// Path as written in a command run from the project directory.
fn from_project_dir(ctx: &ExecutionContext, path: &Path) -> PathBuf {
    if ctx.is_local {
        relative_to(path, &ctx.project_dir)
    } else {
        path.to_path_buf()
    }
}

/// Like [`from_project_dir`], but a bare file name gets a `./` prefix so
/// the shell does not search `PATH` for it.
fn executable_path(ctx: &ExecutionContext, path: &Path) -> String {
    let path = from_project_dir(ctx, path);
    if path.is_relative() && path.components().count() == 1 {
        shell_quote(&format!("./{}", path.to_string_lossy()))
    } else {
        shell_quote_path(&path)
    }
}

/// `K=V` assignments from `env-vars`, values quoted.
pub fn env_assignments(ctx: &ExecutionContext) -> Result<String> {
    Ok(ctx
        .config
        .get_map("env-vars")?
        .iter()
        .map(|(key, value)| format!("{key}={}", shell_quote(value)))
        .collect::<Vec<_>>()
        .join(" "))
}

/// Target invocation: binary, pool flags, `launch-args`, extras, then the
/// room, screen and feld proteins when configured.
pub fn target_command(ctx: &ExecutionContext, target: &Path, extras: &[String]) -> Result<String> {
    let pools: Vec<String> = ctx
        .config
        .get_map("pools")?
        .iter()
        .map(|(name, address)| shell_quote(&format!("--{name}={address}")))
        .collect();
    let launch_args = ctx.config.get_string_list("launch-args")?;
    let room = ctx
        .config
        .get_str("room-protein")?
        .map(|protein| shell_quote(&format!("--room={protein}")))
        .unwrap_or_default();
    let screen = ctx.config.get_str("screen-protein")?.map(|p| shell_quote(&p));
    let feld = ctx.config.get_str("feld-protein")?.map(|p| shell_quote(&p));

    Ok(join_fragments([
        executable_path(ctx, target).as_str(),
        pools.join(" ").as_str(),
        join_quoted(&launch_args).as_str(),
        join_quoted(extras).as_str(),
        room.as_str(),
        screen.as_deref().unwrap_or_default(),
        feld.as_deref().unwrap_or_default(),
    ]))
}

/// Fully rendered launch command and whether it detaches.
async fn launch_command(ctx: &ExecutionContext, options: &LaunchOptions) -> Result<(String, bool)> {
    let override_key = if options.debugger.is_some() {
        "debug-launch-cmd"
    } else {
        "launch-cmd"
    };
    if let Some(cmd) = ctx.config.get_str(override_key)? {
        return Ok((cmd, false));
    }

    let target = resolve_target(ctx).await?;
    let env = env_assignments(ctx)?;
    let cmd = target_command(ctx, &target, &options.extras)?;
    match &options.debugger {
        Some(name) => {
            let debugger = resolve_debugger(ctx, name)?;
            let template = ctx.templates.debug;
            Ok((
                template.render(&env, &debugger, &cmd, &ctx.target_name),
                template.is_detached(),
            ))
        }
        None => {
            let template = ctx.templates.launch;
            let log = shell_quote_path(&from_project_dir(ctx, &ctx.log_file()));
            let rendered = template.render(&env, &cmd, &log);
            if template.is_detached() {
                // Braces keep `cd` out of the background job, which would
                // otherwise hold the session's stdout open.
                Ok((format!("{{ {rendered} }}"), true))
            } else {
                Ok((rendered, false))
            }
        }
    }
}

pub async fn launch(ctx: &ExecutionContext, options: &LaunchOptions) -> Result<()> {
    let runner = ctx.runner.as_ref();
    let (command, detached) = launch_command(ctx, options).await?;
    let command = within(&ctx.display_path(&ctx.project_dir), &command);

    run_hooks(ctx, runner, &ctx.project_dir, &["pre-launch-cmds"]).await?;

    info!("[{}] Launching {}", ctx.host, ctx.target_name);
    if detached {
        runner.execute_background(&command).await?;
    } else if ctx.is_local {
        let exit_code = runner.execute_interactive(&command).await?;
        if exit_code != 0 {
            return Err(ObiError::CommandFailed {
                host: ctx.host.clone(),
                command,
                exit_code,
                stderr: String::new(),
            });
        }
    } else {
        runner.run(&command).await?;
    }

    run_hooks(
        ctx,
        runner,
        &ctx.project_dir,
        &["post-launch-cmds", "post-lauch-cmds"],
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::room::{ContextOptions, RoomPlan};
    use crate::runner::mock::{CallKind, MockRunner};
    use std::sync::Arc;

    fn context(yaml: &str, room: &str, runner: Arc<MockRunner>) -> ExecutionContext {
        let project = ProjectConfig::parse(yaml, Path::new("/p/project.yaml")).unwrap();
        let plan = RoomPlan::resolve(&project, room, ContextOptions::new("ann", "/p")).unwrap();
        plan.context_with(&plan.hosts[0], runner, Arc::new(MockRunner::local()))
    }

    const PROJECT: &str = r#"
name: demo
env-vars:
  DISPLAY: ":0"
  GREETING: hello world
pools:
  gripes: tcp://hub/gripes
launch-args: [--fullscreen]
room-protein: room.prot
screen-protein: screen.prot
feld-protein: feld.prot
debuggers:
  gdb: gdb --args
pre-launch-cmds: [./warmup.sh]
post-lauch-cmds: [echo launched]
rooms:
  localhost:
  wall:
    hosts: [w1]
"#;

    #[tokio::test]
    async fn test_missing_target_starts_nothing() {
        let runner = Arc::new(MockRunner::remote("w1"));
        let ctx = context(PROJECT, "wall", runner.clone());
        let err = launch(&ctx, &LaunchOptions::default()).await.unwrap_err();
        match err {
            ObiError::TargetNotFound { searched } => assert_eq!(
                searched,
                vec!["/tmp/ann/demo/build/demo", "/tmp/ann/demo/bin/demo"]
            ),
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_target_search_order() {
        let yaml = "name: demo\ntarget: out/demo-app\nrooms:\n  wall:\n    hosts: [w1]\n";
        let runner = Arc::new(
            MockRunner::remote("w1")
                .with_path("/tmp/ann/demo/bin/demo-app")
                .with_path("/tmp/ann/demo/build/demo-app"),
        );
        let ctx = context(yaml, "wall", runner.clone());
        assert_eq!(
            resolve_target(&ctx).await.unwrap(),
            PathBuf::from("/tmp/ann/demo/build/demo-app")
        );
        runner.add_path("/tmp/ann/demo/out/demo-app");
        assert_eq!(
            resolve_target(&ctx).await.unwrap(),
            PathBuf::from("/tmp/ann/demo/out/demo-app")
        );
    }

    #[tokio::test]
    async fn test_remote_launch_is_detached() {
        let runner = Arc::new(MockRunner::remote("w1").with_path("/tmp/ann/demo/build/demo"));
        let ctx = context(PROJECT, "wall", runner.clone());
        let options = LaunchOptions {
            debugger: None,
            extras: vec!["--scale".to_string(), "2 x".to_string()],
        };
        launch(&ctx, &options).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].command, "cd /tmp/ann/demo && ./warmup.sh");
        assert_eq!(calls[1].kind, CallKind::Background);
        assert_eq!(
            calls[1].command,
            "cd /tmp/ann/demo && { DISPLAY=:0 GREETING='hello world' nohup \
             /tmp/ann/demo/build/demo --gripes=tcp://hub/gripes --fullscreen --scale '2 x' \
             --room=room.prot screen.prot feld.prot > /tmp/ann/demo/demo.log 2>&1 < /dev/null & }"
        );
        assert_eq!(calls[2].command, "cd /tmp/ann/demo && echo launched");
    }

    #[tokio::test]
    async fn test_local_launch_tees_log() {
        let yaml = "name: demo\nrooms:\n  localhost:\n";
        let runner = Arc::new(MockRunner::local().with_path("/p/build/demo"));
        let ctx = context(yaml, "localhost", runner.clone());
        launch(&ctx, &LaunchOptions::default()).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, CallKind::Interactive);
        assert_eq!(
            calls[0].command,
            "cd . && { { { build/demo 2>&1; echo $? >&3; } | tee demo.log >&4; } 3>&1 \
             | { read -r status; exit \"$status\"; }; } 4>&1"
        );
    }

    #[tokio::test]
    async fn test_debug_launch_uses_alias_and_tmux() {
        let runner = Arc::new(MockRunner::remote("w1").with_path("/tmp/ann/demo/build/demo"));
        let ctx = context("name: demo\ndebuggers:\n  gdb: gdb --args\nrooms:\n  wall:\n    hosts: [w1]\n", "wall", runner.clone());
        let options = LaunchOptions {
            debugger: Some("gdb".to_string()),
            extras: Vec::new(),
        };
        launch(&ctx, &options).await.unwrap();
        assert_eq!(
            runner.commands(),
            vec![
                "cd /tmp/ann/demo && tmux new-session -d -s demo 'gdb --args /tmp/ann/demo/build/demo'"
            ]
        );
        assert_eq!(runner.calls()[0].kind, CallKind::Background);

        assert_eq!(resolve_debugger(&ctx, "lldb").unwrap(), "lldb");
    }

    #[tokio::test]
    async fn test_launch_cmd_override_skips_target_search() {
        let runner = Arc::new(MockRunner::remote("w1"));
        let ctx = context(
            "name: demo\nlaunch-cmd: systemctl --user start demo\nrooms:\n  wall:\n    hosts: [w1]\n",
            "wall",
            runner.clone(),
        );
        launch(&ctx, &LaunchOptions::default()).await.unwrap();
        assert_eq!(
            runner.commands(),
            vec!["cd /tmp/ann/demo && systemctl --user start demo"]
        );
    }

    #[tokio::test]
    async fn test_local_nonzero_exit_is_failure() {
        let runner = Arc::new(
            MockRunner::local()
                .with_path("/p/build/demo")
                .respond("tee", crate::runner::CommandOutput::with_exit_code(3)),
        );
        let ctx = context("name: demo\nrooms:\n  localhost:\n", "localhost", runner);
        assert!(matches!(
            launch(&ctx, &LaunchOptions::default()).await,
            Err(ObiError::CommandFailed { exit_code: 3, .. })
        ));
    }
}
