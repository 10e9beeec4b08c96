//! `obi rsync`: mirror the local project tree onto a remote host.

use crate::errors::Result;
use crate::room::ExecutionContext;
use crate::util::{join_fragments, relative_to, shell_quote, shell_quote_path, within};
use tracing::{debug, info};

/// The `rsync` invocation that mirrors the project onto `ctx.host`.
pub fn rsync_command(ctx: &ExecutionContext) -> Result<String> {
    let excludes: Vec<String> = ctx
        .config
        .get_string_list("rsync-excludes")?
        .iter()
        .map(|pattern| format!("--exclude={}", shell_quote(pattern)))
        .collect();
    let source = format!(
        "{}/",
        relative_to(&ctx.local_project_dir, &ctx.cwd).to_string_lossy()
    );
    let destination = format!("{}@{}:{}/", ctx.user, ctx.host, ctx.project_dir.display());
    Ok(join_fragments([
        "rsync -az --delete",
        excludes.join(" ").as_str(),
        shell_quote(&source).as_str(),
        shell_quote(&destination).as_str(),
    ]))
}

pub async fn sync(ctx: &ExecutionContext) -> Result<()> {
    if ctx.is_local {
        debug!("[{}] Local room, nothing to sync", ctx.host);
        return Ok(());
    }

    if let Some(cmd) = ctx.config.get_str("pre-rsync-cmd")?
        && !cmd.trim().is_empty()
    {
        let dir = relative_to(&ctx.local_project_dir, &ctx.cwd);
        ctx.local.run(&within(&dir, &cmd)).await?;
    }

    info!("[{}] Syncing project to {}", ctx.host, ctx.project_dir.display());
    ctx.runner
        .run(&format!("mkdir -p {}", shell_quote_path(&ctx.project_dir)))
        .await?;
    ctx.local.run(&rsync_command(ctx)?).await?;
    Ok(())
}
