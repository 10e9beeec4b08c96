//! `obi clean`: remove the build directory, or run `clean-cmd`.

use crate::errors::Result;
use crate::room::ExecutionContext;
use crate::util::shell_quote_path;
use tracing::info;

pub async fn clean(ctx: &ExecutionContext) -> Result<()> {
    let cmd = match ctx.config.get_str("clean-cmd")? {
        Some(cmd) => cmd,
        // `rm -f` semantics: an absent directory is already clean.
        None => format!(
            "rm -rf {}",
            shell_quote_path(&ctx.display_path(&ctx.build_dir))
        ),
    };
    info!("[{}] Cleaning {}", ctx.host, ctx.build_dir.display());
    ctx.runner.run(&cmd).await?;
    Ok(())
}
