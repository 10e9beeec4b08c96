//! `obi stop`.
//!
//! Sequence: pre-stop hooks (host, then local), the kill step, post-stop
//! hooks (host, then local). The kill step signals processes whose command
//! line starts with a path ending in the target name; "nothing matched" is
//! success.

use super::run_hooks;
use crate::errors::{ObiError, Result};
use crate::room::ExecutionContext;
use crate::util::{ere_escape, shell_quote};
use regex::Regex;
use tracing::{info, warn};

pub const DEFAULT_STOP_SIGNAL: &str = "TERM";
pub const DEFAULT_FORCE_STOP_SIGNAL: &str = "KILL";

/// `pkill` exit status when no process matched.
const PKILL_NO_MATCH: i32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Escalate to the force signal.
    pub force: bool,
}

/// Default kill pattern: the target at the start of the command line or
/// after a `/`, followed by a space or the end of the line.
pub fn default_kill_pattern(target_name: &str) -> String {
    format!("(^|/){}( |$)", ere_escape(target_name))
}

/// Kill pattern for `target_name`, honoring a `stop-pattern` template with
/// a `{target}` placeholder. Returns `None` when the target is empty.
pub fn kill_pattern(ctx: &ExecutionContext) -> Result<Option<String>> {
    if ctx.target_name.is_empty() {
        return Ok(None);
    }
    let pattern = match ctx.config.get_str("stop-pattern")? {
        Some(template) => template.replace("{target}", &ere_escape(&ctx.target_name)),
        None => default_kill_pattern(&ctx.target_name),
    };
    if Regex::new(&pattern).is_err() || has_non_ere_syntax(&pattern) {
        return Err(ObiError::InvalidConfigValue {
            key: "stop-pattern".to_string(),
            expected: "a POSIX extended regular expression as read by pkill \
                       (no \\d, \\p, (?...) groups or lazy quantifiers)",
        });
    }
    Ok(Some(pattern))
}

/// Regex syntax that parses as a Rust regex but that `pkill -f` (POSIX ERE)
/// rejects or reads differently.
fn has_non_ere_syntax(pattern: &str) -> bool {
    let mut chars = pattern.chars().peekable();
    let mut prev = None;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if matches!(
                    chars.next(),
                    Some('d' | 'D' | 'p' | 'P' | 'x' | 'u' | 'U' | 'A' | 'z' | 'n' | 't' | 'r')
                ) {
                    return true;
                }
                prev = None;
                continue;
            }
            '(' if chars.peek() == Some(&'?') => return true,
            '?' if matches!(prev, Some('*' | '+' | '?' | '}')) => return true,
            _ => {}
        }
        prev = Some(c);
    }
    false
}

fn signal(ctx: &ExecutionContext, options: StopOptions) -> Result<String> {
    let (key, default) = if options.force {
        ("force-stop-signal", DEFAULT_FORCE_STOP_SIGNAL)
    } else {
        ("stop-signal", DEFAULT_STOP_SIGNAL)
    };
    let signal = ctx
        .config
        .get_str(key)?
        .unwrap_or_else(|| default.to_string());
    let signal = signal.trim_start_matches('-').trim_start_matches("SIG").to_string();
    if signal.is_empty() || !signal.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ObiError::InvalidConfigValue {
            key: key.to_string(),
            expected: "a signal name or number",
        });
    }
    Ok(signal)
}

/// The kill command for this context, or `None` when it must be skipped.
pub fn kill_command(ctx: &ExecutionContext, options: StopOptions) -> Result<Option<String>> {
    if let Some(cmd) = ctx.config.get_str("stop-cmd")? {
        return Ok(Some(cmd));
    }
    let Some(pattern) = kill_pattern(ctx)? else {
        return Ok(None);
    };
    Ok(Some(format!(
        "pkill -{} -f {}",
        signal(ctx, options)?,
        shell_quote(&pattern)
    )))
}

pub async fn stop(ctx: &ExecutionContext, options: StopOptions) -> Result<()> {
    run_hooks(ctx, ctx.runner.as_ref(), &ctx.project_dir, &["pre-stop-cmds", "on-stop-cmds"]).await?;
    run_hooks(ctx, ctx.local.as_ref(), &ctx.local_project_dir, &["pre-stop-local-cmds"]).await?;

    match kill_command(ctx, options)? {
        Some(cmd) => {
            info!(
                "[{}] Stopping {}{}",
                ctx.host,
                ctx.target_name,
                if options.force { " (forced)" } else { "" }
            );
            let output = ctx.runner.execute(&cmd).await?;
            match output.exit_code {
                0 => {}
                PKILL_NO_MATCH => info!("[{}] No running {} found", ctx.host, ctx.target_name),
                code => {
                    return Err(ObiError::CommandFailed {
                        host: ctx.host.clone(),
                        command: cmd,
                        exit_code: code,
                        stderr: output.stderr,
                    });
                }
            }
        }
        None => warn!("[{}] Target name is empty; not stopping anything", ctx.host),
    }

    run_hooks(ctx, ctx.runner.as_ref(), &ctx.project_dir, &["post-stop-cmds"]).await?;
    run_hooks(ctx, ctx.local.as_ref(), &ctx.local_project_dir, &["post-stop-local-cmds"]).await?;
    Ok(())
}
