//! `obi fetch`: copy result files from each host into a timestamped
//! directory under the local project.
//!
//! Layout: `fetched.<YYYYmmdd.HHMMSS>/<host>/<path of the file pattern>`.
//! A pattern that matches nothing on a host is skipped with a warning.

use crate::errors::{ObiError, Result};
use crate::room::ExecutionContext;
use crate::runner::CommandRunner;
use crate::util::{relative_to, shell_quote, shell_quote_path, within};
use chrono::{DateTime, TimeZone};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// rsync exit status for a partial transfer (e.g. a vanished source file).
const RSYNC_PARTIAL_TRANSFER: i32 = 23;

/// Directory name for a fetch started at `now`.
pub fn fetch_dir_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("fetched.{}", now.format("%Y%m%d.%H%M%S"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
}

/// Patterns to fetch: explicit arguments, else the `fetch` config list.
pub fn fetch_patterns(ctx: &ExecutionContext, files: &[String]) -> Result<Vec<String>> {
    if files.is_empty() {
        ctx.config.get_string_list("fetch")
    } else {
        Ok(files.to_vec())
    }
}

/// Local directory receiving `pattern` from `ctx.host`.
fn destination(ctx: &ExecutionContext, fetch_dir: &Path, pattern: &str) -> PathBuf {
    let parent = Path::new(pattern)
        .parent()
        .filter(|p| !p.as_os_str().is_empty() && p.is_relative())
        .map(Path::to_path_buf)
        .unwrap_or_default();
    relative_to(&fetch_dir.join(&ctx.host).join(parent), &ctx.cwd)
}

async fn fetch_local(
    ctx: &ExecutionContext,
    pattern: &str,
    dest: &Path,
    report: &mut FetchReport,
) -> Result<()> {
    let full = ctx.project_dir.join(pattern);
    let matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
        .map_err(|_| ObiError::InvalidConfigValue {
            key: "fetch".to_string(),
            expected: "a list of valid file patterns",
        })?
        .filter_map(|entry| entry.ok())
        .collect();
    if matches.is_empty() {
        warn!("[{}] Nothing matches {}, skipping", ctx.host, pattern);
        report.skipped.push(pattern.to_string());
        return Ok(());
    }
    let dest = shell_quote_path(dest);
    ctx.local.run(&format!("mkdir -p {dest}")).await?;
    for source in matches {
        let source = shell_quote_path(&relative_to(&source, &ctx.cwd));
        ctx.local.run(&format!("cp -R {source} {dest}/")).await?;
    }
    report.fetched.push(pattern.to_string());
    Ok(())
}

async fn fetch_remote(
    ctx: &ExecutionContext,
    pattern: &str,
    dest: &Path,
    report: &mut FetchReport,
) -> Result<()> {
    let dest = shell_quote_path(dest);
    ctx.local.run(&format!("mkdir -p {dest}")).await?;
    let source = format!(
        "{}@{}:{}",
        ctx.user,
        ctx.host,
        ctx.project_dir.join(pattern).display()
    );
    let cmd = format!("rsync -az {} {dest}/", shell_quote(&source));
    let output = ctx.local.execute(&cmd).await?;
    match output.exit_code {
        0 => report.fetched.push(pattern.to_string()),
        RSYNC_PARTIAL_TRANSFER => {
            warn!("[{}] Could not fetch {}, skipping", ctx.host, pattern);
            report.skipped.push(pattern.to_string());
        }
        code => {
            return Err(ObiError::CommandFailed {
                host: ctx.host.clone(),
                command: cmd,
                exit_code: code,
                stderr: output.stderr,
            });
        }
    }
    Ok(())
}

/// Fetch `files` (or the configured `fetch` list) from `ctx.host` into
/// `fetch_dir`, an absolute local path.
pub async fn fetch(ctx: &ExecutionContext, files: &[String], fetch_dir: &Path) -> Result<FetchReport> {
    let patterns = fetch_patterns(ctx, files)?;
    let mut report = FetchReport::default();
    if patterns.is_empty() {
        warn!("[{}] No files to fetch; pass file names or set `fetch`", ctx.host);
        return Ok(report);
    }

    info!("[{}] Fetching {} pattern(s)", ctx.host, patterns.len());
    for pattern in &patterns {
        let dest = destination(ctx, fetch_dir, pattern);
        if ctx.is_local {
            fetch_local(ctx, pattern, &dest, &mut report).await?;
        } else {
            fetch_remote(ctx, pattern, &dest, &mut report).await?;
        }
    }
    Ok(report)
}

/// Best-effort `git.diff` and `git.log` next to the fetched files.
pub async fn write_git_info(local: &dyn CommandRunner, project_dir: &Path, fetch_dir: &Path) {
    let dir = shell_quote_path(fetch_dir);
    for (name, git) in [("git.diff", "git diff HEAD"), ("git.log", "git log")] {
        let cmd = within(project_dir, &format!("mkdir -p {dir} && {git} > {dir}/{name}"));
        match local.execute(&cmd).await {
            Ok(output) if output.is_success() => {}
            Ok(output) => debug!("{} failed with status {}", git, output.exit_code),
            Err(e) => debug!("{} failed: {}", git, e),
        }
    }
}
