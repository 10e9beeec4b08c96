//! Deployment tasks.
//!
//! Each task reads the merged room configuration from an
//! [`ExecutionContext`](crate::room::ExecutionContext) and acts only
//! through the context's runners (plus local file writes for `fetch`).
//! Every task is safe to re-run; none rolls back a partial effect.

pub mod build;
pub mod clean;
pub mod fetch;
pub mod launch;
pub mod stop;
pub mod sync;

pub use build::{BuildOutcome, SENTINEL_FILE, args_hash, build};
pub use clean::clean;
pub use fetch::{FetchReport, fetch, fetch_dir_name};
pub use launch::{LaunchOptions, launch};
pub use stop::{StopOptions, stop};
pub use sync::sync;

use crate::errors::Result;
use crate::room::ExecutionContext;
use crate::runner::CommandRunner;
use crate::util::{relative_to, within};
use std::path::Path;

/// Run user hook commands from `keys` (first present key wins) inside
/// `dir`, failing on the first non-zero exit. `dir` is shown relative to
/// the invoking directory when `runner` is local.
pub(crate) async fn run_hooks(
    ctx: &ExecutionContext,
    runner: &dyn CommandRunner,
    dir: &Path,
    keys: &[&str],
) -> Result<()> {
    let dir = if runner.is_local() {
        relative_to(dir, &ctx.cwd)
    } else {
        dir.to_path_buf()
    };
    for cmd in ctx.config.get_string_list_any(keys)? {
        runner.run(&within(&dir, &cmd)).await?;
    }
    Ok(())
}
