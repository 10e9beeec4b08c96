//! `obi build`.
//!
//! A literal `build-cmd` is run as-is. Otherwise exactly one of
//! `cmake-args` / `meson-args` selects the tool. The configure step only
//! runs when the hash of the argument list differs from the one stored in
//! the build directory's sentinel file; the compile step always runs.

use crate::config::MergedConfig;
use crate::errors::{ObiError, Result};
use crate::room::ExecutionContext;
use crate::util::{join_fragments, join_quoted, shell_quote, shell_quote_path};
use tracing::{info, warn};

/// Sentinel file inside the build directory holding the configure hash.
pub const SENTINEL_FILE: &str = "hello-obi.txt";

/// Directory meson creates in a configured build directory.
const MESON_PRIVATE_DIR: &str = "meson-private";

/// CMake "extra generators", removed from CMake and rejected by new
/// releases when passed as `-G "<extra> - <generator>"`.
const LEGACY_CMAKE_EXTRA_GENERATORS: &[&str] = &[
    "CodeBlocks",
    "CodeLite",
    "Eclipse CDT4",
    "Kate",
    "Sublime Text 2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTool {
    Cmake,
    Meson,
}

impl BuildTool {
    fn args_key(&self) -> &'static str {
        match self {
            Self::Cmake => "cmake-args",
            Self::Meson => "meson-args",
        }
    }
}

/// What `build` decided to do on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// `build-cmd` override ran.
    Custom,
    /// Configure and compile ran.
    Configured,
    /// Sentinel matched; only compile ran.
    Cached,
}

/// Hash of the shell-quoted, space-joined argument list.
pub fn args_hash(args: &[String]) -> String {
    blake3::hash(join_quoted(args).as_bytes()).to_hex().to_string()
}

fn legacy_generator(value: &str) -> bool {
    let value = value.trim().trim_matches('"').trim_matches('\'');
    LEGACY_CMAKE_EXTRA_GENERATORS
        .iter()
        .any(|extra| value.starts_with(&format!("{extra} - ")))
}

/// Drop arguments known to break current tool releases, warning for each.
pub fn filter_legacy_args(tool: BuildTool, args: Vec<String>) -> Vec<String> {
    if tool != BuildTool::Cmake {
        return args;
    }
    let mut kept = Vec::with_capacity(args.len());
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-G" {
            if let Some(next) = iter.peek()
                && legacy_generator(next)
            {
                warn!("Ignoring obsolete cmake generator: -G {}", next);
                iter.next();
                continue;
            }
        } else if let Some(value) = arg.strip_prefix("-G")
            && legacy_generator(value)
        {
            warn!("Ignoring obsolete cmake generator: {}", arg);
            continue;
        }
        kept.push(arg);
    }
    kept
}

/// Pick the configured build tool.
pub fn select_tool(config: &MergedConfig) -> Result<BuildTool> {
    match (config.contains("cmake-args"), config.contains("meson-args")) {
        (true, false) => Ok(BuildTool::Cmake),
        (false, true) => Ok(BuildTool::Meson),
        (true, true) => Err(ObiError::ConflictingBuildTools),
        (false, false) => Err(ObiError::NoBuildToolConfigured),
    }
}

pub async fn build(ctx: &ExecutionContext) -> Result<BuildOutcome> {
    let runner = ctx.runner.as_ref();

    if let Some(cmd) = ctx.config.get_str("build-cmd")? {
        info!("[{}] Running build-cmd", ctx.host);
        runner.run(&cmd).await?;
        return Ok(BuildOutcome::Custom);
    }

    let tool = select_tool(&ctx.config)?;
    let args = filter_legacy_args(tool, ctx.config.get_string_list(tool.args_key())?);
    let build_args = ctx.config.get_string_list("build-args")?;
    let hash = args_hash(&args);
    let quoted_args = join_quoted(&args);

    let build_dir = shell_quote_path(&ctx.display_path(&ctx.build_dir));
    let source_dir = shell_quote_path(&ctx.display_path(&ctx.project_dir));
    let sentinel = shell_quote_path(&ctx.display_path(&ctx.build_dir.join(SENTINEL_FILE)));

    runner.run(&format!("mkdir -p {build_dir}")).await?;

    let stored = runner
        .execute(&format!("cat {sentinel} 2>/dev/null || true"))
        .await?
        .stdout
        .trim()
        .to_string();

    let configured = stored != hash;
    if configured {
        info!("[{}] Configuring {} ({:?})", ctx.host, ctx.project_name, tool);
        let configure = match tool {
            BuildTool::Cmake => join_fragments([
                "cmake -S",
                source_dir.as_str(),
                "-B",
                build_dir.as_str(),
                quoted_args.as_str(),
            ]),
            BuildTool::Meson => {
                // A configured directory needs `--reconfigure`.
                let existing = runner
                    .path_exists(&ctx.build_dir.join(MESON_PRIVATE_DIR))
                    .await?;
                join_fragments([
                    "meson setup",
                    if existing { "--reconfigure" } else { "" },
                    quoted_args.as_str(),
                    build_dir.as_str(),
                    source_dir.as_str(),
                ])
            }
        };
        runner.run(&configure).await?;
        runner
            .run(&format!("printf '%s\\n' {} > {sentinel}", shell_quote(&hash)))
            .await?;
    } else {
        info!("[{}] Build configuration unchanged, skipping configure", ctx.host);
    }

    let compile = match tool {
        BuildTool::Cmake if build_args.is_empty() => format!("cmake --build {build_dir}"),
        BuildTool::Cmake => format!("cmake --build {build_dir} -- {}", join_quoted(&build_args)),
        BuildTool::Meson => join_fragments([
            "ninja -C",
            build_dir.as_str(),
            join_quoted(&build_args).as_str(),
        ]),
    };
    runner.run(&compile).await?;

    Ok(if configured {
        BuildOutcome::Configured
    } else {
        BuildOutcome::Cached
    })
}
