//! obi - deploy, build and launch native projects across rooms of machines
//!
//! Reads `project.yaml`, resolves the requested room and runs a composite
//! command (go, build, stop, clean, rsync, fetch) on each of its hosts.

#![forbid(unsafe_code)]

mod commands;
mod orchestrator;

use anyhow::Result;
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use obi_common::config::env::{G_SPEAK_SEARCH_ROOT, resolve_g_speak_home};
use obi_common::config::{load_config, locate_config};
use obi_common::tasks::fetch::write_git_info;
use obi_common::tasks::{LaunchOptions, fetch_dir_name};
use obi_common::util::relative_to;
use obi_common::{ContextOptions, LogConfig, ObiError, RoomPlan, init_logging};
use orchestrator::{Composite, HostReport, Step};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "obi")]
#[command(author, version, about = "Deploy, build and launch projects across rooms of machines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// g-speak installation whose bin directory is put on PATH
    #[arg(long, global = true, value_name = "PATH")]
    g_speak_home: Option<String>,

    /// Print the generated helper script after a local run
    #[arg(long, global = true)]
    print_script: bool,
}

#[derive(Args, Debug, Clone)]
struct RoomArgs {
    /// Room listed in project.yaml
    #[arg(default_value = "localhost")]
    room: String,

    /// Print the commands instead of running them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync, build, stop and relaunch the project in a room
    Go {
        #[command(flatten)]
        room: RoomArgs,

        /// Launch under a debugger (alias from `debuggers` or a command)
        #[arg(long, value_name = "DEBUGGER")]
        debug: Option<String>,

        /// Arguments passed through to the application (after `--`)
        #[arg(last = true)]
        extras: Vec<String>,
    },

    /// Stop the running application
    Stop {
        #[command(flatten)]
        room: RoomArgs,

        /// Kill instead of asking the application to terminate
        #[arg(short, long)]
        force: bool,
    },

    /// Sync and build the project
    Build {
        #[command(flatten)]
        room: RoomArgs,
    },

    /// Remove the build directory
    Clean {
        #[command(flatten)]
        room: RoomArgs,
    },

    /// Mirror the local project directory onto the room's hosts
    Rsync {
        #[command(flatten)]
        room: RoomArgs,
    },

    /// Stop the application and download files into fetched.<timestamp>/
    Fetch {
        #[command(flatten)]
        room: RoomArgs,

        /// Files (or glob patterns) relative to the project directory
        files: Vec<String>,
    },

    /// Write a task's commands to a helper script without running them
    Script {
        /// Room listed in project.yaml
        #[arg(default_value = "localhost")]
        room: String,

        /// Task to record
        #[arg(long, value_enum, default_value_t = ScriptTask::Go)]
        task: ScriptTask,
    },

    /// Inspect rooms
    Room {
        #[command(subcommand)]
        command: RoomCommand,
    },
}

#[derive(Subcommand)]
enum RoomCommand {
    /// List the rooms in project.yaml
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScriptTask {
    Go,
    Build,
    Stop,
    Clean,
    Rsync,
}

impl ScriptTask {
    fn composite(self) -> Composite {
        match self {
            Self::Go => Composite::go(LaunchOptions::default()),
            Self::Build => Composite::build(),
            Self::Stop => Composite::stop(false),
            Self::Clean => Composite::clean(),
            Self::Rsync => Composite::rsync(),
        }
    }
}

/// What to run, resolved from the command line.
struct Invocation {
    composite: Composite,
    room: String,
    dry_run: bool,
    script_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = match init_logging(&log_config) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.downcast_ref::<ObiError>().and_then(ObiError::hint) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        command,
        g_speak_home,
        print_script,
        ..
    } = cli;

    let cwd = std::env::current_dir()?;
    let project = load_config(&locate_config(&cwd)?)?;

    let invocation = match command {
        Commands::Room {
            command: RoomCommand::List,
        } => {
            commands::room::list(&project, &mut std::io::stdout().lock())?;
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Go {
            room,
            debug,
            extras,
        } => Invocation {
            composite: Composite::go(LaunchOptions {
                debugger: debug,
                extras,
            }),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Stop { room, force } => Invocation {
            composite: Composite::stop(force),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Build { room } => Invocation {
            composite: Composite::build(),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Clean { room } => Invocation {
            composite: Composite::clean(),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Rsync { room } => Invocation {
            composite: Composite::rsync(),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Fetch { room, files } => Invocation {
            composite: Composite::fetch(
                files,
                project.root().join(fetch_dir_name(&Local::now())),
            ),
            room: room.room,
            dry_run: room.dry_run,
            script_only: false,
        },
        Commands::Script { room, task } => Invocation {
            composite: task.composite(),
            room,
            dry_run: false,
            script_only: true,
        },
    };

    let tool_home = resolve_g_speak_home(
        g_speak_home.as_deref(),
        |key| std::env::var(key).ok(),
        Path::new(G_SPEAK_SEARCH_ROOT),
    );
    match &tool_home {
        Some(home) => info!("Using g-speak at {} ({})", home.path.display(), home.source),
        None => debug!("No g-speak installation found; PATH left unchanged"),
    }

    let options = ContextOptions::from_process()
        .dry_run(invocation.dry_run)
        .script_only(invocation.script_only)
        .task(invocation.composite.name)
        .tool_bin(tool_home.map(|home| home.bin_dir()));
    let plan = RoomPlan::resolve(&project, &invocation.room, options)?;
    let contexts = plan.contexts();

    let reports = tokio::select! {
        reports = orchestrator::fan_out(&contexts, &invocation.composite) => reports,
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted; skipping the remaining steps");
            return Ok(ExitCode::SUCCESS);
        }
    };

    if let Some(Step::Fetch { dir, .. }) = invocation.composite.steps.last()
        && reports.iter().any(HostReport::is_success)
        && let Some(ctx) = contexts.first()
    {
        write_git_info(
            ctx.local.as_ref(),
            &relative_to(&plan.local_project_dir, &cwd),
            &relative_to(dir, &plan.local_project_dir),
        )
        .await;
        info!("Fetched files are in {}", relative_to(dir, &cwd).display());
    }

    if (invocation.script_only || print_script)
        && let Some(script) = plan.script()
    {
        commands::script::print(script, &mut std::io::stdout().lock())?;
    }

    let mut failed = 0;
    for report in &reports {
        if let Err(e) = &report.result {
            failed += 1;
            eprintln!(
                "error: {} failed on {}: {e}",
                report.failed_step.unwrap_or(invocation.composite.name),
                report.host
            );
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
