//! Shared library for obi.
//!
//! Resolves a named room from `project.yaml` into an [`ExecutionContext`],
//! provides the command runners (local, remote, dry-run) the context is
//! bound to, and implements the idempotent deployment tasks that the `obi`
//! binary sequences per host.

pub mod config;
pub mod errors;
pub mod logging;
pub mod room;
pub mod runner;
pub mod tasks;
pub mod util;

pub use config::{CONFIG_FILE_NAME, MergedConfig, ProjectConfig, RoomConfig};
pub use errors::{ObiError, Result};
pub use logging::{LogConfig, LogFormat, init_logging};
pub use room::{ContextOptions, ExecutionContext, RoomPlan, decide_local};
pub use runner::{CommandOutput, CommandRunner};
pub use util::shell_quote;
