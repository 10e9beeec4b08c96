//! Subcommands that do not run tasks.

pub mod room;
pub mod script;
