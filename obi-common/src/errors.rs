//! Error types for obi.
//!
//! Errors fall into three families:
//!
//! | Family        | Variants                                                          | Effect                      |
//! |---------------|-------------------------------------------------------------------|-----------------------------|
//! | Configuration | `ConfigNotFound`, `ConfigRead`, `ConfigParse`, `ConfigMissingField`, `RoomNotFound`, `InvalidConfigValue` | abort the whole invocation |
//! | Resolution    | `TargetNotFound`, `NoBuildToolConfigured`, `ConflictingBuildTools` | abort the task on that host |
//! | Execution     | `CommandFailed`, `Spawn`, `Io`                                     | abort the host's sequence   |
//!
//! Recoverable conditions (missing fetch files, absent build directories,
//! no process to stop) never become errors.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ObiError>;

#[derive(Debug, Error)]
pub enum ObiError {
    #[error("could not find a project.yaml in {start} or any directory above it")]
    ConfigNotFound { start: PathBuf },

    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("problem loading {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("could not find a `{field}` listed in {path}")]
    ConfigMissingField { path: PathBuf, field: &'static str },

    #[error("`{key}` in project.yaml must be {expected}")]
    InvalidConfigValue { key: String, expected: &'static str },

    #[error("{room} is not a room name listed in project.yaml (available rooms: {})", format_rooms(.available))]
    RoomNotFound { room: String, available: Vec<String> },

    #[error("room {room} is remote but lists no hosts")]
    RoomHasNoHosts { room: String },

    #[error("cannot find target; searched {}", format_paths(.searched))]
    TargetNotFound { searched: Vec<String> },

    #[error("no build tool configured: set one of `cmake-args`, `meson-args` or `build-cmd`")]
    NoBuildToolConfigured,

    #[error("both `cmake-args` and `meson-args` are configured; keep exactly one")]
    ConflictingBuildTools,

    #[error("[{host}] command exited with status {exit_code}: {command}{}", format_stderr(.stderr))]
    CommandFailed {
        host: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ObiError {
    /// Configuration errors abort the invocation before any task runs.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigRead { .. }
                | Self::ConfigParse { .. }
                | Self::ConfigMissingField { .. }
                | Self::InvalidConfigValue { .. }
                | Self::RoomNotFound { .. }
                | Self::RoomHasNoHosts { .. }
        )
    }

    /// Actionable follow-up shown under the error message.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("run obi from inside a project directory"),
            Self::ConfigMissingField { .. } => Some("add `name: <project>` to project.yaml"),
            Self::RoomNotFound { .. } => Some("list rooms with `obi room list`"),
            Self::RoomHasNoHosts { .. } => {
                Some("add `hosts: [...]` to the room or drop `is-local: false`")
            }
            Self::TargetNotFound { .. } => Some(
                "specify the relative path to your resulting binary via the `target` key",
            ),
            Self::NoBuildToolConfigured => {
                Some("add `cmake-args: []` to project.yaml for a plain cmake build")
            }
            _ => None,
        }
    }
}

fn format_rooms(rooms: &[String]) -> String {
    if rooms.is_empty() {
        "none".to_string()
    } else {
        rooms.join(", ")
    }
}

fn format_paths(paths: &[String]) -> String {
    paths.join(", ")
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_not_found_lists_rooms() {
        let err = ObiError::RoomNotFound {
            room: "lab".to_string(),
            available: vec!["localhost".to_string(), "wall".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("lab is not a room name"));
        assert!(msg.contains("localhost, wall"));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_room_not_found_without_rooms() {
        let err = ObiError::RoomNotFound {
            room: "lab".to_string(),
            available: vec![],
        };
        assert!(err.to_string().contains("available rooms: none"));
    }

    #[test]
    fn test_target_not_found_has_hint() {
        let err = ObiError::TargetNotFound {
            searched: vec!["build/app".to_string(), "bin/app".to_string()],
        };
        assert!(!err.is_config_error());
        assert!(err.hint().unwrap().contains("target"));
        assert!(err.to_string().contains("build/app, bin/app"));
    }

    #[test]
    fn test_command_failed_appends_stderr() {
        let err = ObiError::CommandFailed {
            host: "h1".to_string(),
            command: "make".to_string(),
            exit_code: 2,
            stderr: "  boom\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[h1] command exited with status 2: make\nboom"
        );
    }
}
