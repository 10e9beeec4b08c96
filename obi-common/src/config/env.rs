//! Environment variable parsing.
//!
//! `EnvParser` reads `OBI_`-prefixed variables with validation and error
//! collection so every problem can be reported at once. Lookups go through
//! an injectable function, which keeps the parser testable without touching
//! the process environment.
//!
//! This module also discovers the g-speak installation whose `bin`
//! directory is put on `PATH` for every command obi runs.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error, PartialEq)]
pub enum EnvError {
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: &'static str,
        value: String,
    },

    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    lookup: Lookup,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Parser over the process environment with the `OBI_` prefix.
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Parser over an arbitrary variable source.
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            prefix: "OBI_",
            lookup: Box::new(lookup),
            errors: Vec::new(),
        }
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn raw(&self, name: &str) -> (String, Option<String>) {
        let var = self.var_name(name);
        let value = (self.lookup)(&var);
        (var, value)
    }

    /// Get a string value with default.
    pub fn get_string(&mut self, name: &str, default: &str) -> String {
        self.raw(name).1.unwrap_or_else(|| default.to_string())
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Option<String> {
        self.raw(name).1.filter(|v| !v.is_empty())
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> String {
        let (var, value) = self.raw(name);
        let Some(value) = value else {
            return default.to_string();
        };
        let lower = value.to_lowercase();
        match lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => lower,
            _ => {
                self.errors.push(EnvError::InvalidLogLevel { var, value });
                default.to_string()
            }
        }
    }

    /// Get an optional path with `~` expansion.
    pub fn get_optional_path(&mut self, name: &str) -> Option<PathBuf> {
        self.get_optional_string(name).map(|v| expand_path(&v))
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).as_ref())
}

/// Where the g-speak home came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolHomeSource {
    CommandLine,
    Environment,
    DirectoryLookup,
}

impl std::fmt::Display for ToolHomeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandLine => write!(f, "command-line"),
            Self::Environment => write!(f, "environment variable G_SPEAK_HOME"),
            Self::DirectoryLookup => write!(f, "directory lookup"),
        }
    }
}

/// A discovered g-speak installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolHome {
    pub path: PathBuf,
    pub source: ToolHomeSource,
}

impl ToolHome {
    /// Directory prepended to `PATH` for every command.
    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }
}

/// Default directory scanned for `g-speakX.Y` installations.
pub const G_SPEAK_SEARCH_ROOT: &str = "/opt/oblong";

/// Resolve the g-speak home: explicit flag, then `G_SPEAK_HOME`, then the
/// highest-versioned `g-speakX.Y` directory under `search_root`.
///
/// Returns `None` when nothing usable is found; the candidate must be an
/// existing directory.
pub fn resolve_g_speak_home(
    flag: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
    search_root: &Path,
) -> Option<ToolHome> {
    let candidate = if let Some(flag) = flag.filter(|f| !f.is_empty()) {
        Some(ToolHome {
            path: expand_path(flag),
            source: ToolHomeSource::CommandLine,
        })
    } else if let Some(env) = lookup("G_SPEAK_HOME").filter(|v| !v.is_empty()) {
        Some(ToolHome {
            path: expand_path(&env),
            source: ToolHomeSource::Environment,
        })
    } else {
        newest_g_speak_dir(search_root).map(|path| ToolHome {
            path,
            source: ToolHomeSource::DirectoryLookup,
        })
    }?;

    if candidate.path.is_dir() {
        debug!("Found {} by {}", candidate.path.display(), candidate.source);
        Some(candidate)
    } else {
        debug!(
            "{} ({}) does not exist or is not a directory",
            candidate.path.display(),
            candidate.source
        );
        None
    }
}

/// Parse `g-speak3.19` into `(3, 19)`. Directories such as
/// `g-speak-64-2` do not match.
fn g_speak_version(dir_name: &str) -> Option<(u32, u32)> {
    let version = dir_name.strip_prefix("g-speak")?;
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn newest_g_speak_dir(search_root: &Path) -> Option<PathBuf> {
    let pattern = search_root.join("g-speak?.*");
    let entries = glob::glob(&pattern.to_string_lossy()).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            let version = g_speak_version(path.file_name()?.to_str()?)?;
            Some((version, path))
        })
        .max_by_key(|(version, _)| *version)
        .map(|(_, path)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn parser(vars: &[(&str, &str)]) -> EnvParser {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvParser::with_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_get_log_level() {
        let mut p = parser(&[("OBI_LOG_LEVEL", "DEBUG")]);
        assert_eq!(p.get_log_level("LOG_LEVEL", "info"), "debug");

        let mut p = parser(&[("OBI_LOG_LEVEL", "loud")]);
        assert_eq!(p.get_log_level("LOG_LEVEL", "info"), "info");
        let errors = p.take_errors();
        assert!(matches!(errors[0], EnvError::InvalidLogLevel { .. }));
        assert!(errors[0].to_string().contains("OBI_LOG_LEVEL"));
        assert!(p.take_errors().is_empty());

        let mut p = parser(&[]);
        assert_eq!(p.get_log_level("LOG_LEVEL", "warn"), "warn");
    }

    #[test]
    fn test_optional_values() {
        let mut p = parser(&[("OBI_EMPTY", ""), ("OBI_FILE", "/var/log/obi.log")]);
        assert_eq!(p.get_optional_string("EMPTY"), None);
        assert_eq!(p.get_optional_string("MISSING"), None);
        assert_eq!(p.get_optional_path("FILE"), Some(PathBuf::from("/var/log/obi.log")));
        assert_eq!(p.get_string("MISSING", "fallback"), "fallback");
    }

    #[test]
    fn test_g_speak_version() {
        assert_eq!(g_speak_version("g-speak3.19"), Some((3, 19)));
        assert_eq!(g_speak_version("g-speak4.0"), Some((4, 0)));
        assert_eq!(g_speak_version("g-speak-64-2"), None);
        assert_eq!(g_speak_version("deps-64-11"), None);
    }

    #[test]
    fn test_resolve_prefers_flag_then_env() {
        let tmp = TempDir::new().unwrap();
        let flag_home = tmp.path().join("flag");
        let env_home = tmp.path().join("env");
        std::fs::create_dir_all(&flag_home).unwrap();
        std::fs::create_dir_all(&env_home).unwrap();
        let env_value = env_home.to_string_lossy().into_owned();

        let found = resolve_g_speak_home(
            Some(&flag_home.to_string_lossy()),
            |_| Some(env_value.clone()),
            tmp.path(),
        )
        .unwrap();
        assert_eq!(found.source, ToolHomeSource::CommandLine);
        assert_eq!(found.bin_dir(), flag_home.join("bin"));

        let found = resolve_g_speak_home(None, |_| Some(env_value.clone()), tmp.path()).unwrap();
        assert_eq!(found.source, ToolHomeSource::Environment);
        assert_eq!(found.path, env_home);
    }

    #[test]
    fn test_resolve_picks_newest_installation() {
        let tmp = TempDir::new().unwrap();
        for dir in ["g-speak3.9", "g-speak3.19", "g-speak-64-2", "g-speak3.2"] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        let found = resolve_g_speak_home(None, |_| None, tmp.path()).unwrap();
        assert_eq!(found.source, ToolHomeSource::DirectoryLookup);
        assert_eq!(found.path, tmp.path().join("g-speak3.19"));
    }

    #[test]
    fn test_resolve_missing_directory_is_none() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(resolve_g_speak_home(Some(&missing.to_string_lossy()), |_| None, tmp.path()).is_none());
        assert!(resolve_g_speak_home(None, |_| None, tmp.path()).is_none());
    }
}
