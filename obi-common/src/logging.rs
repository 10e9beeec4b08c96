//! Logging setup shared by the obi binary and tests.
//!
//! Levels come from `RUST_LOG` when set, otherwise from `OBI_LOG_LEVEL`
//! (or the caller's default). Output goes to stderr in a human or JSON
//! format, with an optional non-blocking copy written to `OBI_LOG_FILE`.

use crate::config::env::{EnvError, EnvParser};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "pretty" | "text" | "human" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log file path has no file name: {0}")]
    InvalidFile(PathBuf),
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    /// Problems found while reading the environment; reported after init.
    pub env_errors: Vec<String>,
}

impl LogConfig {
    pub fn from_env(default_level: &str) -> Self {
        Self::from_parser(&mut EnvParser::new(), default_level)
    }

    pub fn from_parser(parser: &mut EnvParser, default_level: &str) -> Self {
        let level = parser.get_log_level("LOG_LEVEL", default_level);
        let raw_format = parser.get_string("LOG_FORMAT", "pretty");
        let file = parser.get_optional_path("LOG_FILE");

        let mut env_errors: Vec<String> = parser
            .take_errors()
            .iter()
            .map(EnvError::to_string)
            .collect();
        let format = LogFormat::parse(&raw_format).unwrap_or_else(|| {
            env_errors.push(
                EnvError::InvalidValue {
                    var: "OBI_LOG_FORMAT".to_string(),
                    expected: "pretty or json",
                    value: raw_format.clone(),
                }
                .to_string(),
            );
            LogFormat::Pretty
        });

        Self {
            level,
            format,
            file,
            env_errors,
        }
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }
}

/// Keeps background log writers alive; drop at process exit.
#[must_use]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    });

    let mut file_guard = None;
    if let Some(path) = &config.file {
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidFile(path.clone()))?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
        file_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    for problem in &config.env_errors {
        tracing::warn!("{}", problem);
    }

    Ok(LoggingGuards { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parser(vars: &[(&str, &str)]) -> EnvParser {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvParser::with_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::from_parser(&mut parser(&[]), "info");
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file.is_none());
        assert!(config.env_errors.is_empty());
    }

    #[test]
    fn test_log_config_from_vars() {
        let mut p = parser(&[
            ("OBI_LOG_LEVEL", "trace"),
            ("OBI_LOG_FORMAT", "JSON"),
            ("OBI_LOG_FILE", "/tmp/obi.log"),
        ]);
        let config = LogConfig::from_parser(&mut p, "info");
        assert_eq!(config.level, "trace");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/obi.log")));
    }

    #[test]
    fn test_log_config_collects_env_errors() {
        let mut p = parser(&[("OBI_LOG_LEVEL", "shouty"), ("OBI_LOG_FORMAT", "xml")]);
        let config = LogConfig::from_parser(&mut p, "warn");
        assert_eq!(config.level, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.env_errors.len(), 2);
        assert!(config.env_errors[1].contains("OBI_LOG_FORMAT"));
        assert!(config.env_errors[1].contains("'xml'"));
    }

    #[test]
    fn test_verbose_overrides_env_level() {
        let config = LogConfig::from_parser(&mut parser(&[("OBI_LOG_LEVEL", "warn")]), "info")
            .with_level("debug");
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.file, None);
    }
}
