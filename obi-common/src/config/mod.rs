//! Project configuration.
//!
//! A project is described by a `project.yaml` found by walking upward from
//! the current directory. Top-level keys are project-wide settings; the
//! `rooms` mapping names deployment targets whose keys shadow the top-level
//! ones in the merged view handed to tasks.

pub mod env;

use crate::errors::{ObiError, Result};
use serde_yaml_ng::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "project.yaml";

/// Parsed `project.yaml`.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// Project name; never empty.
    pub name: String,
    /// Rooms keyed by name.
    pub rooms: BTreeMap<String, RoomConfig>,
    /// Every top-level key except `rooms`.
    pub settings: Mapping,
    /// Location of the file this was loaded from.
    pub path: PathBuf,
}

impl ProjectConfig {
    /// Directory containing `project.yaml`.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Room names in sorted order.
    pub fn room_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Parse configuration text. `path` is only used for messages and
    /// for [`ProjectConfig::root`].
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let parse_err = |message: String| ObiError::ConfigParse {
            path: path.to_path_buf(),
            message,
        };

        let value: Value = serde_yaml_ng::from_str(text).map_err(|e| parse_err(e.to_string()))?;
        let mut settings = match value {
            Value::Mapping(map) if !map.is_empty() => map,
            Value::Null => return Err(parse_err("file is empty".to_string())),
            Value::Mapping(_) => return Err(parse_err("file is empty".to_string())),
            _ => return Err(parse_err("expected a mapping at the top level".to_string())),
        };

        let name = match settings.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(ObiError::ConfigMissingField {
                    path: path.to_path_buf(),
                    field: "name",
                });
            }
        };

        let mut rooms = BTreeMap::new();
        match settings.remove("rooms") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(entries)) => {
                for (key, value) in entries {
                    let room_name = scalar_to_string(&key)
                        .ok_or_else(|| parse_err("room names must be strings".to_string()))?;
                    let room = RoomConfig::from_value(value).map_err(|message| {
                        parse_err(format!("room `{room_name}`: {message}"))
                    })?;
                    rooms.insert(room_name, room);
                }
            }
            Some(_) => return Err(parse_err("`rooms` must be a mapping".to_string())),
        }

        Ok(Self {
            name,
            rooms,
            settings,
            path: path.to_path_buf(),
        })
    }
}

/// One entry of the `rooms` mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomConfig {
    /// Hosts in declaration order; may be empty.
    pub hosts: Vec<String>,
    /// Explicit locality override.
    pub is_local: Option<bool>,
    /// SSH user override.
    pub user: Option<String>,
    /// Remote deployment directory override.
    pub project_dir: Option<String>,
    /// All keys of the room, including the ones above.
    pub settings: Mapping,
}

impl RoomConfig {
    fn from_value(value: Value) -> std::result::Result<Self, String> {
        let settings = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(map) => map,
            _ => return Err("expected a mapping".to_string()),
        };

        let view = MergedConfig::new(settings.clone());
        let hosts = view.get_string_list("hosts").map_err(|e| e.to_string())?;
        let is_local = view.get_bool("is-local").map_err(|e| e.to_string())?;
        let user = view.get_str("user").map_err(|e| e.to_string())?;
        let project_dir = view.get_str("project-dir").map_err(|e| e.to_string())?;

        Ok(Self {
            hosts,
            is_local,
            user,
            project_dir,
            settings,
        })
    }
}

/// Room settings flattened onto the project settings; room keys win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedConfig {
    values: Mapping,
}

impl MergedConfig {
    pub fn new(values: Mapping) -> Self {
        Self { values }
    }

    pub fn contains(&self, key: &str) -> bool {
        !matches!(self.values.get(key), None | Some(Value::Null))
    }

    /// Scalar value as a string. Numbers and booleans are stringified.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => scalar_to_string(value).map(Some).ok_or_else(|| {
                ObiError::InvalidConfigValue {
                    key: key.to_string(),
                    expected: "a string",
                }
            }),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(ObiError::InvalidConfigValue {
                key: key.to_string(),
                expected: "true or false",
            }),
        }
    }

    /// A sequence of scalars. A lone scalar counts as a one-element list.
    pub fn get_string_list(&self, key: &str) -> Result<Vec<String>> {
        let invalid = || ObiError::InvalidConfigValue {
            key: key.to_string(),
            expected: "a list of strings",
        };
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| scalar_to_string(item).ok_or_else(invalid))
                .collect(),
            Some(value) => scalar_to_string(value)
                .map(|s| vec![s])
                .ok_or_else(invalid),
        }
    }

    /// A mapping of scalars, in file order.
    pub fn get_map(&self, key: &str) -> Result<Vec<(String, String)>> {
        let invalid = || ObiError::InvalidConfigValue {
            key: key.to_string(),
            expected: "a mapping of strings",
        };
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Mapping(entries)) => entries
                .iter()
                .map(|(k, v)| {
                    let k = scalar_to_string(k).ok_or_else(invalid)?;
                    let v = match v {
                        Value::Null => String::new(),
                        other => scalar_to_string(other).ok_or_else(invalid)?,
                    };
                    Ok((k, v))
                })
                .collect(),
            Some(_) => Err(invalid()),
        }
    }

    /// First present key among `keys`, as a list.
    pub fn get_string_list_any(&self, keys: &[&str]) -> Result<Vec<String>> {
        for key in keys {
            if self.contains(key) {
                return self.get_string_list(key);
            }
        }
        Ok(Vec::new())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Walk upward from `start` until a directory containing `project.yaml`
/// is found. Returns the path of the file itself.
pub fn locate_config(start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!("Found {}", candidate.display());
            return Ok(candidate);
        }
    }
    Err(ObiError::ConfigNotFound {
        start: start.to_path_buf(),
    })
}

/// Read and parse `project.yaml` at `path`.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| ObiError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    ProjectConfig::parse(&text, &path)
}

/// Look a room up by name.
pub fn resolve_room<'a>(config: &'a ProjectConfig, room_name: &str) -> Result<&'a RoomConfig> {
    config
        .rooms
        .get(room_name)
        .ok_or_else(|| ObiError::RoomNotFound {
            room: room_name.to_string(),
            available: config.room_names(),
        })
}

/// Overlay `room` onto the project settings. `rooms` is never part of the
/// result and room keys win ties.
pub fn merge(config: &ProjectConfig, room: &RoomConfig) -> MergedConfig {
    let mut values = config.settings.clone();
    values.remove("rooms");
    for (key, value) in &room.settings {
        values.insert(key.clone(), value.clone());
    }
    MergedConfig::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
name: demo
cmake-args: [-DFOO=1]
build-dir: build
env-vars:
  A: "1"
  B: two
rooms:
  localhost:
  wall:
    hosts: [wall-1, wall-2]
    user: deploy
    build-dir: out
  lab:
    hosts: lab-1
    is-local: true
"#;

    fn sample() -> ProjectConfig {
        ProjectConfig::parse(SAMPLE, Path::new("/p/project.yaml")).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let config = sample();
        assert_eq!(config.name, "demo");
        assert_eq!(config.room_names(), vec!["lab", "localhost", "wall"]);
        assert!(config.settings.get("rooms").is_none());
        assert_eq!(config.root(), Path::new("/p"));

        let wall = &config.rooms["wall"];
        assert_eq!(wall.hosts, vec!["wall-1", "wall-2"]);
        assert_eq!(wall.user.as_deref(), Some("deploy"));
        assert_eq!(wall.is_local, None);

        let lab = &config.rooms["lab"];
        assert_eq!(lab.hosts, vec!["lab-1"]);
        assert_eq!(lab.is_local, Some(true));

        assert_eq!(config.rooms["localhost"], RoomConfig::default());
    }

    #[test]
    fn test_parse_empty_file_fails() {
        let err = ProjectConfig::parse("", Path::new("project.yaml")).unwrap_err();
        assert!(matches!(err, ObiError::ConfigParse { .. }));
        let err = ProjectConfig::parse("{}", Path::new("project.yaml")).unwrap_err();
        assert!(matches!(err, ObiError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_malformed_fails() {
        let err = ProjectConfig::parse("name: [unclosed", Path::new("project.yaml")).unwrap_err();
        assert!(matches!(err, ObiError::ConfigParse { .. }));
        let err = ProjectConfig::parse("- a\n- b\n", Path::new("project.yaml")).unwrap_err();
        assert!(matches!(err, ObiError::ConfigParse { .. }));
    }

    #[test]
    fn test_missing_name_fails() {
        for text in ["rooms: {}", "name: ''", "name:\nrooms: {}", "name: [a]"] {
            let err = ProjectConfig::parse(text, Path::new("project.yaml")).unwrap_err();
            assert!(
                matches!(err, ObiError::ConfigMissingField { field: "name", .. }),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_resolve_room_not_found_lists_rooms() {
        let config = sample();
        let err = resolve_room(&config, "atrium").unwrap_err();
        match err {
            ObiError::RoomNotFound { room, available } => {
                assert_eq!(room, "atrium");
                assert_eq!(available, vec!["lab", "localhost", "wall"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_room_wins() {
        let config = sample();
        let merged = merge(&config, resolve_room(&config, "wall").unwrap());
        assert_eq!(merged.get_str("build-dir").unwrap().as_deref(), Some("out"));
        assert_eq!(merged.get_str("name").unwrap().as_deref(), Some("demo"));
        assert_eq!(merged.get_string_list("cmake-args").unwrap(), vec!["-DFOO=1"]);
        assert!(!merged.contains("rooms"));

        let merged = merge(&config, resolve_room(&config, "localhost").unwrap());
        assert_eq!(merged.get_str("build-dir").unwrap().as_deref(), Some("build"));
        // The project settings are untouched by merging.
        assert_eq!(
            config.settings.get("build-dir"),
            Some(&Value::String("build".to_string()))
        );
    }

    #[test]
    fn test_get_map_preserves_order() {
        let merged = MergedConfig::new(sample().settings);
        assert_eq!(
            merged.get_map("env-vars").unwrap(),
            vec![("A".to_string(), "1".to_string()), ("B".to_string(), "two".to_string())]
        );
        assert!(merged.get_map("pools").unwrap().is_empty());
    }

    #[test]
    fn test_wrong_shapes_rejected() {
        let config = ProjectConfig::parse(
            "name: x\ncmake-args: {a: b}\nenv-vars: [a]\nis-local: yes-please\n",
            Path::new("project.yaml"),
        )
        .unwrap();
        let merged = MergedConfig::new(config.settings);
        assert!(merged.get_string_list("cmake-args").is_err());
        assert!(merged.get_map("env-vars").is_err());
        assert!(merged.get_bool("is-local").is_err());
    }

    #[test]
    fn test_locate_config_walks_upward() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE_NAME), "name: demo\n").unwrap();

        let found = locate_config(&nested).unwrap();
        assert_eq!(found, tmp.path().join(CONFIG_FILE_NAME));
        let config = load_config(&found).unwrap();
        assert_eq!(config.name, "demo");
        assert_eq!(config.root(), tmp.path());
    }

    #[test]
    fn test_locate_config_not_found() {
        let tmp = TempDir::new().unwrap();
        // The temp dir may live under a directory with its own project.yaml;
        // only assert on the error shape when nothing is found.
        if let Err(err) = locate_config(tmp.path()) {
            assert!(matches!(err, ObiError::ConfigNotFound { .. }));
        }
    }
}
