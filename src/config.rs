use crate::env::{self, Environment, CLI_KEY_PREFIX};
use crate::error::{RctfError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stored strings `get_bool` accepts as true (compared trimmed and lowercased).
const TRUTHY: [&str; 3] = ["true", "1", "enable"];

/// Flat, ordered key/value configuration backed by a JSON file.
///
/// Every value is held as a string; typed accessors parse on read.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    path: PathBuf,
    values: Map<String, Value>,
}

/// Built-in configuration every fresh install starts from.
pub fn default_config() -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("cli.ansi".to_string(), Value::String("true".to_string()));
    values
}

impl Config {
    /// An in-memory config with the empty path; it can be read from but never loaded or persisted.
    pub fn dummy() -> Self {
        Config {
            path: PathBuf::new(),
            values: default_config(),
        }
    }

    /// Load the config at `path`, or build it from defaults (plus selected dotenv keys) and write
    /// it out when the file is missing or `regenerate` is set.
    ///
    /// Regeneration never merges onto what was on disk: it always starts from
    /// [`default_config`]. The existence check and the following write are not atomic, so two
    /// concurrent invocations against one install may race.
    pub fn load(
        path: impl Into<PathBuf>,
        dotenv_path: Option<&Path>,
        regenerate: bool,
    ) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(RctfError::config("attempted to read dummy config path"));
        }

        if !regenerate && path.is_file() {
            let raw = fs::read_to_string(&path)?;
            let values = parse_values(&raw)
                .map_err(|e| RctfError::config(format!("{}: {e}", path.display())))?;
            return Ok(Config { path, values });
        }

        if regenerate {
            debug!("Regenerating config file {} from defaults", path.display());
        } else {
            debug!("Config file {} does not exist, using default config", path.display());
        }

        let mut config = Config {
            path,
            values: default_config(),
        };

        if let Some(dotenv_path) = dotenv_path {
            if dotenv_path.is_file() {
                debug!("Importing config from dotenv file {}", dotenv_path.display());
                config.import_dotenv(dotenv_path)?;
            } else {
                debug!("No dotenv file at {}, skipping import", dotenv_path.display());
            }
        }

        config.persist()?;
        Ok(config)
    }

    /// Copy only aliased keys from a dotenv file, in lexicographic key order.
    fn import_dotenv(&mut self, dotenv_path: &Path) -> Result<()> {
        for (key, value) in env::read_dotenv(dotenv_path)? {
            if let Some(config_key) = env::config_key_for(&key) {
                self.set(config_key, value);
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: Option<bool>) -> Result<bool> {
        match (self.get(key), default) {
            (Some(raw), _) => Ok(TRUTHY.contains(&raw.trim().to_lowercase().as_str())),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(missing(key, "boolean")),
        }
    }

    pub fn get_int(&self, key: &str, default: Option<i64>) -> Result<i64> {
        match (self.get(key), default) {
            (Some(raw), _) => raw.trim().parse::<i64>().map_err(|_| RctfError::Parse {
                key: key.to_string(),
                value: raw.to_string(),
                expected: "integer",
            }),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(missing(key, "integer")),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), Value::String(value.to_string()));
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.shift_remove(key).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str().unwrap_or_default()))
    }

    /// Replace the whole file with the current mapping as 2-space indented JSON, owner-only.
    pub fn persist(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(RctfError::config("attempted to write dummy config path"));
        }

        let text = serde_json::to_string_pretty(&self.values)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // mode() only applies on creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(text.as_bytes())?;
        debug!("Wrote config file {}", self.path.display());
        Ok(())
    }

    /// Environment variables a child process should see for this config.
    ///
    /// Aliased keys go back to their `RCTF_*` names, `cli.*` keys are dropped and anything
    /// else passes through verbatim.
    pub fn to_environment(&self) -> Environment {
        self.iter()
            .filter_map(|(key, value)| match env::env_key_for(key) {
                Some(env_key) => Some((env_key.to_string(), value.to_string())),
                None if key.starts_with(CLI_KEY_PREFIX) => None,
                None => Some((key.to_string(), value.to_string())),
            })
            .collect()
    }
}

fn missing(key: &str, expected: &'static str) -> RctfError {
    RctfError::Parse {
        key: key.to_string(),
        value: String::new(),
        expected,
    }
}

fn parse_values(raw: &str) -> std::result::Result<Map<String, Value>, String> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| format!("malformed JSON: {e}"))?;
    let Value::Object(map) = parsed else {
        return Err("top-level value must be an object".to_string());
    };

    let mut values = Map::new();
    for (key, value) in map {
        let text = match value {
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            Value::Array(_) | Value::Object(_) => {
                return Err(format!("value of `{key}` must be a scalar"));
            }
        };
        values.insert(key, Value::String(text));
    }
    Ok(values)
}
