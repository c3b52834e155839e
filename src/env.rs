use crate::error::{RctfError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Prefix of config keys that only concern this tool and never reach a child process.
pub const CLI_KEY_PREFIX: &str = "cli.";

/// Environment variable names understood by rCTF and the dotted config keys they map to.
pub const KEY_ALIASES: [(&str, &str); 6] = [
    ("RCTF_NAME", "ctf.name"),
    ("RCTF_ORIGIN", "ctf.origin"),
    ("RCTF_DATABASE_URL", "db.url"),
    ("RCTF_REDIS_URL", "redis.url"),
    ("RCTF_SMTP_URL", "smtp.url"),
    ("RCTF_EMAIL_FROM", "smtp.from"),
];

pub type Environment = BTreeMap<String, String>;

pub fn config_key_for(env_key: &str) -> Option<&'static str> {
    KEY_ALIASES
        .iter()
        .find(|(env, _)| *env == env_key)
        .map(|(_, key)| *key)
}

pub fn env_key_for(config_key: &str) -> Option<&'static str> {
    KEY_ALIASES
        .iter()
        .find(|(_, key)| *key == config_key)
        .map(|(env, _)| *env)
}

/// Parse a dotenv file into a sorted map without touching the process environment.
///
/// Values are copied literally: `$VAR` and `${VAR}` are never expanded. Blank lines and `#`
/// comments are skipped, an `export ` prefix is ignored and one pair of matching quotes around
/// a value is removed.
pub fn read_dotenv(path: &Path) -> Result<Environment> {
    let raw = fs::read_to_string(path).map_err(|source| RctfError::Dotenv {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_dotenv(&raw))
}

fn parse_dotenv(raw: &str) -> Environment {
    let mut vars = Environment::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map_or(line, str::trim_start);
        match line.split_once('=') {
            Some((key, value)) if is_env_key(key.trim()) => {
                vars.insert(key.trim().to_string(), unquote(value.trim()).to_string());
            }
            _ => debug!("Skipping malformed dotenv line {}", idx + 1),
        }
    }
    vars
}

fn is_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        let inner = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote));
        if let Some(inner) = inner {
            return inner;
        }
    }
    value
}

/// Overlay the live process environment on top of `base`; the process wins on collisions.
pub fn merge_process_env(mut base: Environment) -> Environment {
    base.extend(std::env::vars());
    base
}
