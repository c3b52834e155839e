//! Error types shared by the config store, process runner and controller.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RctfError>;

#[derive(Debug, thiserror::Error)]
pub enum RctfError {
    /// Dummy config path, malformed config file, unsupported value shapes.
    #[error("config error: {0}")]
    Config(String),

    /// A typed accessor found a value it could not interpret.
    #[error("config key `{key}` is not a valid {expected}: {value:?}")]
    Parse {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("command `{command}` exited with status code {code}")]
    SubprocessFailure { command: String, code: i32 },

    /// Raised by the status-code heuristic in the process runner.
    #[error("permission denied, try running as root: {invocation}")]
    Permission { invocation: String },

    #[error("no $EDITOR configured and no editors discovered")]
    EditorNotFound,

    #[error("failed to read dotenv file {path}: {source}")]
    Dotenv {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RctfError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
