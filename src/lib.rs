//! Manage a local rCTF deployment through `docker-compose` and `git`.
//!
//! [`Config`] holds the install's flat JSON settings, [`Runner`] launches commands and streams
//! their output into the log, and [`Installation`] ties both together into `start`, `stop` and
//! `upgrade`.

pub mod config;
pub mod editor;
pub mod env;
pub mod error;
pub mod logger;
pub mod rctf;
pub mod runner;

pub use config::Config;
pub use error::{RctfError, Result};
pub use rctf::Installation;
pub use runner::{Runner, ShellCommand};
