use clap::{Parser, Subcommand};
use rctf_cli::rctf::DEFAULT_INSTALL_PATH;
use std::path::PathBuf;

/// Manage your rCTF installation
#[derive(Parser, Debug)]
#[command(name = "rctf", author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the rCTF checkout, its compose file and .env
    #[arg(long, global = true, env = "RCTF_INSTALL_PATH", default_value = DEFAULT_INSTALL_PATH)]
    pub install_path: PathBuf,

    /// Config file to use instead of <install-path>/.config.json
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Never colorize output
    #[arg(long, global = true)]
    pub no_ansi: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Build and start the rCTF containers
    Start,

    /// Stop and remove the rCTF containers
    Stop,

    /// Stop, then start again
    Restart,

    /// Pull the latest rCTF and rebuild its images
    Upgrade,

    /// Inspect or change the install's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print every key and value
    List,

    /// Print one value
    Get { key: String },

    /// Set a value and save the config
    Set { key: String, value: String },

    /// Remove a key and save the config
    Unset { key: String },

    /// Rebuild the config from defaults and the install's .env file
    Regenerate,

    /// Open the config file in $EDITOR
    Edit,

    /// Print the config file path
    Path,
}
