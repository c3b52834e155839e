use crate::config::Config;
use crate::env::{merge_process_env, Environment};
use crate::error::Result;
use crate::runner::Runner;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const DEFAULT_INSTALL_PATH: &str = "/opt/rctf/";
pub const CONFIG_FILE: &str = ".config.json";
pub const DOTENV_FILE: &str = ".env";

/// Shell lines the controller runs inside the install directory.
#[derive(Debug, Clone)]
pub struct ComposeCommands {
    pub up: String,
    pub down: String,
    pub build: String,
    pub pull: String,
}

impl Default for ComposeCommands {
    fn default() -> Self {
        ComposeCommands {
            up: "docker-compose --no-ansi up -d --build".to_string(),
            down: "docker-compose --no-ansi down".to_string(),
            build: "docker-compose --no-ansi build --no-cache".to_string(),
            pull: "git pull".to_string(),
        }
    }
}

/// A local rCTF checkout managed through docker-compose.
#[derive(Debug, Clone)]
pub struct Installation {
    install_path: PathBuf,
    config_path: PathBuf,
    dotenv_path: PathBuf,
    runner: Runner,
    commands: ComposeCommands,
}

impl Installation {
    pub fn new(install_path: impl Into<PathBuf>) -> Self {
        let install_path = install_path.into();
        Installation {
            config_path: install_path.join(CONFIG_FILE),
            dotenv_path: install_path.join(DOTENV_FILE),
            runner: Runner::new().current_dir(&install_path),
            commands: ComposeCommands::default(),
            install_path,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Replace the runner; it is always pointed at the install directory.
    pub fn with_runner(mut self, runner: Runner) -> Self {
        self.runner = runner.current_dir(&self.install_path);
        self
    }

    pub fn with_commands(mut self, commands: ComposeCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn dotenv_path(&self) -> &Path {
        &self.dotenv_path
    }

    /// Load the install's config, creating it from defaults and `.env` on first use.
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.config_path, Some(&self.dotenv_path), false)
    }

    /// Throw away the config file and rebuild it from defaults and `.env`.
    pub fn regenerate_config(&self) -> Result<Config> {
        Config::load(&self.config_path, Some(&self.dotenv_path), true)
    }

    /// Config projection overlaid with the live process environment (process wins).
    pub fn environment(&self) -> Result<Environment> {
        Ok(merge_process_env(self.config()?.to_environment()))
    }

    pub async fn start(&self) -> Result<bool> {
        let env = self.environment()?;
        if !self.runner.run(self.commands.up.as_str(), Some(&env)).await? {
            error!(fatal = true, "Failed to start rCTF instance.");
            return Ok(false);
        }
        info!("rCTF instance started.");
        Ok(true)
    }

    pub async fn stop(&self) -> Result<bool> {
        let env = self.environment()?;
        if !self.runner.run(self.commands.down.as_str(), Some(&env)).await? {
            error!(fatal = true, "Failed to stop rCTF instance.");
            return Ok(false);
        }
        info!("rCTF instance stopped.");
        Ok(true)
    }

    pub async fn restart(&self) -> Result<bool> {
        if !self.stop().await? {
            return Ok(false);
        }
        self.start().await
    }

    /// Stop (tolerating failure), pull the latest source, then rebuild images from scratch.
    pub async fn upgrade(&self) -> Result<bool> {
        match self.stop().await {
            Ok(true) => {}
            Ok(false) => warn!("Continuing upgrade although the instance could not be stopped."),
            Err(e) => warn!("Continuing upgrade although stopping failed: {e}"),
        }

        if !self.runner.run(self.commands.pull.as_str(), None).await? {
            error!(fatal = true, "Failed to pull latest from repository.");
            return Ok(false);
        }

        let env = self.environment()?;
        if !self.runner.run(self.commands.build.as_str(), Some(&env)).await? {
            error!(fatal = true, "Failed to rebuild docker image.");
            return Ok(false);
        }

        info!("rCTF upgraded; run `rctf start` to bring it back up.");
        Ok(true)
    }
}
