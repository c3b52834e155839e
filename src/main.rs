mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use rctf_cli::{editor, logger, Config, Installation};
use std::io::IsTerminal;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let ansi = !cli.no_ansi && std::io::stderr().is_terminal();
    if let Err(e) = logger::init(cli.verbose, ansi) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let mut inst = Installation::new(&cli.install_path);
    if let Some(path) = &cli.config {
        inst = inst.with_config_path(path);
    }

    match cli.command {
        Commands::Start => {
            apply_ansi(&inst.config()?)?;
            Ok(inst.start().await?)
        }
        Commands::Stop => {
            apply_ansi(&inst.config()?)?;
            Ok(inst.stop().await?)
        }
        Commands::Restart => {
            apply_ansi(&inst.config()?)?;
            Ok(inst.restart().await?)
        }
        Commands::Upgrade => {
            apply_ansi(&inst.config()?)?;
            Ok(inst.upgrade().await?)
        }
        Commands::Config { action } => handle_config(&inst, action).await,
    }
}

/// The `cli.ansi` key can only turn colors off; flags and terminal detection decide the rest.
fn apply_ansi(cfg: &Config) -> Result<()> {
    if !cfg.get_bool("cli.ansi", Some(true))? {
        logger::set_ansi(false);
    }
    Ok(())
}

async fn handle_config(inst: &Installation, action: ConfigAction) -> Result<bool> {
    let mut cfg = match action {
        ConfigAction::Path => {
            println!("{}", inst.config_path().display());
            return Ok(true);
        }
        ConfigAction::Regenerate => {
            let cfg = inst.regenerate_config()?;
            apply_ansi(&cfg)?;
            info!("Regenerated {}.", cfg.path().display());
            return Ok(true);
        }
        _ => inst.config()?,
    };
    apply_ansi(&cfg)?;

    match action {
        ConfigAction::List => {
            for (key, value) in cfg.iter() {
                println!("{key}={value}");
            }
        }
        ConfigAction::Get { key } => match cfg.get(&key) {
            Some(value) => println!("{value}"),
            None => {
                error!("Config key {key} is not set.");
                return Ok(false);
            }
        },
        ConfigAction::Set { key, value } => {
            cfg.set(key.as_str(), value);
            cfg.persist()?;
            info!("Set {key} in {}.", cfg.path().display());
        }
        ConfigAction::Unset { key } => {
            if cfg.remove(&key).is_none() {
                warn!("Config key {key} is not set.");
                return Ok(false);
            }
            cfg.persist()?;
            info!("Removed {key} from {}.", cfg.path().display());
        }
        ConfigAction::Edit => {
            let editor = editor::find_editor()?;
            editor::edit_file(&editor, cfg.path()).await?;
            let reloaded = inst.config()?;
            info!("Config {} is valid.", reloaded.path().display());
        }
        ConfigAction::Path | ConfigAction::Regenerate => {}
    }

    Ok(true)
}
