//! Config command - configuration management.

use std::path::PathBuf;

use acolyte_config::{AcolyteConfig, LoadedConfig};
use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use console::Style;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Write a config file with the default settings
    Init {
        /// Create project-local config (./acolyte.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Runs before the database is opened, so a broken `[database]` section can
/// still be inspected.
pub fn run(args: ConfigArgs, loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(loaded, json_output),
        ConfigCommand::Which => cmd_which(loaded),
        ConfigCommand::Init { local } => cmd_init(local),
    }
}

fn cmd_show(loaded: &LoadedConfig, json_output: bool) -> Result<()> {
    let effective = loaded.config.effective();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&effective)?);
    } else {
        print!("{}", effective.to_toml()?);
    }
    Ok(())
}

fn cmd_which(loaded: &LoadedConfig) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &loaded.sources {
        let status = if source.loaded {
            Style::new().green().apply_to("✓ loaded")
        } else {
            Style::new().dim().apply_to("· not found")
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'acolyte config init' to create one.");
    } else {
        println!("{loaded_count} config file(s) loaded.");
    }
    Ok(())
}

fn cmd_init(local: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("acolyte.toml")
    } else {
        acolyte_config::xdg_config_path()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    acolyte_config::save_config(&AcolyteConfig::with_defaults(), &path)?;
    println!("✓ Created config file: {}", path.display());
    Ok(())
}
