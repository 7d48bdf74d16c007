//! Configuration view and validation: `taskboard config`.

use std::path::Path;

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use taskboard::config::{CliOverrides, Settings};

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let settings = Settings::load(config_path, &CliOverrides::default())?;

    match command {
        None | Some(ConfigCommands::Show) => {
            let rendered =
                toml::to_string_pretty(&settings).context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            println!();
            println!("Listening address: {}", settings.server.bind_addr());
        }
        Some(ConfigCommands::Validate) => {
            let warnings = settings.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}
