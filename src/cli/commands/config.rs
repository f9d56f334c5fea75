//! Config Command
//!
//! Usage:
//!   rfpflow config show [-g] [-f json]
//!   rfpflow config path
//!   rfpflow config init [-g] [--force]

use crate::config::{Config, ConfigLoader};
use crate::types::{Result, RfpError};

/// Print the effective configuration, or the raw global file with `global`.
pub fn show(config: &Config, global: bool, format: &str) -> Result<()> {
    if global {
        match ConfigLoader::global_config_path() {
            Some(path) if path.exists() => {
                println!("# Global Config: {}\n", path.display());
                println!("{}", std::fs::read_to_string(&path)?);
            }
            Some(_) => {
                println!("No global config found.");
                println!("Run 'rfpflow config init --global' to create one.");
            }
            None => println!("Cannot determine global config directory."),
        }
        return Ok(());
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "toml" | "text" => println!(
            "{}",
            toml::to_string_pretty(config).map_err(|e| RfpError::Config(e.to_string()))?
        ),
        other => {
            return Err(RfpError::Config(format!(
                "Unknown format '{}'. Valid values: text, toml, json",
                other
            )));
        }
    }
    Ok(())
}

pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

pub fn init_global(force: bool) -> Result<()> {
    let dir = ConfigLoader::init_global(force)?;
    println!("✓ Initialized global configuration");
    println!("  Directory: {}", dir.display());
    if let Some(config_path) = ConfigLoader::global_config_path() {
        println!("  Config:    {}", config_path.display());
    }
    Ok(())
}

pub fn init_project() -> Result<()> {
    let root = std::env::current_dir()?;
    let dir = ConfigLoader::init_project_in(&root)?;
    println!("✓ Initialized project configuration");
    println!("  Directory: {}", dir.display());
    println!("  Config:    {}", dir.join("config.toml").display());
    Ok(())
}
