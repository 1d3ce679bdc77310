//! Config CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Validate configuration
    Validate {
        /// Validate this file instead of the project configuration
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigShowOutput(pub Config);

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.0).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub source: String,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!("{} is valid", self.source)
    }
}

pub async fn execute(args: ConfigArgs, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let config = ConfigLoader::load().context("Failed to load configuration")?;
            output(&ConfigShowOutput(config), json_mode);
        }
        ConfigCommands::Validate { file } => {
            let source = match file {
                Some(path) => {
                    ConfigLoader::load_from_file(&path)?;
                    path.display().to_string()
                }
                None => {
                    ConfigLoader::load()?;
                    "project configuration".to_string()
                }
            };
            output(&ConfigValidateOutput { valid: true, source }, json_mode);
        }
    }
    Ok(())
}
