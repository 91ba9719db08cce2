//! Forklift migration CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// forklift-migrate - Drive VM migrations through the Forklift operator
#[derive(Parser, Debug)]
#[command(name = "forklift-migrate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more migration requests to completion
    Run(commands::run::RunArgs),
    /// Print the manifests a request would create
    Render(commands::render::RenderArgs),
    /// Check request files without contacting a cluster
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => commands::run::run(args).await,
            Commands::Render(args) => commands::render::run(args),
            Commands::Validate(args) => commands::validate::run(args),
        }
    }
}
