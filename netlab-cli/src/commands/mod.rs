pub mod deploy;
pub mod destroy;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::settings::Settings;
use deploy::{DeployArgs, handle_deploy};
use destroy::{DestroyArgs, handle_destroy};

#[derive(Debug, Parser)]
#[command(name = "netlab", version, about = "Deploy containerized network labs")]
pub struct Cli {
    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(long, global = true, env = "NETLAB_DEBUG")]
    pub debug: bool,

    /// Settings file instead of the per-user default
    #[arg(long, global = true, env = "NETLAB_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Deploy a lab from a topology file
    #[command(alias = "dep")]
    Deploy(DeployArgs),

    /// Remove the containers of a deployed lab
    #[command(alias = "des")]
    Destroy(DestroyArgs),
}

impl Cli {
    pub fn settings(&self) -> Result<Settings> {
        match &self.config {
            Some(path) => Settings::load_from(path),
            None => Settings::load(),
        }
    }
}

pub async fn handle_command(
    cmd: Commands,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<()> {
    match cmd {
        Commands::Deploy(args) => handle_deploy(args, settings, cancel).await,
        Commands::Destroy(args) => handle_destroy(args, settings).await,
    }
}
