//! `netlab destroy`: remove a lab's containers.

use anyhow::{Context, Result};
use clap::Args;
use netlab_core::lab::DEFAULT_PREFIX;
use netlab_core::netns::NetnsLinker;
use netlab_core::{LabDirs, Topology, destroy_lab};

use crate::commands::deploy::{base_dir, resolve_runtime};
use crate::docker::DockerCli;
use crate::settings::{Settings, expand_path};

#[derive(Debug, Args, Clone)]
pub struct DestroyArgs {
    /// Topology file
    #[arg(short, long, env = "NETLAB_TOPO")]
    pub topo: String,

    /// Container runtime binary (docker or podman)
    #[arg(long, env = "NETLAB_RUNTIME")]
    pub runtime: Option<String>,

    /// Also delete the lab directory
    #[arg(long)]
    pub cleanup: bool,
}

pub async fn handle_destroy(args: DestroyArgs, settings: &Settings) -> Result<()> {
    let topo_path = expand_path(&args.topo);
    let topo = Topology::from_file(&topo_path)
        .with_context(|| format!("Failed to load topology {}", topo_path.display()))?;

    let runtime = DockerCli::new(
        resolve_runtime(args.runtime.as_deref(), settings)?,
        topo.mgmt.network.clone(),
    );
    let netns = NetnsLinker::new(settings.netns_path());
    let removed = destroy_lab(&runtime, &netns, &topo.name)
        .await
        .with_context(|| format!("Failed to destroy lab '{}'", topo.name))?;
    println!("🧹 Removed {removed} container(s) of lab '{}'", topo.name);

    if args.cleanup {
        let prefix = topo.prefix.as_deref().unwrap_or(DEFAULT_PREFIX);
        let dirs = LabDirs::new(&base_dir(&topo_path), &topo.name, prefix);
        dirs.remove()?;
        println!("🗑️  Deleted {}", dirs.lab.display());
    }
    Ok(())
}
