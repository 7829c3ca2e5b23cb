//! `netlab deploy`: bring a topology up.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Args;
use netlab_core::netns::NetnsLinker;
use netlab_core::runtime::{ContainerRuntime, LinkProvisioner};
use netlab_core::types::{Ipv4Cidr, Ipv6Cidr};
use netlab_core::{DeployOptions, Lab, NodeRegistry, Orchestrator, Topology, destroy_lab};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::docker::DockerCli;
use crate::links::VethLinker;
use crate::prereq::{check_prerequisites, detect_runtime, print_prereq_report};
use crate::report::{OutputFormat, print_report};
use crate::settings::{Settings, expand_path};

#[derive(Debug, Args, Clone)]
pub struct DeployArgs {
    /// Topology file
    #[arg(short, long, env = "NETLAB_TOPO")]
    pub topo: String,

    /// Concurrent node and link workers, 0 for unlimited
    #[arg(long, env = "NETLAB_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Remove existing lab containers and the lab directory first
    #[arg(long)]
    pub reconfigure: bool,

    /// Management network name
    #[arg(long)]
    pub network: Option<String>,

    /// Management IPv4 subnet
    #[arg(short = '4', long = "ipv4-subnet")]
    pub ipv4_subnet: Option<Ipv4Cidr>,

    /// Management IPv6 subnet
    #[arg(short = '6', long = "ipv6-subnet")]
    pub ipv6_subnet: Option<Ipv6Cidr>,

    /// Container runtime binary (docker or podman)
    #[arg(long, env = "NETLAB_RUNTIME")]
    pub runtime: Option<String>,

    /// Do not append lab entries to the hosts file
    #[arg(long)]
    pub no_hosts: bool,

    /// Skip the root and binary checks
    #[arg(long)]
    pub skip_prereq: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Read the topology at `path` and apply command line overrides.
pub fn load_topology(path: &Path, args: &DeployArgs) -> Result<Topology> {
    let mut topo = Topology::from_file(path)
        .with_context(|| format!("Failed to load topology {}", path.display()))?;
    if let Some(network) = &args.network {
        topo.mgmt.network.clone_from(network);
    }
    if args.ipv4_subnet.is_some() {
        topo.mgmt.ipv4_subnet = args.ipv4_subnet;
    }
    if args.ipv6_subnet.is_some() {
        topo.mgmt.ipv6_subnet = args.ipv6_subnet;
    }
    Ok(topo)
}

/// Runtime binary from the flag, then settings, then auto-detection.
pub fn resolve_runtime(flag: Option<&str>, settings: &Settings) -> Result<String> {
    match flag.or(settings.runtime.as_deref()) {
        Some(runtime) => Ok(runtime.to_string()),
        None => detect_runtime(),
    }
}

/// Directory lab directories are created under: the topology's own.
pub fn base_dir(topo_path: &Path) -> PathBuf {
    match topo_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub async fn handle_deploy(
    args: DeployArgs,
    settings: &Settings,
    cancel: CancellationToken,
) -> Result<()> {
    let json = args.format == OutputFormat::Json;
    let topo_path = expand_path(&args.topo);
    let topo = load_topology(&topo_path, &args)?;
    if !json {
        println!("🚀 Deploying lab '{}'", topo.name);
    }

    let runtime_bin = resolve_runtime(args.runtime.as_deref(), settings)?;
    if !args.skip_prereq {
        let prereq = check_prerequisites(&[runtime_bin.as_str(), settings.ip_binary.as_str()]);
        if !prereq.all_met() {
            println!("📋 Checking prerequisites...");
            print_prereq_report(&prereq);
            bail!("Prerequisites not met");
        }
    }

    let registry = NodeRegistry::with_builtin_kinds();
    let mut lab = Lab::from_topology(&topo, &registry, &base_dir(&topo_path))
        .context("Failed to build lab from topology")?;

    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCli::new(runtime_bin, topo.mgmt.network.clone()));
    let links: Arc<dyn LinkProvisioner> = Arc::new(VethLinker::new(settings.ip_binary.clone()));
    let netns_dir = settings.netns_path();

    if args.reconfigure {
        if !json {
            println!("♻️  Removing existing lab '{}'", lab.name);
        }
        let removed = destroy_lab(runtime.as_ref(), &NetnsLinker::new(&netns_dir), &lab.name)
            .await
            .context("Failed to remove existing lab")?;
        lab.dirs.remove()?;
        info!(lab = %lab.name, removed, "previous lab removed");
    }

    let options = DeployOptions {
        max_workers: args.max_workers.unwrap_or(settings.max_workers),
        hosts_file: (!args.no_hosts).then(|| settings.hosts_path()),
        netns_dir,
    };
    let orchestrator = Orchestrator::new(runtime, links, options).with_cancellation(cancel);

    let started = Utc::now();
    let report = orchestrator
        .deploy(&mut lab)
        .await
        .with_context(|| format!("Failed to deploy lab '{}'", lab.name))?;
    let finished = Utc::now();

    print_report(&report, args.format, started, finished)?;
    if !report.is_success() {
        bail!("{} node(s) failed post-deploy", report.failed.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DeployArgs,
    }

    fn parse(argv: &[&str]) -> DeployArgs {
        Harness::try_parse_from(std::iter::once("deploy").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_overrides_apply_to_topology() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lab.yml");
        std::fs::write(&path, "name: lab\ntopology:\n  nodes: {}\n").unwrap();

        let args = parse(&["-t", "lab.yml", "--network", "mgmt", "-4", "10.0.0.0/24"]);
        let topo = load_topology(&path, &args).unwrap();
        assert_eq!(topo.mgmt.network, "mgmt");
        assert_eq!(topo.mgmt.ipv4_subnet.unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(
            topo.mgmt.ipv6_subnet.unwrap().to_string(),
            "2001:172:20:20::/64"
        );
    }

    #[test]
    fn test_invalid_subnet_is_rejected() {
        let result = Harness::try_parse_from(["deploy", "-t", "lab.yml", "-4", "10.0.0.0/33"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_runtime_prefers_flag() {
        let settings = Settings {
            runtime: Some("podman".to_string()),
            ..Settings::default()
        };
        assert_eq!(resolve_runtime(Some("docker"), &settings).unwrap(), "docker");
        assert_eq!(resolve_runtime(None, &settings).unwrap(), "podman");
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir(Path::new("lab.yml")), PathBuf::from("."));
        assert_eq!(base_dir(Path::new("/srv/labs/lab.yml")), PathBuf::from("/srv/labs"));
    }
}
