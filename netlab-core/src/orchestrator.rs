//! Phase-ordered lab deployment.
//!
//! Phases run strictly in order with a barrier in between:
//!
//! 1. lab and CA directories
//! 2. management network
//! 3. node creation (`pre_deploy` + `deploy`), bounded
//! 4. links not touching restarting nodes, bounded
//! 5. container discovery by lab label
//! 6. enrichment
//! 7. post-deploy, one task per node, failures isolated
//! 8. deferred links
//! 9. hosts file

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use snafu::ensure;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::enrich::enrich_nodes;
use crate::error::{CancelledSnafu, Error, NoContainersSnafu, Result};
use crate::hosts::{DEFAULT_HOSTS_FILE, append_hosts_file};
use crate::lab::{Lab, LabDirs};
use crate::netns::{DEFAULT_NETNS_DIR, NetnsLinker};
use crate::node::{DeployContext, Node};
use crate::runtime::{ContainerRuntime, LabelFilter, LinkProvisioner};
use crate::types::{GenericContainer, LAB_LABEL, Link, NodeSnapshot};
use crate::workers::{run_bounded, worker_limit};

#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Upper bound on concurrent node and link workers; `0` is unlimited.
    pub max_workers: usize,
    /// Hosts file to append lab entries to, `None` to skip.
    pub hosts_file: Option<PathBuf>,
    pub netns_dir: PathBuf,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            max_workers: 0,
            hosts_file: Some(PathBuf::from(DEFAULT_HOSTS_FILE)),
            netns_dir: PathBuf::from(DEFAULT_NETNS_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFailure {
    pub node: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct DeployReport {
    pub lab: String,
    pub containers: Vec<GenericContainer>,
    /// Nodes whose post-deploy failed, sorted by name.
    pub failed: Vec<NodeFailure>,
    pub elapsed: Duration,
}

impl DeployReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    links: Arc<dyn LinkProvisioner>,
    options: DeployOptions,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        links: Arc<dyn LinkProvisioner>,
        options: DeployOptions,
    ) -> Self {
        Self {
            runtime,
            links,
            options,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deploy every node and link of `lab`.
    ///
    /// Failures in any phase other than post-deploy abort the deployment.
    /// Post-deploy failures are logged and listed in the report.
    pub async fn deploy(&self, lab: &mut Lab) -> Result<DeployReport> {
        let started = Instant::now();

        self.check_cancelled()?;
        if lab.dirs.create()? {
            info!(path = %lab.dirs.lab.display(), "created lab directory");
        }

        self.check_cancelled()?;
        info!(network = %lab.mgmt.network, "creating management network");
        self.runtime.create_net(&lab.mgmt).await?;

        let ctx = Arc::new(DeployContext {
            runtime: Arc::clone(&self.runtime),
            links: Arc::clone(&self.links),
            netns: NetnsLinker::new(&self.options.netns_dir),
            link_workers: worker_limit(self.options.max_workers, lab.links.len()),
            cancel: self.cancel.clone(),
        });

        self.create_nodes(lab, &ctx).await?;
        self.create_links(lab, false, &HashSet::new()).await?;

        self.check_cancelled()?;
        let containers = self
            .runtime
            .list_containers(&[LabelFilter::new(LAB_LABEL, &lab.name)])
            .await?;
        ensure!(!containers.is_empty(), NoContainersSnafu { lab: &lab.name });
        enrich_nodes(&containers, &mut lab.nodes, &lab.mgmt.network);

        let failed = self.post_deploy_nodes(lab, &ctx).await?;

        self.check_cancelled()?;
        let skip: HashSet<String> = failed.iter().map(|f| f.node.clone()).collect();
        self.create_links(lab, true, &skip).await?;

        self.write_hosts(&containers, &lab.mgmt.network)?;

        let elapsed = started.elapsed();
        info!(
            lab = %lab.name,
            nodes = lab.nodes.len(),
            failed = failed.len(),
            ?elapsed,
            "lab deployed"
        );
        Ok(DeployReport {
            lab: lab.name.clone(),
            containers,
            failed,
            elapsed,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        ensure!(!self.cancel.is_cancelled(), CancelledSnafu);
        Ok(())
    }

    async fn create_nodes(&self, lab: &mut Lab, ctx: &Arc<DeployContext>) -> Result<()> {
        let nodes: Vec<(String, Box<dyn Node>)> =
            std::mem::take(&mut lab.nodes).into_iter().collect();
        let limit = worker_limit(self.options.max_workers, nodes.len());
        info!(count = nodes.len(), workers = limit, "creating nodes");

        let dirs = Arc::new(lab.dirs.clone());
        let results = run_bounded(nodes, limit, |(name, mut node)| {
            let ctx = Arc::clone(ctx);
            let dirs = Arc::clone(&dirs);
            async move {
                let result = if ctx.cancel.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    tokio::select! {
                        () = ctx.cancel.cancelled() => Err(Error::Cancelled),
                        r = deploy_node(node.as_mut(), &dirs, &ctx) => r,
                    }
                };
                (name, node, result)
            }
        })
        .await?;

        let mut first_err = None;
        for (name, node, result) in results {
            match result {
                Ok(()) => debug!(node = %name, "node created"),
                Err(e) => {
                    error!(node = %name, error = %e, "failed to create node");
                    first_err.get_or_insert(e);
                }
            }
            lab.nodes.insert(name, node);
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Create the links whose `deferred` flag matches, skipping those that
    /// touch a node in `skip`.
    async fn create_links(&self, lab: &Lab, deferred: bool, skip: &HashSet<String>) -> Result<()> {
        let links: Vec<Link> = lab
            .links
            .iter()
            .filter(|l| l.deferred == deferred)
            .filter(|l| {
                let touches = skip.contains(&l.a.node) || skip.contains(&l.b.node);
                if touches {
                    warn!(link = %l, "skipping link to failed node");
                }
                !touches
            })
            .cloned()
            .collect();
        if links.is_empty() {
            return Ok(());
        }

        let limit = worker_limit(self.options.max_workers, links.len());
        info!(count = links.len(), deferred, workers = limit, "creating links");

        let snapshot = Arc::new(snapshot(&lab.nodes));
        let results = run_bounded(links, limit, |link| {
            let snapshot = Arc::clone(&snapshot);
            let provisioner = Arc::clone(&self.links);
            let cancel = self.cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let (Some(a), Some(b)) = (snapshot.get(&link.a.node), snapshot.get(&link.b.node))
                else {
                    return Err(Error::Topology {
                        message: format!("link {link} references an unknown node"),
                    });
                };
                tokio::select! {
                    () = cancel.cancelled() => Err(Error::Cancelled),
                    r = provisioner.create_link(&link, a, b) => r,
                }
            }
        })
        .await?;

        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    async fn post_deploy_nodes(
        &self,
        lab: &mut Lab,
        ctx: &Arc<DeployContext>,
    ) -> Result<Vec<NodeFailure>> {
        let snapshot = Arc::new(snapshot(&lab.nodes));
        let nodes: Vec<(String, Box<dyn Node>)> =
            std::mem::take(&mut lab.nodes).into_iter().collect();
        let limit = nodes.len();
        info!(count = limit, "running post-deploy tasks");

        let results = run_bounded(nodes, limit, |(name, mut node)| {
            let ctx = Arc::clone(ctx);
            let snapshot = Arc::clone(&snapshot);
            async move {
                let result = if ctx.cancel.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    node.post_deploy(&ctx, &snapshot).await
                };
                (name, node, result)
            }
        })
        .await?;

        let mut failed = Vec::new();
        for (name, node, result) in results {
            if let Err(e) = result {
                error!(node = %name, error = %e, "failed to run postdeploy task for node");
                failed.push(NodeFailure {
                    node: name.clone(),
                    error: e.to_string(),
                });
            }
            lab.nodes.insert(name, node);
        }
        failed.sort_by(|a, b| a.node.cmp(&b.node));
        Ok(failed)
    }

    fn write_hosts(&self, containers: &[GenericContainer], bridge: &str) -> Result<()> {
        let Some(path) = &self.options.hosts_file else {
            return Ok(());
        };
        match append_hosts_file(path, containers, bridge) {
            Ok(true) => info!(path = %path.display(), "added lab entries to hosts file"),
            Ok(false) => debug!("no hosts entries to write"),
            Err(e @ Error::MissingBridgeName) => return Err(e),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to update hosts file"),
        }
        Ok(())
    }
}

async fn deploy_node(node: &mut dyn Node, dirs: &LabDirs, ctx: &DeployContext) -> Result<()> {
    node.pre_deploy(&dirs.lab, &dirs.ca, &dirs.ca_root)?;
    node.deploy(ctx).await
}

fn snapshot(nodes: &BTreeMap<String, Box<dyn Node>>) -> NodeSnapshot {
    nodes
        .iter()
        .map(|(name, node)| (name.clone(), node.config().clone()))
        .collect()
}

/// Delete every container labelled with `lab_name` and drop their netns
/// symlinks. Returns the number of containers removed.
pub async fn destroy_lab(
    runtime: &dyn ContainerRuntime,
    netns: &NetnsLinker,
    lab_name: &str,
) -> Result<usize> {
    let containers = runtime
        .list_containers(&[LabelFilter::new(LAB_LABEL, lab_name)])
        .await?;
    for container in &containers {
        let name = container.name().unwrap_or(container.id.as_str());
        info!(container = name, "removing container");
        runtime.delete_container(&container.id).await?;
        if let Some(name) = container.name() {
            netns.unlink(name)?;
        }
    }
    Ok(containers.len())
}
