//! Node lifecycle contract implemented by every node kind.
//!
//! The orchestrator drives each node through
//! `init -> pre_deploy -> deploy -> post_deploy`. A node is the only writer
//! of its own [`NodeConfig`]; other nodes are visible to it only through the
//! read-only [`NodeSnapshot`] passed to `post_deploy`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use snafu::ensure;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MissingFieldSnafu, Result};
use crate::netns::NetnsLinker;
use crate::runtime::{ContainerRuntime, LinkProvisioner};
use crate::types::{MgmtNet, NodeConfig, NodeSnapshot};

/// Shared services handed to `deploy` and `post_deploy`.
pub struct DeployContext {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub links: Arc<dyn LinkProvisioner>,
    pub netns: NetnsLinker,
    /// Concurrency bound for any link creation a node performs itself.
    pub link_workers: usize,
    pub cancel: CancellationToken,
}

/// Option applied to a node during `init`.
pub type NodeOption = Box<dyn Fn(&mut dyn Node) -> Result<()> + Send + Sync>;

/// Lets the kind record the lab's management network.
#[must_use]
pub fn with_mgmt_net(net: MgmtNet) -> NodeOption {
    Box::new(move |node| {
        node.with_mgmt_net(&net);
        Ok(())
    })
}

pub fn apply_options(node: &mut dyn Node, opts: &[NodeOption]) -> Result<()> {
    for opt in opts {
        opt(&mut *node)?;
    }
    Ok(())
}

#[async_trait]
pub trait Node: Send + Sync {
    /// Take ownership of `cfg` and fill in kind defaults.
    fn init(&mut self, cfg: NodeConfig, opts: &[NodeOption]) -> Result<()>;

    fn config(&self) -> &NodeConfig;

    fn config_mut(&mut self) -> &mut NodeConfig;

    /// Write the on-disk artifacts the container expects at first boot.
    /// Must be safe to re-run against an existing lab directory.
    fn pre_deploy(&mut self, lab_dir: &Path, ca_dir: &Path, ca_root: &Path) -> Result<()>;

    async fn deploy(&mut self, ctx: &DeployContext) -> Result<()>;

    async fn post_deploy(&mut self, ctx: &DeployContext, nodes: &NodeSnapshot) -> Result<()>;

    fn with_mgmt_net(&mut self, net: &MgmtNet);

    /// Whether `post_deploy` recreates the container's network namespace.
    /// Links touching such a node are created after post-deploy.
    fn restarts_on_post_deploy(&self) -> bool {
        false
    }
}

/// Fails unless the identity fields every kind relies on are present.
pub fn require_fields(cfg: &NodeConfig) -> Result<()> {
    let node = cfg.short_name.as_str();
    ensure!(!cfg.short_name.is_empty(), MissingFieldSnafu { node, field: "short_name" });
    ensure!(!cfg.long_name.is_empty(), MissingFieldSnafu { node, field: "long_name" });
    ensure!(!cfg.image.is_empty(), MissingFieldSnafu { node, field: "image" });
    ensure!(
        !cfg.lab_dir.as_os_str().is_empty(),
        MissingFieldSnafu { node, field: "lab_dir" }
    );
    Ok(())
}

/// Create and start the node's container, then link its namespace.
pub async fn create_and_start(cfg: &mut NodeConfig, ctx: &DeployContext) -> Result<()> {
    let id = ctx.runtime.create_container(cfg).await?;
    debug!(node = %cfg.short_name, id = %id, "container created");
    cfg.container_id = Some(id);

    let id = cfg.container_ref().to_string();
    ctx.runtime.start_container(&id).await?;
    relink_namespace(cfg, ctx).await
}

/// Resolve the container's current namespace and point the node's symlink
/// at it.
pub async fn relink_namespace(cfg: &mut NodeConfig, ctx: &DeployContext) -> Result<()> {
    let ns_path = ctx.runtime.get_ns_path(cfg.container_ref()).await?;
    ctx.netns.link(&ns_path, &cfg.long_name)?;
    cfg.ns_path = Some(ns_path);
    Ok(())
}
