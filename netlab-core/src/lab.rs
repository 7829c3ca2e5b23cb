//! A lab: its directory layout, initialized nodes and links.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::error::{
    CreateDirSnafu, MissingFieldSnafu, NotADirectorySnafu, RemoveDirSnafu, Result,
};
use crate::node::{Node, with_mgmt_net};
use crate::registry::NodeRegistry;
use crate::topology::Topology;
use crate::types::{
    LAB_LABEL, Link, MgmtNet, NODE_KIND_LABEL, NODE_LAB_DIR_LABEL, NODE_NAME_LABEL, NodeConfig,
};

pub const DEFAULT_PREFIX: &str = "netlab";

/// Directories shared by every node of a lab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabDirs {
    pub lab: PathBuf,
    pub ca: PathBuf,
    /// Root CA file path handed to kinds that provision certificates.
    pub ca_root: PathBuf,
}

impl LabDirs {
    #[must_use]
    pub fn new(base: &Path, name: &str, prefix: &str) -> Self {
        let dir_name = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}-{name}")
        };
        let lab = base.join(dir_name);
        let ca = lab.join("ca");
        let ca_root = ca.join("root").join("root-ca.pem");
        Self { lab, ca, ca_root }
    }

    #[must_use]
    pub fn node_dir(&self, node: &str) -> PathBuf {
        self.lab.join(node)
    }

    /// Create the lab and CA directories. Returns whether the lab directory
    /// was newly created.
    pub fn create(&self) -> Result<bool> {
        let created = create_directory(&self.lab)?;
        let ca_root_dir = self.ca_root.parent().unwrap_or(self.ca.as_path());
        create_directory(ca_root_dir)?;
        Ok(created)
    }

    /// Remove the lab directory tree; a missing directory is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.lab) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.context(RemoveDirSnafu { path: &self.lab }),
        }
    }
}

fn create_directory(path: &Path) -> Result<bool> {
    if path.exists() {
        ensure!(path.is_dir(), NotADirectorySnafu { path });
        return Ok(false);
    }
    fs::create_dir_all(path).context(CreateDirSnafu { path })?;
    Ok(true)
}

pub struct Lab {
    pub name: String,
    pub prefix: String,
    pub dirs: LabDirs,
    pub mgmt: MgmtNet,
    pub nodes: BTreeMap<String, Box<dyn Node>>,
    pub links: Vec<Link>,
}

impl Lab {
    /// Build and initialize every node of `topo`, with lab directories under
    /// `base_dir`.
    pub fn from_topology(
        topo: &Topology,
        registry: &NodeRegistry,
        base_dir: &Path,
    ) -> Result<Self> {
        topo.validate()?;
        let prefix = topo.prefix.as_deref().unwrap_or(DEFAULT_PREFIX).to_string();
        let dirs = LabDirs::new(base_dir, &topo.name, &prefix);

        let mut nodes: BTreeMap<String, Box<dyn Node>> = BTreeMap::new();
        for name in topo.topology.nodes.keys() {
            let def = topo.resolved_node(name).unwrap_or_default();
            let kind = def.kind.clone().unwrap_or_default();
            let mut node = registry.new_node(&kind)?;

            let long_name = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}-{}-{name}", topo.name)
            };
            let lab_dir = dirs.node_dir(name);

            let mut labels = def.labels;
            labels.insert(LAB_LABEL.to_string(), topo.name.clone());
            labels.insert(NODE_NAME_LABEL.to_string(), name.clone());
            labels.insert(NODE_KIND_LABEL.to_string(), kind.clone());
            labels.insert(
                NODE_LAB_DIR_LABEL.to_string(),
                lab_dir.display().to_string(),
            );

            let cfg = NodeConfig {
                short_name: name.clone(),
                long_name,
                kind,
                image: def.image.unwrap_or_default(),
                cmd: def.cmd.unwrap_or_default(),
                env: def.env,
                binds: def.binds,
                labels,
                lab_dir,
                network_mode: def.network_mode.unwrap_or_default(),
                mgmt_network: topo.mgmt.network.clone(),
                startup_config: def.startup_config,
                ..NodeConfig::default()
            };
            ensure!(
                !cfg.image.is_empty(),
                MissingFieldSnafu { node: name.as_str(), field: "image" }
            );
            node.init(cfg, &[with_mgmt_net(topo.mgmt.clone())])?;
            debug!(node = %name, kind = %node.config().kind, "node initialized");
            nodes.insert(name.clone(), node);
        }

        let mut links = topo.links()?;
        for link in &mut links {
            link.deferred = [&link.a.node, &link.b.node]
                .iter()
                .any(|n| nodes.get(*n).is_some_and(|node| node.restarts_on_post_deploy()));
        }

        Ok(Self {
            name: topo.name.clone(),
            prefix,
            dirs,
            mgmt: topo.mgmt.clone(),
            nodes,
            links,
        })
    }
}
