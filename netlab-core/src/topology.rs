//! Minimal YAML topology model.
//!
//! ```yaml
//! name: lab
//! mgmt:
//!   network: netlab
//!   ipv4_subnet: 172.20.20.0/24
//! topology:
//!   kinds:
//!     ceos:
//!       image: ceos:4.32
//!   nodes:
//!     r1: { kind: ceos }
//!     h1: { kind: linux, image: alpine:3 }
//!   links:
//!     - endpoints: ["r1:eth1", "h1:eth1"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{ResultExt, ensure};

use crate::error::{ParseTopologySnafu, ReadTopologySnafu, Result, TopologySnafu};
use crate::types::{Endpoint, Link, MgmtNet};

#[derive(Debug, Clone, Deserialize)]
pub struct Topology {
    pub name: String,
    /// Container name prefix, `netlab` when absent.
    pub prefix: Option<String>,
    #[serde(default)]
    pub mgmt: MgmtNet,
    pub topology: TopologyBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopologyBody {
    pub defaults: NodeDefinition,
    pub kinds: BTreeMap<String, NodeDefinition>,
    pub nodes: BTreeMap<String, NodeDefinition>,
    pub links: Vec<LinkDefinition>,
}

/// Node attributes; every layer (node, kind, defaults) uses the same shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeDefinition {
    pub kind: Option<String>,
    pub image: Option<String>,
    pub cmd: Option<String>,
    pub env: BTreeMap<String, String>,
    pub binds: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub network_mode: Option<String>,
    pub startup_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkDefinition {
    pub endpoints: [String; 2],
    #[serde(default)]
    pub mtu: Option<u32>,
}

impl Topology {
    /// Load and validate a topology file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).context(ReadTopologySnafu { path })?;
        let topo: Self = serde_yaml::from_str(&raw).context(ParseTopologySnafu { path })?;
        topo.validate()?;
        Ok(topo)
    }

    /// Every node needs a kind and every link must join two known nodes.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.name.is_empty(),
            TopologySnafu { message: "lab name must not be empty" }
        );
        for name in self.topology.nodes.keys() {
            ensure!(
                self.kind_of(name).is_some(),
                TopologySnafu { message: format!("node '{name}' has no kind") }
            );
        }
        self.links().map(|_| ())
    }

    /// Parsed links, not yet marked deferred.
    pub fn links(&self) -> Result<Vec<Link>> {
        self.topology
            .links
            .iter()
            .map(|def| {
                let a: Endpoint = def.endpoints[0].parse()?;
                let b: Endpoint = def.endpoints[1].parse()?;
                for ep in [&a, &b] {
                    ensure!(
                        self.topology.nodes.contains_key(&ep.node),
                        TopologySnafu {
                            message: format!("link endpoint '{ep}' references unknown node")
                        }
                    );
                }
                Ok(Link { a, b, mtu: def.mtu, deferred: false })
            })
            .collect()
    }

    /// The kind of node `name`, from the node itself or the defaults.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<&str> {
        self.topology
            .nodes
            .get(name)
            .and_then(|n| n.kind.as_deref())
            .or(self.topology.defaults.kind.as_deref())
    }

    /// Node definition with kind and default attributes folded in, the most
    /// specific layer winning.
    #[must_use]
    pub fn resolved_node(&self, name: &str) -> Option<NodeDefinition> {
        let node = self.topology.nodes.get(name)?;
        let defaults = &self.topology.defaults;
        let kind = self
            .kind_of(name)
            .and_then(|k| self.topology.kinds.get(k));

        let mut resolved = defaults.clone();
        if let Some(kind) = kind {
            resolved.overlay(kind);
        }
        resolved.overlay(node);
        resolved.kind = self.kind_of(name).map(str::to_string);
        Some(resolved)
    }
}

impl NodeDefinition {
    fn overlay(&mut self, other: &NodeDefinition) {
        fn pick<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if src.is_some() {
                dst.clone_from(src);
            }
        }
        pick(&mut self.kind, &other.kind);
        pick(&mut self.image, &other.image);
        pick(&mut self.cmd, &other.cmd);
        pick(&mut self.network_mode, &other.network_mode);
        pick(&mut self.startup_config, &other.startup_config);
        self.env
            .extend(other.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.labels
            .extend(other.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.binds.extend(other.binds.iter().cloned());
    }
}
