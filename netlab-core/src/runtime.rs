//! Capabilities the orchestrator needs from a container engine and from the
//! virtual-wire layer. Implementations must be safe for concurrent use.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GenericContainer, Link, MgmtNet, NodeConfig};

/// `key=value` label match used when listing containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    pub value: String,
}

impl LabelFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create the management network, or reuse it when it already exists.
    async fn create_net(&self, net: &MgmtNet) -> Result<()>;

    /// Create (but do not start) the container described by `cfg`,
    /// returning its id.
    async fn create_container(&self, cfg: &NodeConfig) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()>;

    /// Forcefully remove a container, running or not.
    async fn delete_container(&self, id: &str) -> Result<()>;

    async fn list_containers(&self, filters: &[LabelFilter]) -> Result<Vec<GenericContainer>>;

    /// Path of the container's network namespace on the host.
    async fn get_ns_path(&self, id: &str) -> Result<PathBuf>;
}

#[async_trait]
pub trait LinkProvisioner: Send + Sync {
    /// Wire `link` between the namespaces of its two endpoint nodes.
    async fn create_link(&self, link: &Link, a: &NodeConfig, b: &NodeConfig) -> Result<()>;
}
