//! Point-to-point links as veth pairs, wired with iproute2.
//!
//! Both ends are created in the host namespace under temporary names, moved
//! into the nodes' named namespaces and renamed there. Named namespaces are
//! resolved by `ip` from `/run/netns`.

use async_trait::async_trait;
use netlab_core::error::{Error, Result};
use netlab_core::runtime::LinkProvisioner;
use netlab_core::types::{Endpoint, Link, NodeConfig};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct VethLinker {
    ip_binary: String,
}

impl VethLinker {
    pub fn new(ip_binary: impl Into<String>) -> Self {
        Self {
            ip_binary: ip_binary.into(),
        }
    }

    async fn ip(&self, link: &Link, args: &[String]) -> Result<()> {
        debug!(link = %link, ?args, "ip");
        let output = Command::new(&self.ip_binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| link_error(link, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(link_error(link, stderr.trim().to_string()));
        }
        Ok(())
    }
}

fn link_error(link: &Link, message: String) -> Error {
    Error::Link {
        link: link.to_string(),
        message,
    }
}

/// Interface name short enough for the kernel's 15 byte limit.
fn temp_iface_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("nl{}", &id[..12])
}

fn strings<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// `-n <netns>` prefix addressing `node`'s namespace, empty for host
/// networking.
fn namespace_args(node: &NodeConfig) -> Vec<String> {
    if node.is_host_networking() {
        Vec::new()
    } else {
        strings(["-n", node.long_name.as_str()])
    }
}

/// `ip` invocations wiring one side: move into the node's namespace, rename,
/// set MTU, bring up. Host-networked nodes keep the end in the host
/// namespace.
fn endpoint_commands(
    temp: &str,
    ep: &Endpoint,
    node: &NodeConfig,
    mtu: Option<u32>,
) -> Vec<Vec<String>> {
    let mut cmds = Vec::new();
    if !node.is_host_networking() {
        cmds.push(strings(["link", "set", temp, "netns", node.long_name.as_str()]));
    }
    let ns = namespace_args(node);

    let mut rename = ns.clone();
    rename.extend(strings(["link", "set", "dev", temp, "name", ep.iface.as_str()]));
    if let Some(mtu) = mtu {
        rename.extend(["mtu".to_string(), mtu.to_string()]);
    }
    cmds.push(rename);

    let mut up = ns;
    up.extend(strings(["link", "set", "dev", ep.iface.as_str(), "up"]));
    cmds.push(up);
    cmds
}

/// Full command plan for `link` using temporary names `temp_a` and `temp_b`.
pub fn veth_commands(
    link: &Link,
    a: &NodeConfig,
    b: &NodeConfig,
    temp_a: &str,
    temp_b: &str,
) -> Vec<Vec<String>> {
    let mut cmds = vec![strings([
        "link", "add", temp_a, "type", "veth", "peer", "name", temp_b,
    ])];
    cmds.extend(endpoint_commands(temp_a, &link.a, a, link.mtu));
    cmds.extend(endpoint_commands(temp_b, &link.b, b, link.mtu));
    cmds
}

/// Command deleting the pair after plan step `failed` errored.
///
/// Until the first `b` step has succeeded, `temp_b` is still in the host
/// namespace. After that the `a` side is complete and is deleted by its
/// final name inside its namespace. Deleting either end removes the pair.
pub fn rollback_command(link: &Link, a: &NodeConfig, temp_b: &str, failed: usize) -> Vec<String> {
    let b_start = 1 + endpoint_commands("", &link.a, a, link.mtu).len();
    if failed <= b_start {
        return strings(["link", "del", temp_b]);
    }
    let mut cmd = namespace_args(a);
    cmd.extend(strings(["link", "del", link.a.iface.as_str()]));
    cmd
}

#[async_trait]
impl LinkProvisioner for VethLinker {
    async fn create_link(&self, link: &Link, a: &NodeConfig, b: &NodeConfig) -> Result<()> {
        let temp_a = temp_iface_name();
        let temp_b = temp_iface_name();
        let cmds = veth_commands(link, a, b, &temp_a, &temp_b);

        if let Some(add) = cmds.first() {
            self.ip(link, add).await?;
        }
        for (step, cmd) in cmds.iter().enumerate().skip(1) {
            if let Err(e) = self.ip(link, cmd).await {
                let rollback = rollback_command(link, a, &temp_b, step);
                if self.ip(link, &rollback).await.is_err() {
                    warn!(link = %link, "could not remove partially created veth");
                }
                return Err(e);
            }
        }
        debug!(link = %link, "link created");
        Ok(())
    }
}
