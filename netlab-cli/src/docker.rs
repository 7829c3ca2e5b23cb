//! `ContainerRuntime` backed by the docker (or podman) command line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use netlab_core::error::{Error, Result};
use netlab_core::runtime::{ContainerRuntime, LabelFilter};
use netlab_core::types::{
    GenericContainer, Ipv4Cidr, Ipv6Cidr, MgmtNet, NetworkSettings, NodeConfig,
};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

pub struct DockerCli {
    binary: String,
    /// Network whose addresses are reported in container listings.
    mgmt_network: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>, mgmt_network: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            mgmt_network: mgmt_network.into(),
        }
    }

    async fn run(&self, action: &'static str, target: &str, args: &[String]) -> Result<String> {
        debug!(binary = %self.binary, ?args, "running container runtime");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| runtime_error(action, target, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(runtime_error(action, target, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn runtime_error(action: &'static str, target: &str, message: String) -> Error {
    Error::Runtime {
        action,
        target: target.to_string(),
        message,
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

pub fn network_create_args(net: &MgmtNet) -> Vec<String> {
    let mut args = args(["network", "create", "--driver", "bridge"]);
    if let Some(subnet) = net.ipv4_subnet {
        args.extend(["--subnet".to_string(), subnet.to_string()]);
    }
    if let Some(gw) = net.ipv4_gw {
        args.extend(["--gateway".to_string(), gw.to_string()]);
    }
    if let Some(subnet) = net.ipv6_subnet {
        args.extend(["--ipv6".to_string(), "--subnet".to_string(), subnet.to_string()]);
    }
    args.extend([
        "--opt".to_string(),
        format!("com.docker.network.bridge.name={}", net.network),
        net.network.clone(),
    ]);
    args
}

pub fn container_create_args(cfg: &NodeConfig) -> Vec<String> {
    let mut args = args(["create", "--privileged"]);
    args.extend([
        "--name".to_string(),
        cfg.long_name.clone(),
        "--hostname".to_string(),
        cfg.short_name.clone(),
    ]);
    if cfg.is_host_networking() {
        args.extend(["--network".to_string(), "host".to_string()]);
    } else {
        if !cfg.mgmt_network.is_empty() {
            args.extend(["--network".to_string(), cfg.mgmt_network.clone()]);
        }
        if let Some(mac) = cfg.mac_address {
            args.extend(["--mac-address".to_string(), mac.to_string()]);
        }
    }
    for (key, value) in &cfg.env {
        args.extend(["--env".to_string(), format!("{key}={value}")]);
    }
    for bind in &cfg.binds {
        args.extend(["--volume".to_string(), bind.clone()]);
    }
    for (key, value) in &cfg.labels {
        args.extend(["--label".to_string(), format!("{key}={value}")]);
    }
    args.push(cfg.image.clone());
    args.extend(cfg.cmd.split_whitespace().map(str::to_string));
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectEntry {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
    network_settings: InspectNetworkSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    pid: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetworkSettings {
    #[serde(default)]
    networks: Option<HashMap<String, InspectNetwork>>,
}

#[derive(Debug, Default, Deserialize)]
struct InspectNetwork {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
    #[serde(rename = "IPPrefixLen", default)]
    ip_prefix_len: u8,
    #[serde(rename = "GlobalIPv6Address", default)]
    global_ipv6_address: String,
    #[serde(rename = "GlobalIPv6PrefixLen", default)]
    global_ipv6_prefix_len: u8,
}

impl InspectNetwork {
    fn settings(&self) -> NetworkSettings {
        let ipv4: Option<Ipv4Cidr> = (!self.ip_address.is_empty())
            .then(|| format!("{}/{}", self.ip_address, self.ip_prefix_len).parse().ok())
            .flatten();
        let ipv6: Option<Ipv6Cidr> = (!self.global_ipv6_address.is_empty())
            .then(|| {
                format!("{}/{}", self.global_ipv6_address, self.global_ipv6_prefix_len)
                    .parse()
                    .ok()
            })
            .flatten();
        NetworkSettings {
            set: ipv4.is_some() || ipv6.is_some(),
            ipv4,
            ipv6,
        }
    }
}

/// Parse `docker inspect` output, reading addresses from `network`.
pub fn parse_inspect(raw: &str, network: &str) -> Result<Vec<GenericContainer>> {
    let entries: Vec<InspectEntry> = serde_json::from_str(raw)
        .map_err(|e| runtime_error("inspect", network, e.to_string()))?;
    Ok(entries
        .into_iter()
        .map(|entry| {
            let network_settings = entry
                .network_settings
                .networks
                .as_ref()
                .and_then(|nets| nets.get(network))
                .map(InspectNetwork::settings)
                .unwrap_or_default();
            GenericContainer {
                id: entry.id,
                names: vec![entry.name],
                image: entry.config.image,
                state: entry.state.status,
                labels: entry.config.labels.unwrap_or_default(),
                network_settings,
            }
        })
        .collect())
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create_net(&self, net: &MgmtNet) -> Result<()> {
        let inspect = args(["network", "inspect", net.network.as_str()]);
        if self.run("network inspect", &net.network, &inspect).await.is_ok() {
            info!(network = %net.network, "using existing management network");
            return Ok(());
        }
        self.run("network create", &net.network, &network_create_args(net))
            .await?;
        info!(network = %net.network, "created management network");
        Ok(())
    }

    async fn create_container(&self, cfg: &NodeConfig) -> Result<String> {
        let out = self
            .run("create", &cfg.long_name, &container_create_args(cfg))
            .await?;
        Ok(out.trim().to_string())
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run("start", id, &args(["start", id])).await.map(|_| ())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        let secs = timeout.as_secs().to_string();
        self.run("stop", id, &args(["stop", "--time", secs.as_str(), id]))
            .await
            .map(|_| ())
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        self.run("delete", id, &args(["rm", "--force", "--volumes", id]))
            .await
            .map(|_| ())
    }

    async fn list_containers(&self, filters: &[LabelFilter]) -> Result<Vec<GenericContainer>> {
        let mut ps = args(["ps", "--all", "--quiet", "--no-trunc"]);
        for filter in filters {
            ps.extend(["--filter".to_string(), format!("label={filter}")]);
        }
        let out = self.run("list", "containers", &ps).await?;
        let ids: Vec<String> = out.split_whitespace().map(str::to_string).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut inspect = args(["inspect"]);
        inspect.extend(ids);
        let raw = self.run("inspect", "containers", &inspect).await?;
        parse_inspect(&raw, &self.mgmt_network)
    }

    async fn get_ns_path(&self, id: &str) -> Result<PathBuf> {
        let raw = self.run("inspect", id, &args(["inspect", id])).await?;
        let entries: Vec<InspectEntry> =
            serde_json::from_str(&raw).map_err(|e| runtime_error("inspect", id, e.to_string()))?;
        match entries.first().map(|e| e.state.pid) {
            Some(pid) if pid > 0 => Ok(PathBuf::from(format!("/proc/{pid}/ns/net"))),
            _ => Err(runtime_error("ns_path", id, "container is not running".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const INSPECT: &str = r#"[
      {
        "Id": "4f1c2b3a9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a",
        "Name": "/netlab-lab-r1",
        "State": { "Status": "running", "Pid": 4242 },
        "Config": {
          "Image": "ceos:4.32",
          "Labels": { "netlab": "lab", "netlab-node-name": "r1" }
        },
        "NetworkSettings": {
          "Networks": {
            "netlab": {
              "IPAddress": "172.20.20.2",
              "IPPrefixLen": 24,
              "GlobalIPv6Address": "2001:172:20:20::2",
              "GlobalIPv6PrefixLen": 64
            }
          }
        }
      },
      {
        "Id": "9a8b7c6d5e4f",
        "Name": "/netlab-lab-h1",
        "State": { "Status": "exited", "Pid": 0 },
        "Config": { "Image": "alpine:3", "Labels": null },
        "NetworkSettings": {
          "Networks": { "host": { "IPAddress": "", "IPPrefixLen": 0 } }
        }
      }
    ]"#;

    #[test]
    fn test_parse_inspect() {
        let containers = parse_inspect(INSPECT, "netlab").unwrap();
        assert_eq!(containers.len(), 2);

        let r1 = &containers[0];
        assert_eq!(r1.name(), Some("netlab-lab-r1"));
        assert_eq!(r1.short_id(), "4f1c2b3a9d8e");
        assert_eq!(r1.state, "running");
        assert_eq!(r1.labels["netlab-node-name"], "r1");
        assert!(r1.network_settings.set);
        assert_eq!(r1.network_settings.ipv4.unwrap().to_string(), "172.20.20.2/24");
        assert_eq!(
            r1.network_settings.ipv6.unwrap().to_string(),
            "2001:172:20:20::2/64"
        );

        let h1 = &containers[1];
        assert!(h1.labels.is_empty());
        assert_eq!(h1.network_settings, NetworkSettings::default());
    }

    #[test]
    fn test_parse_inspect_rejects_garbage() {
        assert!(parse_inspect("not json", "netlab").is_err());
    }

    #[test]
    fn test_container_create_args() {
        let cfg = NodeConfig {
            short_name: "r1".to_string(),
            long_name: "netlab-lab-r1".to_string(),
            image: "ceos:4.32".to_string(),
            cmd: "/sbin/init systemd.setenv=CEOS=1".to_string(),
            env: BTreeMap::from([("CEOS".to_string(), "1".to_string())]),
            binds: vec!["/lab/r1/flash:/mnt/flash/".to_string()],
            labels: BTreeMap::from([("netlab".to_string(), "lab".to_string())]),
            mac_address: Some("00:1c:73:aa:bb:cc".parse().unwrap()),
            mgmt_network: "netlab".to_string(),
            ..NodeConfig::default()
        };
        let args = container_create_args(&cfg);
        let joined = args.join(" ");
        assert!(joined.starts_with("create --privileged --name netlab-lab-r1 --hostname r1"));
        assert!(joined.contains("--network netlab --mac-address 00:1c:73:aa:bb:cc"));
        assert!(joined.contains("--env CEOS=1"));
        assert!(joined.contains("--volume /lab/r1/flash:/mnt/flash/"));
        assert!(joined.contains("--label netlab=lab"));
        assert!(joined.ends_with("ceos:4.32 /sbin/init systemd.setenv=CEOS=1"));
    }

    #[test]
    fn test_host_networking_skips_mac() {
        let cfg = NodeConfig {
            short_name: "h1".to_string(),
            long_name: "netlab-lab-h1".to_string(),
            image: "alpine:3".to_string(),
            network_mode: "host".to_string(),
            mac_address: Some("aa:c1:ab:00:00:01".parse().unwrap()),
            mgmt_network: "netlab".to_string(),
            ..NodeConfig::default()
        };
        let joined = container_create_args(&cfg).join(" ");
        assert!(joined.contains("--network host"));
        assert!(!joined.contains("--mac-address"));
        assert!(joined.ends_with("alpine:3"));
    }

    #[test]
    fn test_network_create_args() {
        let net = MgmtNet::default();
        let joined = network_create_args(&net).join(" ");
        assert_eq!(
            joined,
            "network create --driver bridge --subnet 172.20.20.0/24 --ipv6 --subnet \
             2001:172:20:20::/64 --opt com.docker.network.bridge.name=netlab netlab"
        );
    }
}
