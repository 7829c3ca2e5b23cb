//! Lab data model: node configuration, links, management network and the
//! container snapshots returned by a runtime.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::error::{Error, InvalidAddressSnafu};
use crate::mac::MacAddr;

/// Label carrying the lab name on every container of a lab.
pub const LAB_LABEL: &str = "netlab";
/// Label correlating a container back to its topology node.
pub const NODE_NAME_LABEL: &str = "netlab-node-name";
pub const NODE_KIND_LABEL: &str = "netlab-node-kind";
pub const NODE_LAB_DIR_LABEL: &str = "netlab-node-lab-dir";

/// Address family marker used by [`CidrAddr`].
pub trait IpFamily: FromStr + Copy + fmt::Display {
    const MAX_PREFIX: u8;
}

impl IpFamily for Ipv4Addr {
    const MAX_PREFIX: u8 = 32;
}

impl IpFamily for Ipv6Addr {
    const MAX_PREFIX: u8 = 128;
}

/// An address together with its prefix length, written `addr/len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CidrAddr<A> {
    pub addr: A,
    pub prefix_len: u8,
}

pub type Ipv4Cidr = CidrAddr<Ipv4Addr>;
pub type Ipv6Cidr = CidrAddr<Ipv6Addr>;

impl<A: IpFamily> CidrAddr<A> {
    pub fn new(addr: A, prefix_len: u8) -> Result<Self, Error> {
        snafu::ensure!(
            prefix_len <= A::MAX_PREFIX,
            InvalidAddressSnafu {
                value: format!("{addr}/{prefix_len}"),
                reason: format!("prefix length exceeds {}", A::MAX_PREFIX),
            }
        );
        Ok(Self { addr, prefix_len })
    }
}

impl Ipv4Cidr {
    /// First usable host address of the subnet, the address docker assigns
    /// to the bridge by default.
    #[must_use]
    pub fn first_host(&self) -> Ipv4Addr {
        let mask = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix_len))
        };
        Ipv4Addr::from((u32::from(self.addr) & mask).wrapping_add(1))
    }
}

impl<A: fmt::Display> fmt::Display for CidrAddr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl<A: IpFamily> FromStr for CidrAddr<A> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s.split_once('/').ok_or_else(|| Error::InvalidAddress {
            value: s.to_string(),
            reason: "expected <address>/<prefix length>".to_string(),
        })?;
        let addr = addr.trim().parse::<A>().map_err(|_| Error::InvalidAddress {
            value: s.to_string(),
            reason: "malformed address".to_string(),
        })?;
        let prefix_len = len.trim().parse::<u8>().map_err(|_| Error::InvalidAddress {
            value: s.to_string(),
            reason: "malformed prefix length".to_string(),
        })?;
        Self::new(addr, prefix_len)
    }
}

impl<A: fmt::Display> Serialize for CidrAddr<A> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, A: IpFamily> Deserialize<'de> for CidrAddr<A> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Management network shared by all nodes of a lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MgmtNet {
    pub network: String,
    pub ipv4_subnet: Option<Ipv4Cidr>,
    pub ipv6_subnet: Option<Ipv6Cidr>,
    pub ipv4_gw: Option<Ipv4Addr>,
}

impl Default for MgmtNet {
    fn default() -> Self {
        Self {
            network: "netlab".to_string(),
            ipv4_subnet: Some(CidrAddr {
                addr: Ipv4Addr::new(172, 20, 20, 0),
                prefix_len: 24,
            }),
            ipv6_subnet: Some(CidrAddr {
                addr: Ipv6Addr::new(0x2001, 0x172, 0x20, 0x20, 0, 0, 0, 0),
                prefix_len: 64,
            }),
            ipv4_gw: None,
        }
    }
}

impl MgmtNet {
    /// Explicit gateway, or the first host of the IPv4 subnet.
    #[must_use]
    pub fn ipv4_gateway(&self) -> Option<Ipv4Addr> {
        self.ipv4_gw
            .or_else(|| self.ipv4_subnet.map(|subnet| subnet.first_host()))
    }
}

/// Desired and observed state of a single node.
///
/// The observed fields (`container_id` and below) stay `None` until the
/// deploy phase that populates them has completed for this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub short_name: String,
    pub long_name: String,
    pub kind: String,
    pub image: String,
    pub cmd: String,
    pub env: BTreeMap<String, String>,
    pub binds: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub mac_address: Option<MacAddr>,
    pub lab_dir: PathBuf,
    pub network_mode: String,
    pub mgmt_network: String,
    /// User supplied startup configuration template.
    pub startup_config: Option<PathBuf>,

    pub container_id: Option<String>,
    pub mgmt_ipv4: Option<Ipv4Cidr>,
    pub mgmt_ipv6: Option<Ipv6Cidr>,
    pub ns_path: Option<PathBuf>,
    /// Resolved startup-config path bind mounted into the container.
    pub res_config: Option<PathBuf>,
}

impl NodeConfig {
    #[must_use]
    pub fn is_host_networking(&self) -> bool {
        self.network_mode.eq_ignore_ascii_case("host")
    }

    /// Identifier to address the container with: the runtime id when known,
    /// the container name otherwise.
    #[must_use]
    pub fn container_ref(&self) -> &str {
        self.container_id.as_deref().unwrap_or(&self.long_name)
    }
}

/// Read-only view of every node's configuration handed to `post_deploy`.
pub type NodeSnapshot = BTreeMap<String, NodeConfig>;

/// One side of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub iface: String,
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((node, iface)) if !node.is_empty() && !iface.is_empty() => Ok(Self {
                node: node.to_string(),
                iface: iface.to_string(),
            }),
            _ => Err(Error::Topology {
                message: format!("malformed endpoint '{s}', expected <node>:<interface>"),
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.iface)
    }
}

/// Point-to-point virtual wire between two node interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
    pub mtu: Option<u32>,
    /// Created only after post-deploy, because an endpoint node recreates
    /// its network namespace while finalizing.
    pub deferred: bool,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

/// Management addressing of a discovered container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub set: bool,
    pub ipv4: Option<Ipv4Cidr>,
    pub ipv6: Option<Ipv6Cidr>,
}

/// Container as reported by a runtime listing. Never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericContainer {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub labels: HashMap<String, String>,
    pub network_settings: NetworkSettings,
}

impl GenericContainer {
    #[must_use]
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }

    /// First name without the leading path separator docker adds.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.names.first().map(|n| n.trim_start_matches('/'))
    }
}
