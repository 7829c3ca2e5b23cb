//! Core of netlab: node kinds, lab model and the deployment orchestrator.
//!
//! Container engines and link wiring are reached only through the
//! [`ContainerRuntime`] and [`LinkProvisioner`] traits, so the whole deploy
//! pipeline runs against in-memory fakes in tests.

pub mod enrich;
pub mod error;
pub mod hosts;
pub mod kinds;
pub mod lab;
pub mod mac;
pub mod netns;
pub mod node;
pub mod orchestrator;
pub mod registry;
pub mod runtime;
pub mod template;
pub mod topology;
pub mod types;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
pub use lab::{Lab, LabDirs};
pub use mac::MacAddr;
pub use netns::NetnsLinker;
pub use node::{DeployContext, Node, NodeOption};
pub use orchestrator::{DeployOptions, DeployReport, NodeFailure, Orchestrator, destroy_lab};
pub use registry::NodeRegistry;
pub use runtime::{ContainerRuntime, LabelFilter, LinkProvisioner};
pub use topology::Topology;
pub use types::{
    Endpoint, GenericContainer, Link, MgmtNet, NetworkSettings, NodeConfig, NodeSnapshot,
};
