//! Node kinds shipped with netlab.

pub mod ceos;
pub mod linux;

use crate::node::Node;
use crate::registry::NodeRegistry;

pub const KIND_CEOS: &str = "ceos";
pub const KIND_LINUX: &str = "linux";

pub(crate) fn register_all(registry: &mut NodeRegistry) {
    registry.register(KIND_CEOS, || -> Box<dyn Node> { Box::new(ceos::Ceos::default()) });
    registry.register(KIND_LINUX, || -> Box<dyn Node> { Box::new(linux::Linux::default()) });
}
