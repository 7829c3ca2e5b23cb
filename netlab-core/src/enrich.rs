//! Copy runtime-assigned addressing back into node configs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::node::Node;
use crate::types::{GenericContainer, NODE_NAME_LABEL};

/// Correlate `containers` to `nodes` by the node-name label and record each
/// match's container id and management addresses. Host-networked nodes keep
/// no addresses of their own. Applying the same input twice yields the same
/// fields.
pub fn enrich_nodes(
    containers: &[GenericContainer],
    nodes: &mut BTreeMap<String, Box<dyn Node>>,
    mgmt_net: &str,
) {
    for container in containers {
        let Some(node_name) = container.labels.get(NODE_NAME_LABEL) else {
            continue;
        };
        let Some(node) = nodes.get_mut(node_name) else {
            continue;
        };
        let cfg = node.config_mut();
        cfg.container_id = Some(container.id.clone());

        if cfg.is_host_networking() {
            debug!(node = %node_name, "host networking, no management address");
            continue;
        }
        let settings = &container.network_settings;
        if settings.set {
            cfg.mgmt_ipv4 = settings.ipv4;
            cfg.mgmt_ipv6 = settings.ipv6;
            debug!(
                node = %node_name,
                network = mgmt_net,
                ipv4 = ?cfg.mgmt_ipv4,
                ipv6 = ?cfg.mgmt_ipv6,
                "enriched node"
            );
        }
    }
}
