//! Startup configuration rendering.
//!
//! Templates are tera documents rendered against the node's [`NodeConfig`]
//! (every field at the top level) plus the management network under `mgmt`.

use std::fs;
use std::path::Path;

use snafu::ResultExt;
use tera::{Context, Tera};
use tracing::debug;

use crate::error::{ReadFileSnafu, RenderSnafu, Result, WriteFileSnafu};
use crate::types::{MgmtNet, NodeConfig};

impl NodeConfig {
    pub fn render_config(&self, template: &str, mgmt: Option<&MgmtNet>) -> Result<String> {
        let node = self.short_name.as_str();
        let mut ctx = Context::from_serialize(self).context(RenderSnafu { node })?;
        ctx.insert("mgmt_ipv4_gw", &mgmt.and_then(MgmtNet::ipv4_gateway));
        if let Some(mgmt) = mgmt {
            ctx.insert("mgmt", mgmt);
        }
        Tera::one_off(template, &ctx, false).context(RenderSnafu { node })
    }

    /// Render `template` and overwrite `dst` with the result.
    pub fn generate_config(
        &self,
        dst: &Path,
        template: &str,
        mgmt: Option<&MgmtNet>,
    ) -> Result<()> {
        let rendered = self.render_config(template, mgmt)?;
        debug!(node = %self.short_name, path = %dst.display(), "writing startup config");
        fs::write(dst, rendered).context(WriteFileSnafu { path: dst })
    }

    /// User supplied startup template when set, `default` otherwise.
    pub fn startup_template(&self, default: &str) -> Result<String> {
        match &self.startup_config {
            Some(path) => fs::read_to_string(path).context(ReadFileSnafu { path }),
            None => Ok(default.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeConfig {
        NodeConfig {
            short_name: "r1".to_string(),
            mgmt_ipv4: Some("172.20.20.5/24".parse().unwrap()),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn test_render_uses_node_fields() {
        let out = node()
            .render_config(
                "hostname {{ short_name }}\n{% if mgmt_ipv4 %}ip {{ mgmt_ipv4 }}{% endif %}",
                None,
            )
            .unwrap();
        assert_eq!(out, "hostname r1\nip 172.20.20.5/24");
    }

    #[test]
    fn test_render_exposes_mgmt_network() {
        let mgmt = MgmtNet::default();
        let out = node()
            .render_config("{{ mgmt.network }} via {{ mgmt_ipv4_gw }}", Some(&mgmt))
            .unwrap();
        assert_eq!(out, "netlab via 172.20.20.1");
    }

    #[test]
    fn test_render_reports_template_errors() {
        assert!(node().render_config("{% if %}", None).is_err());
    }

    #[test]
    fn test_startup_template_prefers_user_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r1.cfg");
        fs::write(&path, "custom {{ short_name }}").unwrap();

        let mut cfg = node();
        assert_eq!(cfg.startup_template("builtin").unwrap(), "builtin");
        cfg.startup_config = Some(path);
        assert_eq!(cfg.startup_template("builtin").unwrap(), "custom {{ short_name }}");
    }
}
