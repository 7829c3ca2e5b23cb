//! Plain linux containers: no boot-time configuration, nothing to finalize.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use snafu::ResultExt;

use crate::error::{CreateDirSnafu, Result};
use crate::mac::MacAddr;
use crate::node::{DeployContext, Node, NodeOption, apply_options, create_and_start, require_fields};
use crate::types::{MgmtNet, NodeConfig, NodeSnapshot};

const OUI: &str = "aa:c1:ab";

#[derive(Debug, Default)]
pub struct Linux {
    cfg: NodeConfig,
}

#[async_trait]
impl Node for Linux {
    fn init(&mut self, cfg: NodeConfig, opts: &[NodeOption]) -> Result<()> {
        self.cfg = cfg;
        apply_options(self, opts)?;
        require_fields(&self.cfg)?;
        if self.cfg.mac_address.is_none() {
            self.cfg.mac_address = Some(MacAddr::from_seed(OUI, &self.cfg.long_name)?);
        }
        Ok(())
    }

    fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    fn config_mut(&mut self) -> &mut NodeConfig {
        &mut self.cfg
    }

    fn pre_deploy(&mut self, _lab_dir: &Path, _ca_dir: &Path, _ca_root: &Path) -> Result<()> {
        let dir = &self.cfg.lab_dir;
        fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })
    }

    async fn deploy(&mut self, ctx: &DeployContext) -> Result<()> {
        create_and_start(&mut self.cfg, ctx).await
    }

    async fn post_deploy(&mut self, _ctx: &DeployContext, _nodes: &NodeSnapshot) -> Result<()> {
        Ok(())
    }

    fn with_mgmt_net(&mut self, _net: &MgmtNet) {}
}
