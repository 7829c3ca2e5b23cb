//! Arista cEOS.
//!
//! cEOS reads its startup configuration only at boot, and that configuration
//! has to carry the management address docker assigns when the container is
//! created. The node therefore boots once with a placeholder config and is
//! reconfigured and restarted in `post_deploy`:
//!
//! 1. render the final config with the discovered address
//! 2. force-stop the container
//! 3. drop the stale netns symlink
//! 4. start the container again
//! 5. link the new namespace
//!
//! `post_deploy` must run at most once per deployment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::error::{CreateDirSnafu, Result, WriteFileSnafu};
use crate::mac::MacAddr;
use crate::node::{
    DeployContext, Node, NodeOption, apply_options, create_and_start, relink_namespace,
    require_fields,
};
use crate::types::{MgmtNet, NodeConfig, NodeSnapshot};

const OUI: &str = "00:1c:73";
const CFG_TEMPLATE: &str = include_str!("ceos.cfg");

/// Forced stop is much faster than a graceful restart and the state is
/// discarded anyway.
pub const RESTART_STOP_TIMEOUT: Duration = Duration::from_secs(1);

const CEOS_ENV: [(&str, &str); 8] = [
    ("CEOS", "1"),
    ("EOS_PLATFORM", "ceoslab"),
    ("container", "docker"),
    ("ETBA", "4"),
    ("SKIP_ZEROTOUCH_BARRIER_IN_SYSDBINIT", "1"),
    ("INTFTYPE", "eth"),
    ("MAPETH0", "1"),
    ("MGMT_INTF", "eth0"),
];

#[derive(Debug, Default)]
pub struct Ceos {
    cfg: NodeConfig,
    mgmt: Option<MgmtNet>,
}

impl Ceos {
    fn flash_dir(&self) -> PathBuf {
        self.cfg.lab_dir.join("flash")
    }

    /// `/sbin/init` with every env var passed as a systemd init parameter,
    /// in key order so the command line is stable across recreations.
    fn init_cmd(env: &BTreeMap<String, String>) -> String {
        let mut cmd = String::from("/sbin/init");
        for (k, v) in env {
            cmd.push_str(" systemd.setenv=");
            cmd.push_str(k);
            cmd.push('=');
            cmd.push_str(v);
        }
        cmd
    }

    fn write_flash_files(&mut self) -> Result<()> {
        let flash = self.flash_dir();
        fs::create_dir_all(&flash).context(CreateDirSnafu { path: &flash })?;

        let startup = flash.join("startup-config");
        if !startup.exists() {
            let template = self.cfg.startup_template(CFG_TEMPLATE)?;
            self.cfg.generate_config(&startup, &template, self.mgmt.as_ref())?;
        }
        self.cfg.res_config = Some(startup);

        // the system mac must differ from the Management0 mac
        if let Some(mac) = self.cfg.mac_address {
            let path = flash.join("system_mac_address");
            fs::write(&path, mac.system_mac().to_string()).context(WriteFileSnafu { path })?;
        }
        Ok(())
    }

    async fn reconfigure_and_restart(&mut self, ctx: &DeployContext) -> Result<()> {
        let dst = match &self.cfg.res_config {
            Some(path) => path.clone(),
            None => self.flash_dir().join("startup-config"),
        };
        let template = self.cfg.startup_template(CFG_TEMPLATE)?;
        self.cfg.generate_config(&dst, &template, self.mgmt.as_ref())?;
        self.cfg.res_config = Some(dst);

        info!(node = %self.cfg.short_name, "Restarting node");
        let id = self.cfg.container_ref().to_string();
        ctx.runtime.stop_container(&id, RESTART_STOP_TIMEOUT).await?;
        // the restarted container gets a new namespace
        ctx.netns.unlink(&self.cfg.long_name)?;
        ctx.runtime.start_container(&id).await?;
        relink_namespace(&mut self.cfg, ctx).await
    }
}

#[async_trait]
impl Node for Ceos {
    fn init(&mut self, cfg: NodeConfig, opts: &[NodeOption]) -> Result<()> {
        self.cfg = cfg;
        apply_options(self, opts)?;
        require_fields(&self.cfg)?;

        let mut env: BTreeMap<String, String> = CEOS_ENV
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        env.extend(std::mem::take(&mut self.cfg.env));
        self.cfg.cmd = Self::init_cmd(&env);
        self.cfg.env = env;

        self.cfg.mac_address = Some(MacAddr::from_seed(OUI, &self.cfg.long_name)?);

        let flash = self.flash_dir();
        self.cfg
            .binds
            .push(format!("{}:/mnt/flash/", flash.display()));
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
        fs::create_dir_all(dir).context(CreateDirSnafu { path: dir })?;
        self.write_flash_files()
    }

    async fn deploy(&mut self, ctx: &DeployContext) -> Result<()> {
        create_and_start(&mut self.cfg, ctx).await
    }

    async fn post_deploy(&mut self, ctx: &DeployContext, _nodes: &NodeSnapshot) -> Result<()> {
        debug!(node = %self.cfg.short_name, "Running postdeploy actions for Arista cEOS node");
        self.reconfigure_and_restart(ctx).await
    }

    fn with_mgmt_net(&mut self, net: &MgmtNet) {
        self.mgmt = Some(net.clone());
    }

    fn restarts_on_post_deploy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::with_mgmt_net;
    use crate::testing::{FakeLinks, FakeRuntime, RuntimeCall, context};

    fn ceos_config(lab_dir: &Path) -> NodeConfig {
        NodeConfig {
            short_name: "r1".to_string(),
            long_name: "netlab-lab-r1".to_string(),
            kind: "ceos".to_string(),
            image: "ceos:4.32".to_string(),
            lab_dir: lab_dir.join("r1"),
            env: BTreeMap::from([
                ("ETBA".to_string(), "1".to_string()),
                ("ZZ_EXTRA".to_string(), "x".to_string()),
            ]),
            ..NodeConfig::default()
        }
    }

    fn ceos_node(lab_dir: &Path) -> Ceos {
        let mut node = Ceos::default();
        node.init(ceos_config(lab_dir), &[with_mgmt_net(MgmtNet::default())])
            .unwrap();
        node
    }

    #[test]
    fn test_init_merges_env_and_builds_stable_cmd() {
        let tmp = tempfile::tempdir().unwrap();
        let node = ceos_node(tmp.path());
        let cfg = node.config();

        // user values win over kind defaults
        assert_eq!(cfg.env["ETBA"], "1");
        assert_eq!(cfg.env["CEOS"], "1");
        assert_eq!(cfg.env.len(), CEOS_ENV.len() + 1);

        assert!(cfg.cmd.starts_with("/sbin/init systemd.setenv=CEOS=1 "));
        assert!(cfg.cmd.contains(" systemd.setenv=ZZ_EXTRA=x "));
        assert!(cfg.cmd.ends_with(" systemd.setenv=container=docker"));
        assert_eq!(cfg.cmd, ceos_node(tmp.path()).config().cmd);

        assert_eq!(cfg.mac_address, ceos_node(tmp.path()).config().mac_address);
        assert!(cfg.binds[0].ends_with("r1/flash:/mnt/flash/"));
        assert!(node.mgmt.is_some());
    }

    #[test]
    fn test_init_fails_on_option_error() {
        let tmp = tempfile::tempdir().unwrap();
        let failing: NodeOption = Box::new(|_| {
            Err(crate::error::Error::Topology {
                message: "bad option".to_string(),
            })
        });
        let mut node = Ceos::default();
        assert!(node.init(ceos_config(tmp.path()), &[failing]).is_err());
    }

    #[test]
    fn test_pre_deploy_writes_flash_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut node = ceos_node(tmp.path());
        node.pre_deploy(tmp.path(), tmp.path(), tmp.path()).unwrap();
        node.pre_deploy(tmp.path(), tmp.path(), tmp.path()).unwrap();

        let flash = tmp.path().join("r1").join("flash");
        let sys_mac: MacAddr = fs::read_to_string(flash.join("system_mac_address"))
            .unwrap()
            .parse()
            .unwrap();
        let mac = node.config().mac_address.unwrap();
        assert_eq!(sys_mac, mac.system_mac());

        let placeholder = fs::read_to_string(flash.join("startup-config")).unwrap();
        assert!(placeholder.contains("hostname r1"));
        assert!(!placeholder.contains("ip address"));
        assert_eq!(node.config().res_config, Some(flash.join("startup-config")));
    }

    #[tokio::test]
    async fn test_post_deploy_renders_address_and_restarts_once() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::new();
        let ctx = context(runtime.clone(), FakeLinks::new(), &tmp.path().join("netns"));

        let mut node = ceos_node(tmp.path());
        node.pre_deploy(tmp.path(), tmp.path(), tmp.path()).unwrap();
        node.deploy(&ctx).await.unwrap();
        let first_ns = node.config().ns_path.clone().unwrap();

        // what enrichment would have filled in
        node.config_mut().mgmt_ipv4 = Some("172.20.20.9/24".parse().unwrap());
        let before = runtime.calls().len();

        node.post_deploy(&ctx, &NodeSnapshot::new()).await.unwrap();

        let rendered = fs::read_to_string(node.config().res_config.as_ref().unwrap()).unwrap();
        assert!(rendered.contains("ip address 172.20.20.9/24"));
        assert!(rendered.contains("ip route 0.0.0.0/0 172.20.20.1"));

        let protocol: Vec<_> = runtime.calls().split_off(before);
        assert_eq!(
            protocol,
            vec![
                RuntimeCall::Stop("id-r1".to_string(), RESTART_STOP_TIMEOUT),
                RuntimeCall::Start("id-r1".to_string()),
                RuntimeCall::NsPath("id-r1".to_string()),
            ]
        );

        let new_ns = node.config().ns_path.clone().unwrap();
        assert_ne!(new_ns, first_ns);
        let link = fs::read_link(ctx.netns.symlink_path("netlab-lab-r1")).unwrap();
        assert_eq!(link, new_ns);
    }

    #[tokio::test]
    async fn test_post_deploy_without_known_id_uses_container_name() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::new();
        let ctx = context(runtime.clone(), FakeLinks::new(), &tmp.path().join("netns"));

        let mut node = ceos_node(tmp.path());
        node.pre_deploy(tmp.path(), tmp.path(), tmp.path()).unwrap();
        node.post_deploy(&ctx, &NodeSnapshot::new()).await.unwrap();

        let stop = RuntimeCall::Stop("netlab-lab-r1".to_string(), RESTART_STOP_TIMEOUT);
        assert_eq!(runtime.count(|c| *c == stop), 1);
    }

    #[tokio::test]
    async fn test_post_deploy_aborts_when_stop_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = FakeRuntime::new();
        let ctx = context(runtime.clone(), FakeLinks::new(), &tmp.path().join("netns"));

        let mut node = ceos_node(tmp.path());
        node.pre_deploy(tmp.path(), tmp.path(), tmp.path()).unwrap();
        node.deploy(&ctx).await.unwrap();
        runtime.fail_on("stop", "id-r1");

        assert!(node.post_deploy(&ctx, &NodeSnapshot::new()).await.is_err());
        // no second start after the failed stop
        assert_eq!(runtime.count(|c| matches!(c, RuntimeCall::Start(_))), 1);
        // the symlink from the first boot is left in place
        assert!(fs::symlink_metadata(ctx.netns.symlink_path("netlab-lab-r1")).is_ok());
    }
}
