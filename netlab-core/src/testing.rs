//! In-memory runtime and link provisioner recording every call.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::netns::NetnsLinker;
use crate::node::DeployContext;
use crate::runtime::{ContainerRuntime, LabelFilter, LinkProvisioner};
use crate::types::{CidrAddr, GenericContainer, Link, MgmtNet, NetworkSettings, NodeConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuntimeCall {
    CreateNet(String),
    Create(String),
    Start(String),
    Stop(String, Duration),
    Delete(String),
    List(Vec<String>),
    NsPath(String),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RuntimeCall>,
    containers: Vec<GenericContainer>,
    next_pid: u32,
}

#[derive(Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<FakeState>,
    /// `(action, target)` pairs that fail when called.
    failures: Mutex<HashSet<(&'static str, String)>>,
    /// Cancelled as soon as any container is stopped.
    cancel_on_stop: Mutex<Option<CancellationToken>>,
    create_delay: Mutex<Option<Duration>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_on(&self, action: &'static str, target: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((action, target.to_string()));
    }

    pub(crate) fn cancel_on_stop(&self, token: CancellationToken) {
        *self.cancel_on_stop.lock().unwrap() = Some(token);
    }

    /// Make every `create_container` sleep for `delay` after recording.
    pub(crate) fn delay_create(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&RuntimeCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Seed a container that exists before anything was deployed.
    pub(crate) fn insert_container(&self, container: GenericContainer) {
        self.state.lock().unwrap().containers.push(container);
    }

    fn record(&self, call: RuntimeCall, action: &'static str, target: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(call);
        if self
            .failures
            .lock()
            .unwrap()
            .contains(&(action, target.to_string()))
        {
            return Err(Error::Runtime {
                action,
                target: target.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn set_state(&self, id: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.iter_mut().find(|c| c.id == id) {
            c.state = value.to_string();
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create_net(&self, net: &MgmtNet) -> Result<()> {
        self.record(RuntimeCall::CreateNet(net.network.clone()), "create_net", &net.network)
    }

    async fn create_container(&self, cfg: &NodeConfig) -> Result<String> {
        self.record(RuntimeCall::Create(cfg.long_name.clone()), "create", &cfg.short_name)?;
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        let host = u8::try_from(state.containers.len() + 2).unwrap();
        let network_settings = if cfg.is_host_networking() {
            NetworkSettings::default()
        } else {
            NetworkSettings {
                set: true,
                ipv4: Some(CidrAddr {
                    addr: Ipv4Addr::new(172, 20, 20, host),
                    prefix_len: 24,
                }),
                ipv6: Some(CidrAddr {
                    addr: Ipv6Addr::new(0x2001, 0x172, 0x20, 0x20, 0, 0, 0, u16::from(host)),
                    prefix_len: 64,
                }),
            }
        };
        let id = format!("id-{}", cfg.short_name);
        state.containers.push(GenericContainer {
            id: id.clone(),
            names: vec![format!("/{}", cfg.long_name)],
            image: cfg.image.clone(),
            state: "created".to_string(),
            labels: cfg.labels.clone().into_iter().collect(),
            network_settings,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(RuntimeCall::Start(id.to_string()), "start", id)?;
        self.set_state(id, "running");
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<()> {
        self.record(RuntimeCall::Stop(id.to_string(), timeout), "stop", id)?;
        self.set_state(id, "exited");
        if let Some(token) = self.cancel_on_stop.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok(())
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        self.record(RuntimeCall::Delete(id.to_string()), "delete", id)?;
        self.state.lock().unwrap().containers.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_containers(&self, filters: &[LabelFilter]) -> Result<Vec<GenericContainer>> {
        let keys = filters.iter().map(ToString::to_string).collect();
        self.record(RuntimeCall::List(keys), "list", "")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| {
                filters
                    .iter()
                    .all(|f| c.labels.get(&f.key).is_some_and(|v| *v == f.value))
            })
            .cloned()
            .collect())
    }

    async fn get_ns_path(&self, id: &str) -> Result<PathBuf> {
        self.record(RuntimeCall::NsPath(id.to_string()), "ns_path", id)?;
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        Ok(PathBuf::from(format!("/proc/{}/ns/net", state.next_pid)))
    }
}

#[derive(Default)]
pub(crate) struct FakeLinks {
    created: Mutex<Vec<(String, bool)>>,
    failures: Mutex<HashSet<String>>,
}

impl FakeLinks {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_on(&self, link: &str) {
        self.failures.lock().unwrap().insert(link.to_string());
    }

    /// `(link, deferred)` in creation order.
    pub(crate) fn created(&self) -> Vec<(String, bool)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl LinkProvisioner for FakeLinks {
    async fn create_link(&self, link: &Link, _a: &NodeConfig, _b: &NodeConfig) -> Result<()> {
        let name = link.to_string();
        if self.failures.lock().unwrap().contains(&name) {
            return Err(Error::Link {
                link: name,
                message: "injected failure".to_string(),
            });
        }
        self.created.lock().unwrap().push((name, link.deferred));
        Ok(())
    }
}

pub(crate) fn context(
    runtime: Arc<FakeRuntime>,
    links: Arc<FakeLinks>,
    netns_dir: &Path,
) -> DeployContext {
    DeployContext {
        runtime,
        links,
        netns: NetnsLinker::new(netns_dir),
        link_workers: 1,
        cancel: CancellationToken::new(),
    }
}
