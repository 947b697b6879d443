//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use upstream_sync::config::{AppConfig, GlobalConfig, ServiceConfig};
use upstream_sync::render::TemplateRenderer;
use upstream_sync::runtime::{
    ContainerEvent, ContainerInfo, ContainerRuntime, ContainerSummary, PortBinding, RuntimeError,
};
use upstream_sync::{Reconciler, UpstreamRegistry};

pub const HOST_IP: &str = "192.168.1.10";

type EventResult = Result<ContainerEvent, RuntimeError>;

/// In-memory container runtime driven by the test.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, ContainerInfo>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    subscriptions: Mutex<VecDeque<mpsc::UnboundedReceiver<EventResult>>>,
    subscribe_count: AtomicUsize,
    inspect_delay: Mutex<Duration>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add or replace a container.
    pub fn put(&self, info: ContainerInfo) {
        self.containers
            .lock()
            .unwrap()
            .insert(info.id.clone(), info);
    }

    /// Simulate a stop: the container stays inspectable but loses its
    /// published ports and its bridge address, like Docker reports it.
    pub fn stop(&self, id: &str) {
        if let Some(info) = self.containers.lock().unwrap().get_mut(id) {
            info.running = false;
            info.ports.clear();
            for ip in info.networks.values_mut() {
                ip.clear();
            }
        }
    }

    pub fn remove(&self, id: &str) {
        self.containers.lock().unwrap().remove(id);
    }

    /// Make `inspect(id)` return an error.
    pub fn fail_inspect(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    /// Make `inspect(id)` panic.
    pub fn panic_on_inspect(&self, id: &str) {
        self.panicking.lock().unwrap().insert(id.to_string());
    }

    /// Delay `inspect` of running containers. The result reflects the
    /// container as it was when the call began.
    pub fn set_inspect_delay(&self, delay: Duration) {
        *self.inspect_delay.lock().unwrap() = delay;
    }

    /// Queue an event stream for the next subscription.
    pub fn event_channel(&self) -> mpsc::UnboundedSender<EventResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.lock().unwrap().push_back(rx);
        tx
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn events(&self) -> BoxStream<'static, EventResult> {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInfo, RuntimeError> {
        if self.panicking.lock().unwrap().contains(id) {
            panic!("inspect exploded for {id}");
        }
        if self.failing.lock().unwrap().contains(id) {
            return Err(RuntimeError::NotFound(id.to_string()));
        }
        let info = self
            .containers
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;

        let delay = *self.inspect_delay.lock().unwrap();
        if info.running && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(info)
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut all: Vec<ContainerSummary> = self
            .containers
            .lock()
            .unwrap()
            .values()
            .map(|info| ContainerSummary {
                id: info.id.clone(),
                running: info.running,
            })
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

/// Container on the default bridge with `port` published on `host_port`.
pub fn bridge_container(id: &str, name: &str, port: u16, host_port: u16) -> ContainerInfo {
    let mut info = ContainerInfo {
        id: id.into(),
        name: format!("/{name}"),
        running: true,
        network_mode: Some("bridge".into()),
        ..Default::default()
    };
    info.networks.insert("bridge".into(), "172.17.0.5".into());
    info.ports.insert(
        format!("{port}/tcp"),
        vec![PortBinding {
            host_ip: Some("0.0.0.0".into()),
            host_port: host_port.to_string(),
        }],
    );
    info
}

/// Container attached to a user-defined network.
pub fn network_container(id: &str, name: &str, network: &str, ip: &str) -> ContainerInfo {
    let mut info = ContainerInfo {
        id: id.into(),
        name: format!("/{name}"),
        running: true,
        network_mode: Some(network.into()),
        ..Default::default()
    };
    info.networks.insert(network.into(), ip.into());
    info
}

pub fn http_service(name: &str, container: &str, port: u16, upstream: &str) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        kind: "http".into(),
        container_name: container.into(),
        domain: Some(format!("{name}.example.com")),
        port: Some(port),
        upstream_name: upstream.into(),
        ..Default::default()
    }
}

pub fn stream_service(
    name: &str,
    container: &str,
    listen_port: u16,
    container_port: u16,
    upstream: &str,
) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        kind: "stream".into(),
        container_name: container.into(),
        listen_port: Some(listen_port),
        container_port: Some(container_port),
        upstream_name: upstream.into(),
        ..Default::default()
    }
}

/// Globals writing under `root`, reloading with a no-op command.
pub fn global(root: &Path) -> GlobalConfig {
    GlobalConfig {
        nginx_config_dir: root.join("conf.d").display().to_string(),
        stream_config_dir: root.join("stream.d").display().to_string(),
        nginx_reload_cmd: "true".into(),
        host_ip: Some(HOST_IP.into()),
        event_retry_secs: 1,
        rescan_delay_secs: 0,
        ..Default::default()
    }
}

pub fn app_config(root: &Path, services: Vec<ServiceConfig>) -> AppConfig {
    AppConfig {
        global: global(root),
        services,
    }
}

pub fn reconciler(runtime: Arc<FakeRuntime>, config: AppConfig) -> Arc<Reconciler> {
    let registry = Arc::new(UpstreamRegistry::new(Arc::new(TemplateRenderer::new())));
    Arc::new(Reconciler::new(runtime, config, registry))
}

/// Poll `check` every 20ms for up to 5s.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..250 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
