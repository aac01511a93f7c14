//! Test support: an in-memory recording container host

// Each test binary compiles its own copy and uses a different slice of it.
#![allow(dead_code)]

use async_trait::async_trait;
use idlegate::core::{Core, CoreOptions};
use idlegate::host::{ContainerInfo, ContainerStats, Host, HostInfo, ListOptions, NetworkCounters};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// A call the fake host observed, with the time it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    Stop(String),
}

struct Inner {
    containers: HashMap<String, ContainerInfo>,
    stats: HashMap<String, ContainerStats>,
    calls: Vec<(Call, Instant)>,
}

/// Fake [`Host`] backed by an in-memory container table. `start`/`stop` flip
/// the container's running flag and are recorded in arrival order.
pub struct RecordingHost {
    inner: Mutex<Inner>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                containers: HashMap::new(),
                stats: HashMap::new(),
                calls: Vec::new(),
            }),
        })
    }

    pub fn add_container(&self, ct: ContainerInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner.containers.insert(ct.id.clone(), ct);
    }

    pub fn set_running(&self, id: &str, running: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ct) = inner.containers.get_mut(id) {
            ct.running = running;
        }
    }

    pub fn set_stats(&self, id: &str, pids: u64, rx: u64, tx: u64) {
        let mut inner = self.inner.lock().unwrap();
        let mut networks = HashMap::new();
        networks.insert("eth0".to_string(), NetworkCounters { rx_bytes: rx, tx_bytes: tx });
        inner
            .stats
            .insert(id.to_string(), ContainerStats { pids, networks });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Time elapsed between two recorded calls.
    pub fn gap_between(&self, first: &Call, second: &Call) -> Option<Duration> {
        let inner = self.inner.lock().unwrap();
        let at = |wanted: &Call| {
            inner
                .calls
                .iter()
                .find(|(call, _)| call == wanted)
                .map(|(_, when)| *when)
        };
        Some(at(second)?.duration_since(at(first)?))
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(call, _)| call == wanted)
            .count()
    }
}

/// Match a docker-style label filter expression: `key` (presence) or
/// `key=value` (exact).
fn matches_label(ct: &ContainerInfo, expr: &str) -> bool {
    match expr.split_once('=') {
        Some((key, value)) => ct.labels.get(key).map(String::as_str) == Some(value),
        None => ct.labels.contains_key(expr),
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn list(&self, opts: ListOptions) -> anyhow::Result<Vec<ContainerInfo>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .containers
            .values()
            .filter(|ct| opts.include_stopped || ct.running)
            .filter(|ct| opts.label.as_deref().map_or(true, |expr| matches_label(ct, expr)))
            .cloned()
            .collect())
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((Call::Start(id.to_string()), Instant::now()));
        match inner.containers.get_mut(id) {
            Some(ct) => {
                ct.running = true;
                Ok(())
            }
            None => anyhow::bail!("no such container: {}", id),
        }
    }

    async fn stop(&self, id: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push((Call::Stop(id.to_string()), Instant::now()));
        if let Some(ct) = inner.containers.get_mut(id) {
            ct.running = false;
        }
        Ok(())
    }

    async fn stats(&self, id: &str) -> anyhow::Result<ContainerStats> {
        let inner = self.inner.lock().unwrap();
        match inner.stats.get(id) {
            Some(stats) => Ok(stats.clone()),
            None => anyhow::bail!("no stats recorded for {}", id),
        }
    }

    async fn info(&self) -> anyhow::Result<HostInfo> {
        Ok(HostInfo {
            name: "fakehost".to_string(),
            version: "0.0-test".to_string(),
        })
    }

    async fn close(&self) {}
}

/// Build a container carrying the `lazyload` marker plus the given sublabels
/// (`("hosts", "app1.example")` becomes `lazyload.hosts=app1.example`).
pub fn lazy_container(id: &str, name: &str, sublabels: &[(&str, &str)]) -> ContainerInfo {
    let mut labels: HashMap<String, String> = sublabels
        .iter()
        .map(|(k, v)| (format!("lazyload.{}", k), v.to_string()))
        .collect();
    labels.insert("lazyload".to_string(), String::new());
    plain_container(id, name, labels)
}

/// Build a container with exactly the given labels (no lazy marker added).
pub fn labeled_container(id: &str, name: &str, labels: &[(&str, &str)]) -> ContainerInfo {
    plain_container(
        id,
        name,
        labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn plain_container(id: &str, name: &str, labels: HashMap<String, String>) -> ContainerInfo {
    ContainerInfo {
        id: id.to_string(),
        names: vec![format!("/{}", name)],
        image: format!("{}:latest", name),
        running: false,
        labels,
    }
}

/// Controller options tuned for fast tests: long poll interval (ticks are
/// driven manually through `poll()`), short default stop delay.
pub fn test_options() -> CoreOptions {
    CoreOptions {
        label_prefix: "lazyload".to_string(),
        stop_delay: Duration::from_millis(200),
        poll_freq: Duration::from_secs(3600),
        timeout: Duration::from_secs(5),
    }
}

pub async fn new_core(host: Arc<RecordingHost>) -> Arc<Core> {
    Core::connect(host, test_options())
        .await
        .expect("core construction against the fake host")
}
