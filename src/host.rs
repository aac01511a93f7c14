//! Container host capability: the interface the lifecycle core drives,
//! plus its Docker implementation

use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    ListContainersOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::debug;

/// Length of the short container id used in display names
const SHORT_ID_LEN: usize = 8;

/// A container as reported by the host's listing endpoint.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Stable opaque identifier
    pub id: String,
    /// Display names (may carry a leading `/` on Docker)
    pub names: Vec<String>,
    /// Image reference
    pub image: String,
    /// Whether the container is currently running
    pub running: bool,
    /// Label map
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    /// Char-len capped id
    pub fn short_id(&self) -> &str {
        if self.id.len() <= SHORT_ID_LEN {
            &self.id
        } else {
            &self.id[..SHORT_ID_LEN]
        }
    }

    /// Human-consumable name + id, e.g. `app1 (f00dcafe)`
    pub fn display_name(&self) -> String {
        let name = self
            .names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.image);
        format!("{} ({})", name, self.short_id())
    }
}

/// Cumulative network counters for one interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// One-shot stats sample for a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    /// Number of live processes; zero means the container died underneath us
    pub pids: u64,
    /// Per-interface cumulative counters
    pub networks: HashMap<String, NetworkCounters>,
}

impl ContainerStats {
    /// Sum receive and transmit bytes across all interfaces.
    pub fn sum_network_bytes(&self) -> (u64, u64) {
        self.networks.values().fold((0, 0), |(rx, tx), counters| {
            (rx + counters.rx_bytes, tx + counters.tx_bytes)
        })
    }
}

/// Host identity, used for the boot-time liveness check.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
}

/// Listing filter passed to [`Host::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Label filter expression: `key` (presence) or `key=value`
    pub label: Option<String>,
    /// Include stopped containers in the result
    pub include_stopped: bool,
}

impl ListOptions {
    pub fn labeled(expr: impl Into<String>) -> Self {
        Self {
            label: Some(expr.into()),
            include_stopped: true,
        }
    }

    pub fn running_only(mut self) -> Self {
        self.include_stopped = false;
        self
    }
}

/// Capability over the container host. The lifecycle core only ever talks to
/// the host through this trait, which keeps the core testable against a fake.
#[async_trait]
pub trait Host: Send + Sync {
    /// List containers matching the filter.
    async fn list(&self, opts: ListOptions) -> anyhow::Result<Vec<ContainerInfo>>;

    /// Start a container. Starting an already-running container is ok.
    async fn start(&self, id: &str) -> anyhow::Result<()>;

    /// Stop a container. Stopping an already-stopped or missing container is ok.
    async fn stop(&self, id: &str) -> anyhow::Result<()>;

    /// Fetch a single stats sample.
    async fn stats(&self, id: &str) -> anyhow::Result<ContainerStats>;

    /// Host identity, for the boot-time liveness check.
    async fn info(&self) -> anyhow::Result<HostInfo>;

    /// Release the connection to the host.
    async fn close(&self);
}

/// Docker implementation of [`Host`] over the bollard client.
pub struct DockerHost {
    client: Docker,
}

impl DockerHost {
    /// Connect to the Docker daemon.
    ///
    /// Connection priority:
    /// 1. Explicit `docker_host` parameter
    /// 2. `DOCKER_HOST` environment variable
    /// 3. Platform socket defaults
    pub async fn connect(docker_host: Option<&str>) -> anyhow::Result<Self> {
        let client = if let Some(host) = docker_host {
            Self::connect_to(host)
                .with_context(|| format!("failed to connect to Docker at '{}'", host))?
        } else if let Ok(host) = std::env::var("DOCKER_HOST") {
            Self::connect_to(&host)
                .with_context(|| format!("failed to connect to Docker via DOCKER_HOST='{}'", host))?
        } else {
            Docker::connect_with_socket_defaults()
                .context("failed to connect to the Docker socket")?
        };

        client
            .ping()
            .await
            .context("Docker daemon is not responding")?;

        debug!("Connected to Docker daemon");
        Ok(Self { client })
    }

    fn connect_to(host: &str) -> anyhow::Result<Docker> {
        if let Some(socket_path) = host.strip_prefix("unix://") {
            Ok(Docker::connect_with_socket(
                socket_path,
                120,
                bollard::API_DEFAULT_VERSION,
            )?)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Ok(Docker::connect_with_http(
                host,
                120,
                bollard::API_DEFAULT_VERSION,
            )?)
        } else {
            anyhow::bail!(
                "invalid docker host format: '{}' (expected 'unix:///path' or 'tcp://host:port')",
                host
            )
        }
    }
}

#[async_trait]
impl Host for DockerHost {
    async fn list(&self, opts: ListOptions) -> anyhow::Result<Vec<ContainerInfo>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(label) = opts.label {
            filters.insert("label".to_string(), vec![label]);
        }

        let summaries = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all: opts.include_stopped,
                filters,
                ..Default::default()
            }))
            .await
            .context("failed to list containers")?;

        Ok(summaries
            .into_iter()
            .map(|s| ContainerInfo {
                id: s.id.unwrap_or_default(),
                names: s.names.unwrap_or_default(),
                image: s.image.unwrap_or_default(),
                running: s.state.as_deref() == Some("running"),
                labels: s.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        match self
            .client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!(container_id = id, "container was already started");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("failed to start container: {}", e)),
        }
    }

    async fn stop(&self, id: &str) -> anyhow::Result<()> {
        match self
            .client
            .stop_container(id, None::<StopContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                debug!(container_id = id, "container was already stopped");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(container_id = id, "container not found");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!("failed to stop container: {}", e)),
        }
    }

    async fn stats(&self, id: &str) -> anyhow::Result<ContainerStats> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };

        let mut samples = self.client.stats(id, Some(options));
        let sample = samples
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("no stats sample returned for {}", id))?
            .context("failed to read container stats")?;

        let networks = sample
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, ns)| {
                (
                    name,
                    NetworkCounters {
                        rx_bytes: ns.rx_bytes,
                        tx_bytes: ns.tx_bytes,
                    },
                )
            })
            .collect();

        Ok(ContainerStats {
            pids: sample.pids_stats.current.unwrap_or(0),
            networks,
        })
    }

    async fn info(&self) -> anyhow::Result<HostInfo> {
        let info = self
            .client
            .info()
            .await
            .context("failed to query Docker daemon info")?;

        Ok(HostInfo {
            name: info.name.unwrap_or_default(),
            version: info.server_version.unwrap_or_default(),
        })
    }

    async fn close(&self) {
        // bollard holds no persistent resources beyond the hyper client,
        // which is released when the last clone drops.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, names: &[&str], image: &str) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
            image: image.to_string(),
            running: false,
            labels: HashMap::new(),
        }
    }

    #[test]
    fn test_short_id() {
        assert_eq!(container("abc", &[], "img").short_id(), "abc");
        assert_eq!(
            container("0123456789abcdef", &[], "img").short_id(),
            "01234567"
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            container("0123456789abcdef", &["/app1"], "img").display_name(),
            "app1 (01234567)"
        );
        // Falls back to the image when the host reports no names
        assert_eq!(
            container("0123456789abcdef", &[], "nginx:latest").display_name(),
            "nginx:latest (01234567)"
        );
    }

    #[test]
    fn test_sum_network_bytes() {
        let mut stats = ContainerStats {
            pids: 1,
            networks: HashMap::new(),
        };
        stats.networks.insert(
            "eth0".to_string(),
            NetworkCounters {
                rx_bytes: 100,
                tx_bytes: 50,
            },
        );
        stats.networks.insert(
            "eth1".to_string(),
            NetworkCounters {
                rx_bytes: 10,
                tx_bytes: 5,
            },
        );
        assert_eq!(stats.sum_network_bytes(), (110, 55));

        let empty = ContainerStats::default();
        assert_eq!(empty.sum_network_bytes(), (0, 0));
    }
}
