//! Label-filtered container queries over the host capability
//!
//! Discovery never mutates anything; every query is a filtered listing.
//! Result sets are sorted by display name so status rendering and iteration
//! order are deterministic.

use crate::host::{ContainerInfo, Host, ListOptions};
use crate::labels::LabelView;
use std::sync::Arc;

/// Label key fragment used for the hostname fallback match.
const ROUTER_LABEL_FRAGMENT: &str = "traefik.http.routers.";

pub struct Discovery {
    host: Arc<dyn Host>,
    label_prefix: String,
}

impl Discovery {
    pub fn new(host: Arc<dyn Host>, label_prefix: impl Into<String>) -> Self {
        Self {
            host,
            label_prefix: label_prefix.into(),
        }
    }

    pub fn label_prefix(&self) -> &str {
        &self.label_prefix
    }

    /// Every container that qualifies to be lazy-managed (running or not).
    pub async fn qualifying_containers(&self) -> anyhow::Result<Vec<ContainerInfo>> {
        self.lazy_containers(true).await
    }

    /// Every container that provides a dependency (running or not).
    pub async fn provider_containers(&self) -> anyhow::Result<Vec<ContainerInfo>> {
        let filter = format!("{}.provides", self.label_prefix);
        let mut found = self.host.list(ListOptions::labeled(filter)).await?;
        sort_by_display_name(&mut found);
        Ok(found)
    }

    /// All lazy-labeled containers, optionally restricted to running ones.
    /// This is the listing the reconciler runs against.
    pub async fn lazy_containers(
        &self,
        include_stopped: bool,
    ) -> anyhow::Result<Vec<ContainerInfo>> {
        let mut opts = ListOptions::labeled(self.label_prefix.clone());
        if !include_stopped {
            opts = opts.running_only();
        }
        let mut found = self.host.list(opts).await?;
        sort_by_display_name(&mut found);
        Ok(found)
    }

    /// Resolve a hostname to its container. An explicit `hosts` label is
    /// matched exactly against each listed hostname; containers without one
    /// fall back to a substring scan over reverse-proxy router labels, which
    /// can false-positive when one container's router rule mentions another's
    /// hostname. Deployments that care should set `hosts` explicitly.
    pub async fn find_by_hostname(
        &self,
        hostname: &str,
    ) -> anyhow::Result<Option<ContainerInfo>> {
        let candidates = self.lazy_containers(true).await?;

        for ct in candidates {
            let labels = LabelView::new(&ct.labels, &self.label_prefix);
            let (hosts, present) = labels.csv("hosts");
            if present {
                if hosts.iter().any(|h| h == hostname) {
                    return Ok(Some(ct));
                }
            } else if ct.labels.iter().any(|(key, value)| {
                key.contains(ROUTER_LABEL_FRAGMENT) && value.contains(hostname)
            }) {
                return Ok(Some(ct));
            }
        }

        Ok(None)
    }

    /// Containers whose `provides` label equals `name` (running or not).
    pub async fn find_providers_of(&self, name: &str) -> anyhow::Result<Vec<ContainerInfo>> {
        let filter = format!("{}.provides={}", self.label_prefix, name);
        let mut found = self.host.list(ListOptions::labeled(filter)).await?;
        sort_by_display_name(&mut found);
        Ok(found)
    }
}

fn sort_by_display_name(containers: &mut [ContainerInfo]) {
    containers.sort_by_key(|c| c.display_name());
}
