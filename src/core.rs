//! The lifecycle controller: registry, start-on-demand, reconciler, teardown
//!
//! One async mutex guards the registry and every field of every entry. The
//! mutex is held across host `list`/`stats`/`stop` calls inside a reconcile
//! tick, but released before the admission task issues its `start` calls.
//! Entries pinned by an in-flight start are exempt from idle-stop and from
//! reconciler removal until the start task unpins them.

use crate::discovery::Discovery;
use crate::error::CoreError;
use crate::host::{ContainerInfo, Host};
use crate::labels::LabelView;
use crate::state::ManagedState;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Post-start warm-up wait for a dependency provider without a
/// `provides.delay` label.
const PROVIDER_WARMUP: Duration = Duration::from_secs(2);

/// Tunables for the controller, normally taken from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct CoreOptions {
    /// Namespace under which container sublabels are read
    pub label_prefix: String,
    /// Default idle grace period when a container has no `stopdelay` label
    pub stop_delay: Duration,
    /// Reconcile tick interval
    pub poll_freq: Duration,
    /// Per-operation deadline for host calls and admissions
    pub timeout: Duration,
}

type Registry = HashMap<String, ManagedState>;

/// The lifecycle controller. Construct with [`Core::connect`]; share via `Arc`.
pub struct Core {
    host: Arc<dyn Host>,
    discovery: Discovery,
    options: CoreOptions,
    registry: Mutex<Registry>,
    shutdown_tx: watch::Sender<bool>,
}

impl Core {
    /// Verify the host is reachable, run one reconcile pass, and spawn the
    /// background poll loop.
    pub async fn connect(host: Arc<dyn Host>, options: CoreOptions) -> anyhow::Result<Arc<Self>> {
        let host_info = host
            .info()
            .await
            .map_err(|e| anyhow::anyhow!("container host unavailable: {}", e))?;
        info!(
            host = %host_info.name,
            version = %host_info.version,
            "Connected to container host"
        );

        let discovery = Discovery::new(Arc::clone(&host), options.label_prefix.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let core = Arc::new(Self {
            host,
            discovery,
            options,
            registry: Mutex::new(HashMap::new()),
            shutdown_tx,
        });

        core.poll().await;

        let poll_core = Arc::clone(&core);
        tokio::spawn(async move {
            poll_core.poll_loop(shutdown_rx).await;
        });

        Ok(core)
    }

    /// Discovery queries, shared with the status renderer.
    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Start the container serving `hostname` (and its declared dependencies),
    /// returning the registry entry immediately without waiting for the start
    /// to complete. Safe to call on every incoming request: repeated calls for
    /// a hostname whose entry already exists return that entry unchanged.
    pub async fn start_host(
        self: &Arc<Self>,
        hostname: &str,
    ) -> Result<ManagedState, CoreError> {
        let mut registry = self.registry.lock().await;

        let ct = match timeout(
            self.options.timeout,
            self.discovery.find_by_hostname(hostname),
        )
        .await
        {
            Err(_) => {
                warn!(hostname, "hostname lookup timed out");
                return Err(CoreError::HostUnavailable("lookup timed out".to_string()));
            }
            Ok(Err(e)) => {
                warn!(hostname, error = %e, "unable to search for container");
                return Err(CoreError::HostUnavailable(e.to_string()));
            }
            Ok(Ok(None)) => {
                warn!(hostname, "no lazy-managed container matches host");
                return Err(CoreError::NotFound);
            }
            Ok(Ok(Some(ct))) => ct,
        };

        if let Some(existing) = registry.get(&ct.id) {
            debug!(
                container = %existing.name(),
                "start requested but container is already tracked"
            );
            return Ok(existing.clone());
        }

        info!(hostname, container = %ct.display_name(), "starting container");
        let mut state =
            ManagedState::from_container(&ct, &self.options.label_prefix, self.options.stop_delay);
        state.pin();
        registry.insert(ct.id.clone(), state.clone());
        drop(registry);

        let core = Arc::clone(self);
        let needs = state.needs().to_vec();
        tokio::spawn(async move {
            match timeout(core.options.timeout, core.run_start(&ct, &needs)).await {
                Err(_) => warn!(container = %ct.display_name(), "start timed out"),
                Ok(Err(e)) => warn!(container = %ct.display_name(), error = %e, "start failed"),
                Ok(Ok(())) => {}
            }

            let mut registry = core.registry.lock().await;
            if let Some(entry) = registry.get_mut(&ct.id) {
                entry.unpin();
                entry.touch();
            }
        });

        Ok(state)
    }

    async fn run_start(&self, ct: &ContainerInfo, needs: &[String]) -> Result<(), CoreError> {
        self.start_dependencies(needs, &ct.display_name()).await?;
        self.start_container(ct).await
    }

    /// Start every provider of every declared dependency. Resolution is one
    /// level deep: providers' own `needs` labels are not followed.
    async fn start_dependencies(
        &self,
        needs: &[String],
        for_container: &str,
    ) -> Result<(), CoreError> {
        for dep in needs {
            let providers = self
                .discovery
                .find_providers_of(dep)
                .await
                .map_err(|e| CoreError::HostUnavailable(e.to_string()))?;

            if providers.is_empty() {
                warn!(
                    dep = %dep,
                    container = %for_container,
                    "no container provides dependency"
                );
                return Err(CoreError::ProviderNotFound(dep.clone()));
            }

            for provider in providers {
                if provider.running {
                    continue;
                }
                info!(
                    container = %for_container,
                    provider = %provider.display_name(),
                    "starting dependency"
                );
                self.start_container(&provider).await?;

                let labels = LabelView::new(&provider.labels, &self.options.label_prefix);
                let (delay, _) = labels.duration("provides.delay", PROVIDER_WARMUP);
                debug!(
                    provider = %provider.display_name(),
                    delay = ?delay,
                    "waiting for dependency warm-up"
                );
                tokio::time::sleep(delay).await;
            }
        }

        Ok(())
    }

    async fn start_container(&self, ct: &ContainerInfo) -> Result<(), CoreError> {
        if ct.running {
            return Ok(());
        }
        match self.host.start(&ct.id).await {
            Ok(()) => {
                info!(container = %ct.display_name(), "started container");
                Ok(())
            }
            Err(e) => {
                warn!(container = %ct.display_name(), error = %e, "error starting container");
                Err(CoreError::HostUnavailable(e.to_string()))
            }
        }
    }

    /// Stop every registered container, dropping entries as stops succeed.
    /// No dependency teardown runs; everything is being stopped anyway.
    pub async fn stop_all(&self) {
        let mut registry = self.registry.lock().await;

        info!("stopping all managed containers");
        let ids: Vec<String> = registry.keys().cloned().collect();
        for id in ids {
            let name = registry
                .get(&id)
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| id.clone());
            match self.host.stop(&id).await {
                Ok(()) => {
                    info!(container = %name, "stopped container");
                    registry.remove(&id);
                }
                Err(e) => warn!(container = %name, error = %e, "error stopping container"),
            }
        }
    }

    /// Sorted snapshot of every registry entry.
    pub async fn active_containers(&self) -> Vec<ManagedState> {
        let registry = self.registry.lock().await;
        let mut entries: Vec<ManagedState> = registry.values().cloned().collect();
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// Terminate the poll loop (between ticks) and release the host driver.
    /// In-flight start tasks are left to run out their own timeouts.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        self.host.close().await;
    }

    async fn poll_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.options.poll_freq);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the construction-time pass
        // already covered it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("poll loop terminated");
                        break;
                    }
                }
            }
        }
    }

    /// One reconcile tick: align the registry with the host's running set,
    /// then scan for idleness. Ticks are strictly serial; each is bounded by
    /// the configured operation timeout.
    pub async fn poll(&self) {
        if timeout(self.options.timeout, self.poll_inner()).await.is_err() {
            warn!("reconcile tick timed out");
        }
    }

    async fn poll_inner(&self) {
        let mut registry = self.registry.lock().await;
        self.reconcile(&mut registry).await;
        self.scan_for_idle(&mut registry).await;
    }

    /// Phase A: drop unpinned entries whose container is no longer running
    /// (cascading dependency teardown), and admit running lazy-labeled
    /// containers the registry doesn't know about.
    async fn reconcile(&self, registry: &mut Registry) {
        let running = match self.discovery.lazy_containers(false).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "error checking for containers");
                return;
            }
        };
        let running_ids: HashSet<&str> = running.iter().map(|ct| ct.id.as_str()).collect();

        let gone: Vec<String> = registry
            .iter()
            .filter(|(id, state)| !state.pinned() && !running_ids.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        for id in gone {
            if let Some(state) = registry.remove(&id) {
                info!(
                    container = %state.name(),
                    "container stopped outside the controller, dropping"
                );
                self.stop_orphaned_deps(state.needs(), registry).await;
            }
        }

        for ct in &running {
            if !registry.contains_key(&ct.id) {
                info!(container = %ct.display_name(), "discovered running container");
                registry.insert(
                    ct.id.clone(),
                    ManagedState::from_container(
                        ct,
                        &self.options.label_prefix,
                        self.options.stop_delay,
                    ),
                );
            }
        }
    }

    /// Phase B: fetch one-shot stats for every unpinned entry; bump activity
    /// on counter growth, stop containers idle past their grace period or
    /// reporting zero processes.
    async fn scan_for_idle(&self, registry: &mut Registry) {
        let ids: Vec<String> = registry.keys().cloned().collect();
        let mut expired = Vec::new();

        for id in ids {
            if registry.get(&id).map(|s| s.pinned()).unwrap_or(true) {
                continue;
            }

            let stats = match self.host.stats(&id).await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(container_id = %id, error = %e, "error checking container stats");
                    continue;
                }
            };

            let Some(state) = registry.get_mut(&id) else {
                continue;
            };

            if stats.pids == 0 {
                // Died underneath us; treat like an idle stop.
                debug!(container = %state.name(), "container reports no processes");
                expired.push(id);
                continue;
            }

            let (rx, tx) = stats.sum_network_bytes();
            if state.saw_traffic(rx, tx) {
                state.record_activity(rx, tx);
                continue;
            }

            if state.idle_for() > state.stop_delay() {
                info!(
                    container = %state.name(),
                    idle = ?state.idle_for(),
                    "found idle container"
                );
                expired.push(id);
            }
        }

        for id in expired {
            self.stop_and_remove(&id, registry).await;
        }
    }

    /// Stop one container and drop its entry, cascading dependency teardown.
    /// A stop failure leaves the entry in place so the next tick retries.
    async fn stop_and_remove(&self, id: &str, registry: &mut Registry) {
        match self.host.stop(id).await {
            Ok(()) => {
                if let Some(state) = registry.remove(id) {
                    info!(container = %state.name(), "stopped container");
                    self.stop_orphaned_deps(state.needs(), registry).await;
                }
            }
            Err(e) => warn!(container_id = %id, error = %e, "error stopping container"),
        }
    }

    /// Reference-count-style teardown: for each dependency of a removed entry,
    /// stop its providers unless some remaining entry still needs it. The
    /// actual stops are issued fire-and-forget.
    async fn stop_orphaned_deps(&self, needs: &[String], registry: &Registry) {
        for dep in needs {
            let still_needed = registry
                .values()
                .any(|state| state.needs().iter().any(|n| n == dep));
            if still_needed {
                continue;
            }

            let providers = match self.discovery.find_providers_of(dep).await {
                Ok(providers) => providers,
                Err(e) => {
                    warn!(dep = %dep, error = %e, "unable to find dependency providers");
                    continue;
                }
            };
            if providers.is_empty() {
                warn!(dep = %dep, "no provider containers found for dependency");
                continue;
            }

            for provider in providers {
                if !provider.running {
                    continue;
                }
                info!(
                    dep = %dep,
                    provider = %provider.display_name(),
                    "stopping orphaned dependency"
                );
                let host = Arc::clone(&self.host);
                let name = provider.display_name();
                let id = provider.id;
                tokio::spawn(async move {
                    if let Err(e) = host.stop(&id).await {
                        warn!(provider = %name, error = %e, "error stopping dependency");
                    }
                });
            }
        }
    }
}
