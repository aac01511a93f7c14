//! Registry values: the controller's view of one managed container

use crate::host::ContainerInfo;
use crate::labels::LabelView;
use std::time::Duration;
use tokio::time::Instant;

/// Fallback HTTP status the splash client waits for
const DEFAULT_WAIT_CODE: u16 = 200;

/// Parsed label snapshot, taken once at admission.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    stop_delay: Duration,
    wait_for_code: u16,
    wait_for_path: String,
    wait_for_method: String,
    needs: Vec<String>,
}

impl ContainerSettings {
    pub fn from_labels(labels: &LabelView<'_>, default_stop_delay: Duration) -> Self {
        let (stop_delay, _) = labels.duration("stopdelay", default_stop_delay);
        let (code, _) = labels.int("waitforcode", i64::from(DEFAULT_WAIT_CODE));
        let (wait_for_path, _) = labels.string("waitforpath", "/");
        let (wait_for_method, _) = labels.string("waitformethod", "HEAD");
        let (needs, _) = labels.csv("needs");

        Self {
            stop_delay,
            wait_for_code: u16::try_from(code).unwrap_or(DEFAULT_WAIT_CODE),
            wait_for_path,
            wait_for_method,
            needs,
        }
    }
}

/// The registry entry for one managed container.
///
/// Every field is read and written only while the core mutex is held; callers
/// outside the core receive clones taken under that mutex.
#[derive(Debug, Clone)]
pub struct ManagedState {
    display_name: String,
    settings: ContainerSettings,
    last_rx: u64,
    last_tx: u64,
    last_activity: Instant,
    started_at: Instant,
    pinned: bool,
}

impl ManagedState {
    /// Build a fresh entry from a listed container. Counters start at zero and
    /// both timestamps at now; the entry is not pinned.
    pub fn from_container(
        ct: &ContainerInfo,
        label_prefix: &str,
        default_stop_delay: Duration,
    ) -> Self {
        let labels = LabelView::new(&ct.labels, label_prefix);
        let now = Instant::now();
        Self {
            display_name: ct.display_name(),
            settings: ContainerSettings::from_labels(&labels, default_stop_delay),
            last_rx: 0,
            last_tx: 0,
            last_activity: now,
            started_at: now,
            pinned: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.display_name
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time since admission.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time since the last observed traffic delta (or admission).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn rx(&self) -> u64 {
        self.last_rx
    }

    pub fn tx(&self) -> u64 {
        self.last_tx
    }

    pub fn stop_delay(&self) -> Duration {
        self.settings.stop_delay
    }

    pub fn wait_for_code(&self) -> u16 {
        self.settings.wait_for_code
    }

    pub fn wait_for_path(&self) -> &str {
        &self.settings.wait_for_path
    }

    pub fn wait_for_method(&self) -> &str {
        &self.settings.wait_for_method
    }

    pub fn needs(&self) -> &[String] {
        &self.settings.needs
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    /// Pin the entry: exempt from idle-stop and reconciler removal while a
    /// start is in flight.
    pub(crate) fn pin(&mut self) {
        self.pinned = true;
    }

    pub(crate) fn unpin(&mut self) {
        self.pinned = false;
    }

    /// Bump the activity clock without new counter values.
    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Record observed counters and bump the activity clock.
    pub(crate) fn record_activity(&mut self, rx: u64, tx: u64) {
        self.last_rx = rx;
        self.last_tx = tx;
        self.last_activity = Instant::now();
    }

    /// True when either counter grew past what was previously recorded.
    /// A decrease (counter reset) is not growth.
    pub(crate) fn saw_traffic(&self, rx: u64, tx: u64) -> bool {
        rx > self.last_rx || tx > self.last_tx
    }
}
