//! TOML configuration for the controller and front door

use crate::core::CoreOptions;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Global configuration, loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP front door listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Hostname that serves the status page instead of a splash (optional)
    pub status_host: Option<String>,

    /// Explicit Docker endpoint (`unix:///path` or `tcp://host:port`);
    /// falls back to DOCKER_HOST and platform socket defaults
    pub docker_host: Option<String>,

    /// Namespace under which container sublabels are read
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,

    /// Default idle grace period in seconds when a container has no
    /// `stopdelay` label
    #[serde(default = "default_stop_delay")]
    pub stop_delay_secs: u64,

    /// Reconcile tick interval in seconds
    #[serde(default = "default_poll_freq")]
    pub poll_freq_secs: u64,

    /// Per-operation deadline in seconds for host calls and admissions
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Stop every lazy-managed container once at boot, before the HTTP path
    /// is enabled, to guarantee a known cold-start state
    #[serde(default)]
    pub stop_at_boot: bool,

    /// Debug-level logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_label_prefix() -> String {
    "lazyload".to_string()
}

fn default_stop_delay() -> u64 {
    300
}

fn default_poll_freq() -> u64 {
    5
}

fn default_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            status_host: None,
            docker_host: None,
            label_prefix: default_label_prefix(),
            stop_delay_secs: default_stop_delay(),
            poll_freq_secs: default_poll_freq(),
            timeout_secs: default_timeout(),
            stop_at_boot: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            anyhow::bail!("invalid listen address: '{}'", self.listen);
        }
        if self.label_prefix.is_empty() {
            anyhow::bail!("label_prefix must not be empty");
        }
        if self.label_prefix.ends_with('.') {
            anyhow::bail!("label_prefix must not end with '.': sublabels are joined with one");
        }
        if self.poll_freq_secs == 0 {
            anyhow::bail!("poll_freq_secs must be greater than zero");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_secs(self.stop_delay_secs)
    }

    pub fn poll_freq(&self) -> Duration {
        Duration::from_secs(self.poll_freq_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn core_options(&self) -> CoreOptions {
        CoreOptions {
            label_prefix: self.label_prefix.clone(),
            stop_delay: self.stop_delay(),
            poll_freq: self.poll_freq(),
            timeout: self.timeout(),
        }
    }
}
