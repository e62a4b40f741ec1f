//! Node configuration with TOML file support.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use peerlink_network::{ConnectTarget, ListenAddr, RegistryConfig};
use peerlink_protocol::NetKind;

use crate::logging::LogFormat;
use crate::NodeError;

/// A node to register against while this node knows no public peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapNode {
    /// IP literal or host name.
    pub ip: String,
    pub port: u16,
}

impl BootstrapNode {
    pub fn target(&self) -> ConnectTarget {
        match self.ip.parse::<IpAddr>() {
            Ok(ip) => ConnectTarget::Addr(SocketAddr::new(ip, self.port)),
            Err(_) => ConnectTarget::Host(self.ip.clone(), self.port),
        }
    }
}

/// Configuration for a peerlink node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network this node belongs to; part of the advertised version.
    #[serde(default)]
    pub net: NetKind,

    /// Unix domain socket for local clients. Empty disables it.
    #[serde(default = "default_unix_domain_path")]
    pub unix_domain_path: PathBuf,

    /// Directory holding the height database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory holding the node key.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,

    #[serde(default)]
    pub sign_fee: u64,

    #[serde(default)]
    pub package_fee: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Public nodes accept registrations and relay for their sub-nodes.
    #[serde(default)]
    pub is_public_node: bool,

    /// Seconds between refresh rounds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Address advertised to peers as this node's local address.
    #[serde(default = "default_local_ip")]
    pub local_ip: IpAddr,

    #[serde(default = "default_listen_ip")]
    pub listen_ip: IpAddr,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Number of dispatch workers.
    #[serde(default = "default_work_threads")]
    pub work_threads: usize,

    #[serde(default)]
    pub bootstrap_nodes: Vec<BootstrapNode>,

    /// Whether to serve the diagnostic HTTP endpoint.
    #[serde(default = "default_true")]
    pub rpc_enabled: bool,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,

    /// Connections silent for this long are dropped by the reaper.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_unix_domain_path() -> PathBuf {
    PathBuf::from("/tmp/peerlink.socket")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("./cert")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_local_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_listen_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_listen_port() -> u16 {
    11187
}

fn default_work_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_rpc_port() -> u16 {
    8080
}

fn default_reap_interval_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    600
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.work_threads == 0 {
            return Err(NodeError::Config("work_threads must be at least 1".into()));
        }
        if self.refresh_interval_secs == 0 || self.reap_interval_secs == 0 {
            return Err(NodeError::Config("intervals must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn tcp_listen_addr(&self) -> ListenAddr {
        ListenAddr::Tcp(SocketAddr::new(self.listen_ip, self.listen_port))
    }

    pub fn unix_listen_addr(&self) -> Option<ListenAddr> {
        if self.unix_domain_path.as_os_str().is_empty() {
            None
        } else {
            Some(ListenAddr::Unix(self.unix_domain_path.clone()))
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            reap_interval: Duration::from_secs(self.reap_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            ..RegistryConfig::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            net: NetKind::default(),
            unix_domain_path: default_unix_domain_path(),
            db_path: default_db_path(),
            cert_path: default_cert_path(),
            sign_fee: 0,
            package_fee: 0,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            is_public_node: false,
            refresh_interval_secs: default_refresh_interval_secs(),
            local_ip: default_local_ip(),
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            work_threads: default_work_threads(),
            bootstrap_nodes: Vec::new(),
            rpc_enabled: default_true(),
            rpc_port: default_rpc_port(),
            reap_interval_secs: default_reap_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}
