//! peerlink daemon: entry point for running a peerlink node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use peerlink_crypto::KeyIdentity;
use peerlink_node::{init_logging, BootstrapNode, LogFormat, NodeConfig, PeerNode};
use peerlink_protocol::NetKind;
use peerlink_rpc::DiagnosticServer;
use peerlink_store_lmdb::LmdbHeightStore;

#[derive(Parser)]
#[command(name = "peerlink-daemon", about = "peerlink overlay node daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "PEERLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Network: "primary", "test", or "dev".
    #[arg(long, value_enum, env = "PEERLINK_NET")]
    net: Option<NetArg>,

    /// TCP port for peer connections.
    #[arg(long, env = "PEERLINK_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Run as a public node that accepts registrations.
    #[arg(long, env = "PEERLINK_PUBLIC")]
    public: bool,

    /// Bootstrap nodes (comma-separated: "1.2.3.4:11187,seed.example:11187").
    #[arg(long, env = "PEERLINK_BOOTSTRAP", value_delimiter = ',', value_parser = parse_bootstrap)]
    bootstrap: Vec<BootstrapNode>,

    /// Number of dispatch workers.
    #[arg(long, env = "PEERLINK_WORK_THREADS")]
    work_threads: Option<usize>,

    /// Diagnostic endpoint port.
    #[arg(long, env = "PEERLINK_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Disable the diagnostic endpoint.
    #[arg(long, env = "PEERLINK_DISABLE_RPC")]
    disable_rpc: bool,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "PEERLINK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, env = "PEERLINK_LOG_FORMAT")]
    log_format: Option<FormatArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node.
    Run,
}

#[derive(Clone, Copy, ValueEnum)]
enum NetArg {
    Primary,
    Test,
    Dev,
}

impl From<NetArg> for NetKind {
    fn from(net: NetArg) -> Self {
        match net {
            NetArg::Primary => NetKind::Primary,
            NetArg::Test => NetKind::Test,
            NetArg::Dev => NetKind::Dev,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Human,
    Json,
}

impl From<FormatArg> for LogFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Human => LogFormat::Human,
            FormatArg::Json => LogFormat::Json,
        }
    }
}

fn parse_bootstrap(raw: &str) -> Result<BootstrapNode, String> {
    let (ip, port) = raw
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| format!("expected host:port, got {raw:?}"))?;
    let port = port
        .parse()
        .map_err(|e| format!("bad port in {raw:?}: {e}"))?;
    if ip.is_empty() {
        return Err(format!("missing host in {raw:?}"));
    }
    Ok(BootstrapNode {
        ip: ip.to_string(),
        port,
    })
}

impl Cli {
    /// File config (or defaults) with every flag that was given applied on top.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(net) = self.net {
            config.net = net.into();
        }
        if let Some(port) = self.listen_port {
            config.listen_port = port;
        }
        if self.public {
            config.is_public_node = true;
        }
        if !self.bootstrap.is_empty() {
            config.bootstrap_nodes = self.bootstrap.clone();
        }
        if let Some(threads) = self.work_threads {
            config.work_threads = threads;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if self.disable_rpc {
            config.rpc_enabled = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.log_format = format.into();
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let identity = KeyIdentity::load_or_generate(&config.cert_path)
        .with_context(|| format!("loading node key from {}", config.cert_path.display()))?;
    let store = LmdbHeightStore::open(&config.db_path)
        .with_context(|| format!("opening height database at {}", config.db_path.display()))?;

    let rpc = config.rpc_enabled.then_some(config.rpc_port);
    let node = Arc::new(PeerNode::new(config, Arc::new(identity), Arc::new(store))?);
    let bound = node.start().await?;
    for addr in &bound {
        tracing::info!(%addr, "listening");
    }

    let shutdown = node.shutdown_controller().clone();
    let server = rpc.map(|port| {
        tokio::spawn(DiagnosticServer::serve(
            port,
            Arc::clone(&node),
            shutdown.subscribe(),
        ))
    });

    shutdown.wait_for_signal().await;
    tracing::info!("shutdown signal received, stopping node");
    if let Err(e) = node.stop().await {
        tracing::warn!(error = %e, "node did not stop cleanly");
    }
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "diagnostic endpoint failed"),
            Err(e) => tracing::error!(error = %e, "diagnostic endpoint task panicked"),
        }
    }
    tracing::info!("peerlink daemon exited cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;
    init_logging(config.log_format, &config.log_level)?;

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Run => {
                let rpc = if config.rpc_enabled {
                    config.rpc_port.to_string()
                } else {
                    "off".into()
                };
                tracing::info!(
                    net = ?config.net,
                    port = config.listen_port,
                    public = config.is_public_node,
                    %rpc,
                    "starting peerlink node"
                );
                run(config).await
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_parses_host_and_port() {
        let node = parse_bootstrap("10.0.0.2:11187").unwrap();
        assert_eq!(node.ip, "10.0.0.2");
        assert_eq!(node.port, 11187);
        assert!(parse_bootstrap("seed.example:1").is_ok());
        assert!(parse_bootstrap("noport").is_err());
        assert!(parse_bootstrap(":11187").is_err());
        assert!(parse_bootstrap("host:notaport").is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "peerlink-daemon",
            "--public",
            "--listen-port",
            "12000",
            "--bootstrap",
            "1.2.3.4:1,5.6.7.8:2",
            "--log-format",
            "json",
            "--net",
            "test",
            "node",
            "run",
        ]);
        let config = cli.node_config().unwrap();
        assert!(config.is_public_node);
        assert_eq!(config.listen_port, 12000);
        assert_eq!(config.bootstrap_nodes.len(), 2);
        assert_eq!(config.bootstrap_nodes[1].port, 2);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.net, NetKind::Test);
        assert_eq!(config.work_threads, NodeConfig::default().work_threads);
    }

    #[test]
    fn rejects_zero_workers() {
        let cli = Cli::parse_from(["peerlink-daemon", "--work-threads", "0", "node", "run"]);
        assert!(cli.node_config().is_err());
    }
}
