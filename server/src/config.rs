//! Command line configuration for the server binary.
//!
//! Tick rate, movement speed and world bounds are deliberately absent: they
//! must match the client exactly and therefore live in `shared`.

use clap::Parser;
use shared::{Layout, LayoutError};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative movement server")]
pub struct ServerArgs {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,
    /// Maximum number of concurrently connected players
    #[arg(short, long, default_value = "16")]
    pub max_clients: usize,
    /// Seconds of silence before a client is dropped
    #[arg(short, long, default_value = "5")]
    pub timeout_secs: u64,
    /// Outbound packets that may wait for the socket before new ones are dropped
    #[arg(long, default_value = "1024")]
    pub outbound_queue: usize,
    /// Maze layout file; the built-in layout is used when omitted
    #[arg(short, long)]
    pub layout: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_clients: usize,
    pub client_timeout: Duration,
    pub outbound_queue: usize,
    pub layout_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let address = format!("{}:{}", args.host, args.port);
        let bind_addr = address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(address.clone()))?;

        if args.max_clients == 0 {
            return Err(ConfigError::Zero("max-clients"));
        }
        if args.timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout-secs"));
        }
        if args.outbound_queue == 0 {
            return Err(ConfigError::Zero("outbound-queue"));
        }

        Ok(Self {
            bind_addr,
            max_clients: args.max_clients,
            client_timeout: Duration::from_secs(args.timeout_secs),
            outbound_queue: args.outbound_queue,
            layout_path: args.layout,
        })
    }

    /// Configuration for tests: ephemeral localhost port, built-in layout.
    pub fn local(max_clients: usize) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_clients,
            client_timeout: Duration::from_secs(5),
            outbound_queue: 1024,
            layout_path: None,
        }
    }

    pub fn load_layout(&self) -> Result<Layout, LayoutError> {
        Layout::load(self.layout_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerConfig, ConfigError> {
        let mut argv = vec!["server"];
        argv.extend_from_slice(args);
        ServerConfig::from_args(ServerArgs::parse_from(argv))
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.max_clients, 16);
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert!(config.layout_path.is_none());
    }

    #[test]
    fn test_custom_values() {
        let config = parse(&["-H", "0.0.0.0", "-p", "9000", "-m", "4", "-t", "10"]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.max_clients, 4);
        assert_eq!(config.client_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            parse(&["-H", "not-an-ip"]),
            Err(ConfigError::InvalidAddress(_))
        ));
        assert!(matches!(parse(&["-m", "0"]), Err(ConfigError::Zero(_))));
        assert!(matches!(parse(&["-t", "0"]), Err(ConfigError::Zero(_))));
    }

    #[test]
    fn test_default_layout_loads() {
        let layout = ServerConfig::local(2).load_layout().unwrap();
        assert!(!layout.spawn_points.is_empty());
    }
}
