//! Command line configuration for the headless client.

use clap::Parser;
use shared::{Layout, LayoutError, PENDING_QUEUE_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Headless movement client", long_about = None)]
pub struct ClientArgs {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    pub server: String,

    /// Simulate network latency in milliseconds (round trip)
    #[arg(short = 'l', long, default_value = "0")]
    pub fake_ping: u64,

    /// Simulated upstream packet loss, from 0.0 to 1.0
    #[arg(long, default_value = "0.0")]
    pub packet_loss: f64,

    /// Recent unacknowledged samples resent alongside each new one
    #[arg(short = 'r', long, default_value = "2")]
    pub redundancy: usize,

    /// Stop after this many seconds instead of running until Ctrl+C
    #[arg(short = 'd', long)]
    pub duration: Option<u64>,

    /// Seed for the scripted controls
    #[arg(long)]
    pub seed: Option<u64>,

    /// Connect attempts before giving up
    #[arg(long, default_value = "10")]
    pub connect_attempts: u32,

    /// Maze layout file; must match the server's
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Give up on the session after this many seconds without a snapshot
    #[arg(long, default_value = "5")]
    pub server_timeout: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server address {0:?}")]
    InvalidAddress(String),
    #[error("packet loss must be between 0 and 1, got {0}")]
    PacketLoss(f64),
    #[error("connect attempts must be greater than zero")]
    NoConnectAttempts,
    #[error("redundancy must be below the pending queue capacity ({max}), got {got}")]
    Redundancy { got: usize, max: usize },
    #[error("server timeout must be greater than zero")]
    NoServerTimeout,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    pub fake_ping: Duration,
    pub packet_loss: f64,
    pub redundancy: usize,
    pub duration: Option<Duration>,
    pub seed: Option<u64>,
    pub connect_attempts: u32,
    pub connect_timeout: Duration,
    pub server_timeout: Duration,
    pub layout_path: Option<PathBuf>,
}

impl ClientConfig {
    pub fn from_args(args: ClientArgs) -> Result<Self, ConfigError> {
        let server_addr = args
            .server
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(args.server.clone()))?;

        if !(0.0..=1.0).contains(&args.packet_loss) {
            return Err(ConfigError::PacketLoss(args.packet_loss));
        }
        if args.connect_attempts == 0 {
            return Err(ConfigError::NoConnectAttempts);
        }
        if args.redundancy >= PENDING_QUEUE_CAPACITY {
            return Err(ConfigError::Redundancy {
                got: args.redundancy,
                max: PENDING_QUEUE_CAPACITY,
            });
        }
        if args.server_timeout == 0 {
            return Err(ConfigError::NoServerTimeout);
        }

        Ok(Self {
            server_addr,
            fake_ping: Duration::from_millis(args.fake_ping),
            packet_loss: args.packet_loss,
            redundancy: args.redundancy,
            duration: args.duration.map(Duration::from_secs),
            seed: args.seed,
            connect_attempts: args.connect_attempts,
            connect_timeout: Duration::from_millis(500),
            server_timeout: Duration::from_secs(args.server_timeout),
            layout_path: args.layout,
        })
    }

    /// Plain configuration for `server_addr` with no simulated network faults.
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            fake_ping: Duration::ZERO,
            packet_loss: 0.0,
            redundancy: 2,
            duration: None,
            seed: None,
            connect_attempts: 10,
            connect_timeout: Duration::from_millis(500),
            server_timeout: Duration::from_secs(5),
            layout_path: None,
        }
    }

    pub fn load_layout(&self) -> Result<Layout, LayoutError> {
        Layout::load(self.layout_path.as_deref())
    }
}
