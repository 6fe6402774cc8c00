//! # Movement Server Library
//!
//! The authoritative half of the position sync loop. The server owns every
//! player's position and orientation, applies the input samples clients send,
//! and broadcasts one snapshot of all players per tick.
//!
//! ## Tick pipeline
//!
//! Receiving a packet never moves a player. Input samples are only buffered in
//! the sending client's inbox ([`client_manager`]). Once per tick
//! ([`tick::TickLoop::step`]) every inbox is drained, each player's batch is
//! sorted by sequence, stale and malformed samples are discarded, and the rest
//! are applied through the shared movement function ([`game`]). The resulting
//! snapshot is handed to the network layer for broadcast.
//!
//! ## Concurrency
//!
//! Socket reads and writes run on their own tokio tasks and talk to the main
//! loop through channels. The main loop is the only writer of the client
//! roster and the game state, so no locks are involved. Outbound packets go
//! through a bounded queue; when it is full the packet is dropped instead of
//! stalling the tick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::local(16)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
pub mod tick;
