//! # Movement Client Library
//!
//! The predicting half of the position sync loop. The local player moves the
//! moment input is sampled; the server's snapshots arrive later and correct
//! the prediction.
//!
//! ## Sample loop
//!
//! Twenty times a second the [`input::InputSampler`] reads the injected
//! [`input::ControlSource`] into a sequenced sample. The sample is applied to
//! the predicted pose right away through the shared movement function, kept
//! in the [`pending::PendingQueue`], and sent to the server.
//!
//! ## Reconciliation
//!
//! Each snapshot carries the highest sample sequence the server has applied
//! for us. [`game::ClientGameState::apply_server_snapshot`] drops the pending
//! samples up to that sequence, takes the server's pose as the new base and
//! replays whatever is still pending. Because both sides run the same
//! movement code with the same constants, a clean replay lands exactly where
//! the server will end up.
//!
//! Remote players are never predicted. The last few snapshots are kept in a
//! [`snapshot_buffer::SnapshotBuffer`] for smoothing them.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::input::ScriptedControls;
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("127.0.0.1:8080".parse()?);
//!     let controls = Box::new(ScriptedControls::new(None));
//!     let mut client = Client::new(config, controls).await?;
//!     client.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod input;
pub mod network;
pub mod pending;
pub mod snapshot_buffer;
pub mod stats;
