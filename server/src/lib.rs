//! # Match Relay Server Library
//!
//! Relay for two-player falling-block matches. The server never simulates a
//! board; each client runs its own game and streams changes to its state,
//! which the relay forwards to the opponent. The relay decides only what the
//! clients cannot decide alone: who is in which session, how many garbage
//! lines a clear is worth, and who won.
//!
//! ## Architecture
//!
//! A single task owns the [`game::MatchCoordinator`] and processes events from
//! all connections in arrival order (see [`network`]). Connection tasks only
//! decode frames and forward them; outgoing messages are serialized once and
//! pushed onto each connection's outbox.
//!
//! ## Modules
//!
//! - `client` / `client_manager`: connection identity and the live registry
//! - `lobby`: connections waiting to be paired
//! - `session`: match membership and roster broadcasts
//! - `game`: the coordinator implementing every message handler
//! - `persistence`: recording of finished matches
//! - `network`: WebSocket transport and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::persistence::LogRecorder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default(), Box::new(LogRecorder)).await?;
//!     server.run().await.map_err(|e| -> Box<dyn std::error::Error> { e })?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod lobby;
pub mod network;
pub mod persistence;
pub mod session;
pub mod utils;
