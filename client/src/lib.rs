//! # Autopilot Client Library
//!
//! Headless player for the match relay. It runs a local falling-block game,
//! steers every piece with a simple autopilot and replicates each change to
//! the relay the same way an interactive client would:
//!
//! - piece moves and shape changes as `player` fragment updates
//! - locked pieces and cleared rows as `arena` fragment updates
//! - score changes with the number of rows cleared, which the relay turns into
//!   garbage for the opponent
//! - `player-died` once a new piece cannot spawn
//!
//! Incoming garbage is pushed into the local board. The client is meant for
//! exercising a relay end to end without a browser.
//!
//! ## Modules
//!
//! ### Game Module (`game`)
//! Local board simulation and the autopilot.
//!
//! ### Network Module (`network`)
//! WebSocket connection, session setup and the tick loop.

pub mod game;
pub mod network;
