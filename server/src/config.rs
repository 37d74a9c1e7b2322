//! Relay configuration.
//!
//! The `server` binary fills this from its command line; tests build it from
//! [`ServerConfig::default`] and override what they need.

use shared::{ARENA_HEIGHT, ARENA_WIDTH};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Maximum number of concurrent connections
    pub max_clients: usize,
    /// Delay between a match resolving and its session being discarded
    pub grace_delay: Duration,
    /// Pair the first two lobby players as soon as they are waiting
    pub auto_start: bool,
    /// Dimensions of the empty board pushed when a lobby match starts
    pub arena_width: usize,
    pub arena_height: usize,
    /// Append finished matches to this file as JSON lines
    pub record_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".to_string(),
            max_clients: 256,
            grace_delay: Duration::from_secs(5),
            auto_start: false,
            arena_width: ARENA_WIDTH,
            arena_height: ARENA_HEIGHT,
            record_file: None,
        }
    }
}
