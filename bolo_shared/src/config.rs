//! Configuration system.
//!
//! Loads network configuration from JSON strings (file IO left to the app).
//! Every field has a default so a partial document is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::MAX_FRAME_BYTES;

/// TCP port the game listens on.
pub const GAME_PORT: u16 = 19014;

/// Root configuration shared by client and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Server listen address, e.g. `0.0.0.0:19014`.
    pub server_addr: String,
    /// Simulation ticks per second; `update()` is called once per tick.
    pub ticks_per_second: u32,
    /// Countdown carried by `StartGame`.
    pub countdown_secs: u32,
    /// How long a client waits for the server's answer to `Hello`.
    pub handshake_timeout_ms: u64,
    /// Largest accepted frame payload.
    pub max_frame_bytes: usize,
    pub player_name: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("0.0.0.0:{GAME_PORT}"),
            ticks_per_second: 15,
            countdown_secs: 5,
            handshake_timeout_ms: 5000,
            max_frame_bytes: MAX_FRAME_BYTES,
            player_name: "Player".to_string(),
        }
    }
}

impl NetConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Wall-clock length of one simulation tick.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_second.max(1) as f64)
    }
}
