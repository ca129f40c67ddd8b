//! Relay configuration from the command line and environment

use std::time::Duration;

use clap::Parser;

pub const DEFAULT_SIGNALING_PORT: u16 = 3000;

/// Two-peer WebRTC signaling relay
///
/// Relays session descriptions and ICE candidates between two WebSocket
/// peers, buffering one offer and one answer while a peer is absent.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to
    #[arg(long, default_value = "0.0.0.0:3000", env = "SIGNALING_BIND")]
    pub bind: String,

    /// Delay after a connection opens before peer-ready and buffered replay
    #[arg(long, default_value_t = 100, env = "SIGNALING_GRACE_DELAY_MS")]
    pub grace_delay_ms: u64,

    /// Keepalive ping period in seconds
    #[arg(long, default_value_t = 30, env = "SIGNALING_PING_INTERVAL_SECS")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the connection
    #[arg(long, default_value_t = 10, env = "SIGNALING_PONG_TIMEOUT_SECS")]
    pub pong_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "SIGNALING_LOG_JSON")]
    pub log_json: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT),
            grace_delay_ms: 100,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
            log_json: false,
        }
    }
}

impl RelayConfig {
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs.max(1))
    }
}
