//! Broker configuration: the single source of truth for the handoff
//! port. The capture submitter and the importer poller both read
//! their endpoint from here; nothing is auto-discovered.

use core::time::Duration;
use std::env;
use std::net::{IpAddr, Ipv4Addr};

/// Default loopback port for the handoff surface.
pub const DEFAULT_PORT: u16 = 4411;

/// Default payload ceiling: 200 MB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Loopback port; 0 binds an ephemeral port (tests).
    pub port: u16,
    /// Optional shared key; when set, submission and polling must
    /// present it in `x-api-key`.
    pub api_key: Option<String>,
    pub max_payload_bytes: usize,
    /// Long-poll window in milliseconds.
    pub long_poll_ms: u64,
    /// Chunk-transfer inactivity timeout in milliseconds.
    pub chunk_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            api_key: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            long_poll_ms: 25_000,
            chunk_timeout_ms: 60_000,
        }
    }
}

impl BrokerConfig {
    /// Load from `PAGELIFT_*` environment variables:
    /// `PAGELIFT_BROKER_PORT`, `PAGELIFT_BROKER_API_KEY`,
    /// `PAGELIFT_MAX_PAYLOAD_BYTES`, `PAGELIFT_LONG_POLL_MS`,
    /// `PAGELIFT_CHUNK_TIMEOUT_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("PAGELIFT_BROKER_PORT").unwrap_or(defaults.port),
            api_key: env::var("PAGELIFT_BROKER_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            max_payload_bytes: env_parse("PAGELIFT_MAX_PAYLOAD_BYTES")
                .unwrap_or(defaults.max_payload_bytes),
            long_poll_ms: env_parse("PAGELIFT_LONG_POLL_MS").unwrap_or(defaults.long_poll_ms),
            chunk_timeout_ms: env_parse("PAGELIFT_CHUNK_TIMEOUT_MS")
                .unwrap_or(defaults.chunk_timeout_ms),
        }
    }

    /// The broker binds loopback only.
    #[inline]
    #[must_use]
    pub const fn bind_host(&self) -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    /// Base URL both peers derive their endpoint from.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    #[inline]
    #[must_use]
    pub const fn long_poll(&self) -> Duration {
        Duration::from_millis(self.long_poll_ms)
    }

    #[inline]
    #[must_use]
    pub const fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_contract() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, 4411);
        assert_eq!(config.max_payload_bytes, 200 * 1024 * 1024);
        assert_eq!(config.long_poll_ms, 25_000);
        assert_eq!(config.chunk_timeout_ms, 60_000);
        assert!(config.base_url().starts_with("http://127.0.0.1:"));
    }
}
