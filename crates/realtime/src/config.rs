//! Channel manager configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use threadlink_protocol::constants::{
    RECONNECT_BASE_DELAY, RECONNECT_MAX_ATTEMPTS, WS_MAX_MESSAGE_SIZE, WS_OUTBOUND_QUEUE,
    WS_PING_PERIOD, WS_PONG_WAIT,
};

use crate::connection::ConnectionSettings;
use crate::endpoint::EndpointConfig;
use crate::types::ReconnectConfig;

/// Channel manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Delay before the first reconnection attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Consecutive reconnection attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Keepalive ping interval in seconds (0 disables pings).
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,

    /// Read deadline in seconds; silence longer than this drops the connection.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,

    /// Largest inbound message accepted, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Outbound messages buffered per connection before `send` fails.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default)]
    pub endpoint: EndpointConfig,
}

fn default_base_delay_ms() -> u64 {
    RECONNECT_BASE_DELAY.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    RECONNECT_MAX_ATTEMPTS
}

fn default_ping_period_secs() -> u64 {
    WS_PING_PERIOD.as_secs()
}

fn default_pong_wait_secs() -> u64 {
    WS_PONG_WAIT.as_secs()
}

fn default_max_message_size() -> usize {
    WS_MAX_MESSAGE_SIZE
}

fn default_outbound_queue() -> usize {
    WS_OUTBOUND_QUEUE
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            ping_period_secs: default_ping_period_secs(),
            pong_wait_secs: default_pong_wait_secs(),
            max_message_size: default_max_message_size(),
            outbound_queue: default_outbound_queue(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Backoff policy derived from this config.
    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    pub(crate) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            ping_period: (self.ping_period_secs > 0)
                .then(|| Duration::from_secs(self.ping_period_secs)),
            pong_wait: Duration::from_secs(self.pong_wait_secs.max(1)),
            max_message_size: self.max_message_size,
            outbound_queue: self.outbound_queue.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.ping_period_secs, 5);
        assert_eq!(config.pong_wait_secs, 60);
        assert_eq!(config.endpoint, EndpointConfig::default());
        assert_eq!(config.reconnect(), ReconnectConfig::default());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: RealtimeConfig = toml::from_str("").unwrap();
        assert_eq!(config, RealtimeConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config: RealtimeConfig = toml::from_str(
            r#"
            base_delay_ms = 250
            max_attempts = 8

            [endpoint]
            stream_path = "/live/{channel}"
            "#,
        )
        .unwrap();
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.ping_period_secs, 5);
        assert_eq!(config.endpoint.stream_path, "/live/{channel}");
        assert_eq!(config.endpoint.rest_suffix, "/api");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = RealtimeConfig {
            base_delay_ms: 10,
            max_attempts: 2,
            ..RealtimeConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RealtimeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn zero_ping_period_disables_keepalive() {
        let config = RealtimeConfig {
            ping_period_secs: 0,
            pong_wait_secs: 0,
            outbound_queue: 0,
            ..RealtimeConfig::default()
        };
        let settings = config.connection_settings();
        assert!(settings.ping_period.is_none());
        assert_eq!(settings.pong_wait, Duration::from_secs(1));
        assert_eq!(settings.outbound_queue, 1);
    }
}
