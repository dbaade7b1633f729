//! Transport configuration.
//!
//! A `TransportConfig` is constructed programmatically by the host process
//! (typically parsed out of the host's own config file) and passed into
//! [`crate::RaftTransport::new`]. `from_toml_str` is provided for hosts that
//! want to keep the same TOML-validation idiom the rest of this repository's
//! services use, but this crate owns no filesystem path of its own.

use serde::Deserialize;
use std::time::Duration;

/// Tuning knobs for the transport. All fields have defaults; only a caller
/// that wants non-default behavior needs to construct this directly.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-destination outbound queue capacity before `SendAsync` drops.
    pub send_buffer_size: usize,
    /// How long an outbound worker waits for a new request before exiting.
    pub idle_timeout: Duration,
    /// Interval between periodic stats log lines (only emitted if enabled).
    pub stats_interval: Duration,
    /// Consecutive connect failures before a breaker opens.
    pub breaker_failure_threshold: u32,
    /// Initial backoff window once a breaker opens.
    pub breaker_initial_backoff: Duration,
    /// Backoff cap; the window doubles on each failed probe up to this.
    pub breaker_max_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: 10_000,
            idle_timeout: Duration::from_secs(60),
            stats_interval: Duration::from_secs(10),
            breaker_failure_threshold: 1,
            breaker_initial_backoff: Duration::from_secs(1),
            breaker_max_backoff: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Load a config from a TOML fragment, validating required fields and
    /// defaulting the rest -- the same `Raw*` + validated-struct split used
    /// by `services/forwarder`'s `ForwarderConfig`.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawTransportConfig =
            toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let defaults = TransportConfig::default();
        Ok(TransportConfig {
            send_buffer_size: raw.send_buffer_size.unwrap_or(defaults.send_buffer_size),
            idle_timeout: raw
                .idle_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_timeout),
            stats_interval: raw
                .stats_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.stats_interval),
            breaker_failure_threshold: raw
                .breaker_failure_threshold
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_initial_backoff: raw
                .breaker_initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.breaker_initial_backoff),
            breaker_max_backoff: raw
                .breaker_max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.breaker_max_backoff),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawTransportConfig {
    send_buffer_size: Option<usize>,
    idle_timeout_ms: Option<u64>,
    stats_interval_ms: Option<u64>,
    breaker_failure_threshold: Option<u32>,
    breaker_initial_backoff_ms: Option<u64>,
    breaker_max_backoff_ms: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parsing transport config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_toml_is_empty() {
        let cfg = TransportConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.send_buffer_size, 10_000);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg = TransportConfig::from_toml_str(
            "send_buffer_size = 4\nidle_timeout_ms = 50\n",
        )
        .unwrap();
        assert_eq!(cfg.send_buffer_size, 4);
        assert_eq!(cfg.idle_timeout, Duration::from_millis(50));
        assert_eq!(cfg.stats_interval, Duration::from_secs(10));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(TransportConfig::from_toml_str("not valid toml +++").is_err());
    }
}
