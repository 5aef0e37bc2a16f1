//! Channel tuning knobs, loadable from a TOML file on disk or parsed directly from a string.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// How long the `Publisher` waits, once the client has gone idle, before flushing batched
/// property-update signals.
const DEFAULT_PROPERTY_UPDATE_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    property_update_interval_ms: u64,
    /// Whether a freshly constructed channel starts in the idle state, eligible to flush property
    /// updates before its first explicit `Idle` message arrives.
    pub start_idle: bool,
    /// Soft cap on how many coalesced property updates may pile up for a single object between
    /// flushes. Crossing it only logs a warning — it never drops data or forces an early flush.
    /// `0` means unbounded (no warning is ever logged).
    pub max_pending_property_updates: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            property_update_interval_ms: DEFAULT_PROPERTY_UPDATE_INTERVAL_MS,
            start_idle: false,
            max_pending_property_updates: 0,
        }
    }
}

impl ChannelConfig {
    pub fn property_update_interval(&self) -> Duration {
        Duration::from_millis(self.property_update_interval_ms)
    }

    pub fn with_property_update_interval(mut self, interval: Duration) -> Self {
        self.property_update_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Parse a config from TOML source text, falling back to field defaults for anything absent.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::CodecError(format!("invalid config: {}", e)))
    }

    /// Read and parse a config file from disk.
    pub fn load(path: &str) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::CodecError(format!("reading {}: {}", path, e)))?;
        Self::from_toml_str(&contents)
    }
}

impl fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChannelConfig {{ property_update_interval: {:?}, start_idle: {}, max_pending_property_updates: {} }}",
            self.property_update_interval(),
            self.start_idle,
            self.max_pending_property_updates
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_a_50ms_property_update_interval() {
        let config = ChannelConfig::default();
        assert_eq!(config.property_update_interval(), Duration::from_millis(50));
        assert!(!config.start_idle);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_defaults() {
        let config = ChannelConfig::from_toml_str("start_idle = true\n").unwrap();
        assert!(config.start_idle);
        assert_eq!(config.property_update_interval(), Duration::from_millis(50));
    }

    #[test]
    fn full_toml_overrides_every_field() {
        let config = ChannelConfig::from_toml_str(
            "property_update_interval_ms = 10\nstart_idle = true\nmax_pending_property_updates = 200\n",
        )
        .unwrap();
        assert_eq!(config.property_update_interval(), Duration::from_millis(10));
        assert!(config.start_idle);
        assert_eq!(config.max_pending_property_updates, 200);
    }

    #[test]
    fn malformed_toml_is_an_error_not_a_panic() {
        assert!(ChannelConfig::from_toml_str("not = [valid").is_err());
    }
}
