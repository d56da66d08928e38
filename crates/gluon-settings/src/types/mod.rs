//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON
//! settings file. Each type implements [`Default`] with production default
//! values, and `#[serde(default)]` lets partial JSON fill in the rest.

mod channel;
mod logging;
mod navigation;

pub use channel::*;
pub use logging::*;
pub use navigation::*;

use serde::{Deserialize, Serialize};

/// Root settings type for a Gluon window.
///
/// # JSON Format
///
/// ```json
/// {
///   "channel": { "transport": "websocket", "logProtocol": true },
///   "navigation": { "policy": "same-origin" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GluonSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Control channel settings (transport, retry intervals, protocol logging).
    pub channel: ChannelSettings,
    /// Navigation guard settings.
    pub navigation: NavigationSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for GluonSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "gluon".to_string(),
            channel: ChannelSettings::default(),
            navigation: NavigationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl GluonSettings {
    /// Correct values that would stall the channel.
    ///
    /// Called automatically during loading. A zero retry interval would turn
    /// the discovery and acquisition loops into busy spins, so it is raised
    /// to the minimum with a warning.
    pub fn validate(&mut self) {
        fn floor_ms(val: &mut u64, name: &str) {
            if *val < MIN_RETRY_MS {
                tracing::warn!("{name} too small ({val}ms), raised to {MIN_RETRY_MS}ms");
                *val = MIN_RETRY_MS;
            }
        }

        let ch = &mut self.channel;
        floor_ms(&mut ch.discovery_retry_ms, "discovery_retry_ms");
        floor_ms(&mut ch.acquire_retry_ms, "acquire_retry_ms");

        if ch.discovery_max_attempts == Some(0) {
            tracing::warn!("discovery_max_attempts is 0, treating as unbounded");
            ch.discovery_max_attempts = None;
        }
    }
}

/// Lower bound for retry intervals.
pub const MIN_RETRY_MS: u64 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_version() {
        let s = GluonSettings::default();
        assert_eq!(s.version, "0.1.0");
        assert_eq!(s.name, "gluon");
    }

    #[test]
    fn default_settings_serde_roundtrip() {
        let defaults = GluonSettings::default();
        let json = serde_json::to_string(&defaults).unwrap();
        let back: GluonSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, defaults.version);
        assert_eq!(back.channel.transport, defaults.channel.transport);
        assert_eq!(back.navigation.policy, defaults.navigation.policy);
    }

    #[test]
    fn default_settings_json_field_names() {
        let json = serde_json::to_value(GluonSettings::default()).unwrap();
        let channel = json.get("channel").unwrap();
        assert!(channel.get("discoveryRetryMs").is_some());
        assert!(channel.get("acquireRetryMs").is_some());
        assert!(channel.get("logProtocol").is_some());
        assert_eq!(json["navigation"]["policy"], "same-origin");
    }

    #[test]
    fn empty_json_produces_defaults() {
        let settings: GluonSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.channel.acquire_retry_ms, 200);
        assert_eq!(settings.channel.load_timeout_ms, 10_000);
        assert_eq!(settings.navigation.policy, NavigationPolicy::SameOrigin);
    }

    #[test]
    fn partial_json_overrides() {
        let json = serde_json::json!({
            "channel": { "transport": "websocket", "discoveryMaxAttempts": 50 },
            "navigation": { "policy": false }
        });
        let settings: GluonSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.channel.transport, TransportKind::WebSocket);
        assert_eq!(settings.channel.discovery_max_attempts, Some(50));
        assert_eq!(settings.navigation.policy, NavigationPolicy::ExactUrl);
        // untouched fields keep defaults
        assert_eq!(settings.channel.discovery_host, "127.0.0.1");
    }

    #[test]
    fn validate_raises_zero_intervals() {
        let mut s = GluonSettings::default();
        s.channel.discovery_retry_ms = 0;
        s.channel.acquire_retry_ms = 1;
        s.validate();
        assert_eq!(s.channel.discovery_retry_ms, MIN_RETRY_MS);
        assert_eq!(s.channel.acquire_retry_ms, MIN_RETRY_MS);
    }

    #[test]
    fn validate_zero_attempts_means_unbounded() {
        let mut s = GluonSettings::default();
        s.channel.discovery_max_attempts = Some(0);
        s.validate();
        assert_eq!(s.channel.discovery_max_attempts, None);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let mut s = GluonSettings::default();
        s.channel.discovery_retry_ms = 500;
        s.channel.discovery_max_attempts = Some(3);
        s.validate();
        assert_eq!(s.channel.discovery_retry_ms, 500);
        assert_eq!(s.channel.discovery_max_attempts, Some(3));
    }
}
