//! Alert evaluation settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// How long a repeated crossing stays quiet after it fired.
    pub cooldown_secs: u64,

    /// Interval between background evaluation passes.
    pub check_interval_secs: u64,

    /// Wait after a failed pass before trying again.
    pub error_backoff_secs: u64,

    /// Owner assigned to subscriptions created from the CLI or hub.
    pub default_owner: String,

    pub default_temperature_high: f64,
    pub default_temperature_low: f64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3600,
            check_interval_secs: 1800,
            error_backoff_secs: 60,
            default_owner: "local".to_string(),
            default_temperature_high: 85.0,
            default_temperature_low: 35.0,
        }
    }
}

impl AlertsConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AlertsConfig::default();
        assert_eq!(config.check_interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.error_backoff(), Duration::from_secs(60));
        assert_eq!(config.default_temperature_high, 85.0);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config: AlertsConfig = toml::from_str("check_interval_secs = 0").unwrap();
        assert_eq!(config.check_interval(), Duration::from_secs(1));
        assert_eq!(config.cooldown_secs, 3600);
    }
}
