use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// Upper bound on discovery depth to prevent resource exhaustion
pub const MAX_SAFE_HOPS: u8 = 64;

/// Runtime configuration for a tracing session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target host (IP address or hostname)
    pub target: String,
    /// Maximum TTL for route discovery
    pub max_hops: u8,
    /// Per-attempt timeout during discovery
    #[serde(with = "duration_serde")]
    pub discovery_timeout: Duration,
    /// Per-probe timeout during continuous monitoring
    #[serde(with = "duration_serde")]
    pub ping_timeout: Duration,
    /// Delay between probe cycles
    #[serde(with = "duration_serde")]
    pub frequency: Duration,
    /// Enable best-effort reverse DNS lookups per probe
    pub resolve_hostnames: bool,
    /// Buffer raw RTT/jitter samples for percentile computation
    pub track_percentiles: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: String::new(),
            max_hops: 30,
            discovery_timeout: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(3),
            frequency: Duration::from_secs(1),
            resolve_hostnames: true,
            track_percentiles: false,
        }
    }
}

impl Config {
    /// Validate configuration bounds. Violations are fatal to session start.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.target.is_empty() {
            return Err(TraceError::InvalidConfiguration(
                "target must not be empty".into(),
            ));
        }

        if self.max_hops == 0 {
            return Err(TraceError::InvalidConfiguration(
                "max hops must be at least 1".into(),
            ));
        }

        if self.max_hops > MAX_SAFE_HOPS {
            return Err(TraceError::InvalidConfiguration(format!(
                "max hops cannot exceed {}",
                MAX_SAFE_HOPS
            )));
        }

        if self.discovery_timeout.is_zero() || self.ping_timeout.is_zero() {
            return Err(TraceError::InvalidConfiguration(
                "timeouts must be positive".into(),
            ));
        }

        if self.frequency.is_zero() {
            return Err(TraceError::InvalidConfiguration(
                "frequency must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            target: "192.0.2.1".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config_rejects_empty_target() {
        assert!(matches!(
            Config::default().validate(),
            Err(TraceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_zero_max_hops_rejected() {
        let config = Config {
            max_hops: 0,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(TraceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_excessive_max_hops_rejected() {
        let config = Config {
            max_hops: MAX_SAFE_HOPS + 1,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let config = Config {
            frequency: Duration::ZERO,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = Config {
            ping_timeout: Duration::ZERO,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }
}
