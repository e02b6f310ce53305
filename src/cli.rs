use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use hopwatch::config::{Config, MAX_SAFE_HOPS};

/// Continuous per-hop path latency and loss monitor
#[derive(Parser, Debug, Clone)]
#[command(name = "hopwatch")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to trace (IP address or hostname)
    pub target: String,

    /// Maximum TTL for route discovery
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Per-attempt discovery timeout in seconds
    #[arg(long = "discovery-timeout", default_value = "1.0")]
    pub discovery_timeout: f64,

    /// Per-probe timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "3.0")]
    pub timeout: f64,

    /// Delay between probe cycles in seconds
    #[arg(short = 'f', long = "frequency", default_value = "1.0")]
    pub frequency: f64,

    /// Number of probe cycles to run (0 = until interrupted)
    #[arg(short = 'c', long = "count", default_value = "0")]
    pub count: u64,

    /// Skip reverse DNS lookups
    #[arg(long = "no-dns")]
    pub no_dns: bool,

    /// Buffer raw samples and report the 98th percentile
    #[arg(long = "percentiles")]
    pub percentiles: bool,

    /// Append per-hop statistics to a CSV file
    #[arg(long = "csv")]
    pub csv: Option<PathBuf>,

    /// Seconds between CSV flushes
    #[arg(long = "csv-interval", default_value = "10.0")]
    pub csv_interval: f64,
}

impl Args {
    pub fn discovery_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.discovery_timeout)
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn frequency_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frequency)
    }

    pub fn csv_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.csv_interval)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }

        if self.max_hops > MAX_SAFE_HOPS {
            return Err(format!("Max hops cannot exceed {}", MAX_SAFE_HOPS));
        }

        if self.discovery_timeout <= 0.0 || self.timeout <= 0.0 {
            return Err("Timeouts must be positive".into());
        }

        if self.frequency <= 0.0 {
            return Err("Frequency must be positive".into());
        }

        if self.csv_interval <= 0.0 {
            return Err("CSV interval must be positive".into());
        }

        Ok(())
    }
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            target: args.target.clone(),
            max_hops: args.max_hops,
            discovery_timeout: args.discovery_timeout_duration(),
            ping_timeout: args.timeout_duration(),
            frequency: args.frequency_duration(),
            resolve_hostnames: !args.no_dns,
            track_percentiles: args.percentiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: &str) -> Args {
        Args::parse_from(["hopwatch", target])
    }

    #[test]
    fn test_defaults() {
        let args = args("8.8.8.8");
        assert_eq!(args.max_hops, 30);
        assert_eq!(args.count, 0);
        assert!(!args.no_dns);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_config_from_args() {
        let mut parsed = args("example.net");
        parsed.no_dns = true;
        parsed.percentiles = true;

        let config = Config::from(&parsed);
        assert_eq!(config.target, "example.net");
        assert!(!config.resolve_hostnames);
        assert!(config.track_percentiles);
        assert_eq!(config.frequency, Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_zero_hops() {
        let mut parsed = args("8.8.8.8");
        parsed.max_hops = 0;
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_frequency() {
        let mut parsed = args("8.8.8.8");
        parsed.frequency = -1.0;
        assert!(parsed.validate().is_err());
    }
}
