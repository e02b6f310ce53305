use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use crate::stats::percentile;

/// Rolling statistics for a single hop.
///
/// Two parallel instances exist per hop (console-facing and
/// persistence-facing) sharing the same identity but cleared on independent
/// cadences. All mutation happens under the engine's merge lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopStats {
    /// 1-based hop ordinal
    pub ordinal: u8,
    /// Responder observed at discovery time (None = never answered)
    pub addr: Option<IpAddr>,
    /// Best-effort reverse hostname, empty until resolved
    pub hostname: String,

    // Counters
    pub sent: u64,
    pub lost: u64,

    // Latency
    #[serde(with = "duration_serde")]
    pub last_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub sum_rtt: Duration,
    /// Duration::MAX until the first sample is recorded
    #[serde(with = "duration_serde")]
    pub min_rtt: Duration,
    #[serde(with = "duration_serde")]
    pub max_rtt: Duration,

    // Jitter: absolute difference between consecutive recorded RTTs.
    // last_rtt starts at zero, so the first jitter equals the first RTT.
    #[serde(with = "duration_serde")]
    pub last_jitter: Duration,
    #[serde(with = "duration_serde")]
    pub sum_jitter: Duration,
    #[serde(with = "duration_serde")]
    pub min_jitter: Duration,
    #[serde(with = "duration_serde")]
    pub max_jitter: Duration,

    /// Raw sample buffers, populated only when percentile tracking is on.
    /// Unbounded; callers bound memory by clearing periodically.
    track_samples: bool,
    #[serde(skip)]
    pub rtt_samples: Vec<Duration>,
    #[serde(skip)]
    pub jitter_samples: Vec<Duration>,

    /// Wall-clock time of the last recorded sample
    pub updated_at: Option<DateTime<Utc>>,
}

impl HopStats {
    pub fn new(ordinal: u8, addr: Option<IpAddr>, track_samples: bool) -> Self {
        Self {
            ordinal,
            addr,
            hostname: String::new(),
            sent: 0,
            lost: 0,
            last_rtt: Duration::ZERO,
            sum_rtt: Duration::ZERO,
            min_rtt: Duration::MAX,
            max_rtt: Duration::ZERO,
            last_jitter: Duration::ZERO,
            sum_jitter: Duration::ZERO,
            min_jitter: Duration::MAX,
            max_jitter: Duration::ZERO,
            track_samples,
            rtt_samples: Vec::new(),
            jitter_samples: Vec::new(),
            updated_at: None,
        }
    }

    /// Record a measured round trip.
    pub fn record_rtt(&mut self, rtt: Duration) {
        self.sent += 1;

        self.sum_rtt += rtt;
        if rtt < self.min_rtt {
            self.min_rtt = rtt;
        }
        if rtt > self.max_rtt {
            self.max_rtt = rtt;
        }

        let jitter = if rtt >= self.last_rtt {
            rtt - self.last_rtt
        } else {
            self.last_rtt - rtt
        };
        self.sum_jitter += jitter;
        if jitter < self.min_jitter {
            self.min_jitter = jitter;
        }
        if jitter > self.max_jitter {
            self.max_jitter = jitter;
        }
        self.last_jitter = jitter;

        if self.track_samples {
            self.rtt_samples.push(rtt);
            self.jitter_samples.push(jitter);
        }

        self.last_rtt = rtt;
        self.updated_at = Some(Utc::now());
    }

    /// Record a probe that got no usable reply.
    ///
    /// Counts toward loss percentage only; a lost probe must not pollute
    /// min/max/percentile RTT statistics with a synthetic zero.
    pub fn record_lost(&mut self) {
        self.sent += 1;
        self.lost += 1;
    }

    /// Reset all counters and buffers, preserving hop identity.
    pub fn clear(&mut self) {
        let hostname = std::mem::take(&mut self.hostname);
        *self = Self::new(self.ordinal, self.addr, self.track_samples);
        self.hostname = hostname;
    }

    /// Probes that produced a measured RTT
    pub fn received(&self) -> u64 {
        self.sent - self.lost
    }

    /// Loss percentage
    pub fn loss_pct(&self) -> f64 {
        if self.sent == 0 {
            0.0
        } else {
            (self.lost as f64 / self.sent as f64) * 100.0
        }
    }

    /// Average RTT over measured samples
    pub fn avg_rtt(&self) -> Duration {
        let received = self.received();
        if received == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.sum_rtt.as_secs_f64() / received as f64)
        }
    }

    /// Average jitter over measured samples
    pub fn avg_jitter(&self) -> Duration {
        let received = self.received();
        if received == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.sum_jitter.as_secs_f64() / received as f64)
        }
    }

    /// RTT percentile from the raw buffer (zero unless tracking is enabled
    /// and at least 5 samples have accumulated)
    pub fn rtt_percentile(&self, p: f64) -> Duration {
        percentile(&self.rtt_samples, p)
    }

    /// Jitter percentile from the raw buffer
    pub fn jitter_percentile(&self, p: f64) -> Duration {
        percentile(&self.jitter_samples, p)
    }
}

/// Serde helper for Duration, saturating at u64 microseconds so the
/// Duration::MAX min-sentinel stays representable
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let micros = duration.as_micros().min(u64::MAX as u128) as u64;
        micros.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tracked(ordinal: u8) -> HopStats {
        HopStats::new(
            ordinal,
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, ordinal))),
            true,
        )
    }

    #[test]
    fn test_initial_state() {
        let stats = tracked(3);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.min_rtt, Duration::MAX);
        assert_eq!(stats.max_rtt, Duration::ZERO);
        assert_eq!(stats.last_rtt, Duration::ZERO);
        assert_eq!(stats.loss_pct(), 0.0);
        assert!(stats.updated_at.is_none());
    }

    #[test]
    fn test_single_sample() {
        let mut stats = tracked(1);
        let rtt = Duration::from_millis(10);
        stats.record_rtt(rtt);

        assert_eq!(stats.sent, 1);
        assert_eq!(stats.received(), 1);
        assert_eq!(stats.min_rtt, rtt);
        assert_eq!(stats.max_rtt, rtt);
        assert_eq!(stats.avg_rtt(), rtt);
        // First jitter baseline is last_rtt = 0, so jitter == rtt
        assert_eq!(stats.last_jitter, rtt);
        assert!(stats.updated_at.is_some());
    }

    #[test]
    fn test_jitter_sequence() {
        // RTTs 10, 30, 15 -> jitters |0-10|=10, |10-30|=20, |30-15|=15
        let mut stats = tracked(1);
        stats.record_rtt(Duration::from_millis(10));
        assert_eq!(stats.last_jitter, Duration::from_millis(10));
        stats.record_rtt(Duration::from_millis(30));
        assert_eq!(stats.last_jitter, Duration::from_millis(20));
        stats.record_rtt(Duration::from_millis(15));
        assert_eq!(stats.last_jitter, Duration::from_millis(15));

        assert_eq!(stats.min_jitter, Duration::from_millis(10));
        assert_eq!(stats.max_jitter, Duration::from_millis(20));
        assert_eq!(
            stats.jitter_samples,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(15)
            ]
        );
    }

    #[test]
    fn test_lost_never_exceeds_sent() {
        let mut stats = tracked(1);
        for i in 0..100 {
            if i % 3 == 0 {
                stats.record_lost();
            } else {
                stats.record_rtt(Duration::from_millis(i));
            }
            assert!(stats.lost <= stats.sent);
        }
    }

    #[test]
    fn test_record_lost_leaves_latency_untouched() {
        let mut stats = tracked(1);
        stats.record_rtt(Duration::from_millis(20));
        let (min, max, sum, jitter_sum) =
            (stats.min_rtt, stats.max_rtt, stats.sum_rtt, stats.sum_jitter);

        stats.record_lost();
        stats.record_lost();

        assert_eq!(stats.sent, 3);
        assert_eq!(stats.lost, 2);
        assert_eq!(stats.min_rtt, min);
        assert_eq!(stats.max_rtt, max);
        assert_eq!(stats.sum_rtt, sum);
        assert_eq!(stats.sum_jitter, jitter_sum);
        assert_eq!(stats.rtt_samples.len(), 1);
    }

    #[test]
    fn test_loss_pct() {
        let mut stats = tracked(1);
        assert_eq!(stats.loss_pct(), 0.0);

        for _ in 0..7 {
            stats.record_rtt(Duration::from_millis(5));
        }
        for _ in 0..3 {
            stats.record_lost();
        }
        assert!((stats.loss_pct() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_clear_preserves_identity() {
        let mut stats = tracked(7);
        stats.hostname = "router.example.net".to_string();
        stats.record_rtt(Duration::from_millis(12));
        stats.record_lost();

        stats.clear();

        assert_eq!(stats.ordinal, 7);
        assert_eq!(stats.addr, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
        assert_eq!(stats.hostname, "router.example.net");
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.min_rtt, Duration::MAX);
        assert_eq!(stats.last_rtt, Duration::ZERO);
        assert!(stats.rtt_samples.is_empty());
        assert!(stats.jitter_samples.is_empty());
        assert!(stats.updated_at.is_none());
    }

    #[test]
    fn test_sample_buffers_disabled_by_default_flag() {
        let mut stats = HopStats::new(1, None, false);
        stats.record_rtt(Duration::from_millis(5));
        assert!(stats.rtt_samples.is_empty());
        assert_eq!(stats.rtt_percentile(0.98), Duration::ZERO);
    }

    #[test]
    fn test_rtt_percentile_via_buffer() {
        let mut stats = tracked(1);
        for ms in [1, 2, 3, 4, 5] {
            stats.record_rtt(Duration::from_millis(ms));
        }
        assert_eq!(stats.rtt_percentile(0.5), Duration::from_millis(3));
    }

    #[test]
    fn test_avg_rtt_ignores_losses() {
        let mut stats = tracked(1);
        stats.record_rtt(Duration::from_millis(10));
        stats.record_rtt(Duration::from_millis(30));
        stats.record_lost();
        assert_eq!(stats.avg_rtt(), Duration::from_millis(20));
    }
}
