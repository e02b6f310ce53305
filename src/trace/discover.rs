use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::probe::{EchoStatus, Prober};

/// How a hop answered during the discovery sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HopStatus {
    /// Destination itself replied at this TTL
    Reached,
    /// Intermediate router reported Time Exceeded
    TtlExpired,
    /// Nothing answered within the timeout
    NoReply,
    /// Transport-level failure on the attempt
    Failed,
}

/// Identity of one discovered hop. Immutable after discovery; the route is
/// replaced wholesale only by an explicit reset followed by re-discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    /// 1-based position on the path, dense, no gaps
    pub ordinal: u8,
    /// Responder observed at this TTL (None = never answered)
    pub addr: Option<IpAddr>,
    /// Ultimate target being traced
    pub target: IpAddr,
    pub status: HopStatus,
}

impl Hop {
    /// Display label for the responder column
    pub fn label(&self) -> String {
        match self.addr {
            Some(ip) => ip.to_string(),
            None => "*".to_string(),
        }
    }
}

/// Sequential TTL sweep mapping the hop sequence to `target`.
///
/// One echo per TTL, 1..=max_hops, bounded by `timeout` per attempt. The
/// sweep stops at the first destination reply; that hop count holds for the
/// remainder of the session. Exhausting max_hops without reaching the
/// destination returns the full-length (possibly partially-failed) sequence,
/// which is not an error. Blocking; run off the async runtime.
pub fn discover(prober: &dyn Prober, target: IpAddr, max_hops: u8, timeout: Duration) -> Vec<Hop> {
    let mut hops = Vec::with_capacity(max_hops as usize);

    for ttl in 1..=max_hops {
        let hop = match prober.echo(target, ttl, timeout) {
            Ok(resp) => match resp.status {
                EchoStatus::Reply => Hop {
                    ordinal: ttl,
                    addr: resp.responder,
                    target,
                    status: HopStatus::Reached,
                },
                EchoStatus::TtlExpired => Hop {
                    ordinal: ttl,
                    addr: resp.responder,
                    target,
                    status: HopStatus::TtlExpired,
                },
                EchoStatus::TimedOut => Hop {
                    ordinal: ttl,
                    addr: None,
                    target,
                    status: HopStatus::NoReply,
                },
                EchoStatus::Unreachable => Hop {
                    ordinal: ttl,
                    addr: None,
                    target,
                    status: HopStatus::Failed,
                },
            },
            Err(e) => {
                debug!(ttl, error = %e, "discovery probe failed");
                Hop {
                    ordinal: ttl,
                    addr: None,
                    target,
                    status: HopStatus::Failed,
                }
            }
        };

        let reached = hop.status == HopStatus::Reached;
        hops.push(hop);
        if reached {
            break;
        }
    }

    hops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::EchoResponse;
    use std::io;
    use std::net::Ipv4Addr;

    /// Scripted prober: routers at TTL < path_len, destination at path_len
    struct ScriptedPath {
        path_len: u8,
        reachable: bool,
    }

    impl Prober for ScriptedPath {
        fn echo(&self, target: IpAddr, ttl: u8, _timeout: Duration) -> io::Result<EchoResponse> {
            if !self.reachable {
                return Ok(EchoResponse::timed_out());
            }
            if ttl >= self.path_len {
                Ok(EchoResponse {
                    status: EchoStatus::Reply,
                    responder: Some(target),
                    rtt: Duration::from_millis(ttl as u64),
                })
            } else {
                Ok(EchoResponse {
                    status: EchoStatus::TtlExpired,
                    responder: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, ttl))),
                    rtt: Duration::from_millis(ttl as u64),
                })
            }
        }
    }

    fn target() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))
    }

    #[test]
    fn test_sweep_truncates_at_destination() {
        let prober = ScriptedPath {
            path_len: 4,
            reachable: true,
        };
        let hops = discover(&prober, target(), 30, Duration::from_millis(100));

        assert_eq!(hops.len(), 4);
        assert_eq!(hops[3].status, HopStatus::Reached);
        assert_eq!(hops[3].addr, Some(target()));
        for (i, hop) in hops.iter().enumerate() {
            assert_eq!(hop.ordinal, (i + 1) as u8);
        }
        assert!(
            hops[..3]
                .iter()
                .all(|h| h.status == HopStatus::TtlExpired && h.addr.is_some())
        );
    }

    #[test]
    fn test_unreachable_target_returns_full_sweep() {
        let prober = ScriptedPath {
            path_len: 4,
            reachable: false,
        };
        let hops = discover(&prober, target(), 7, Duration::from_millis(100));

        assert_eq!(hops.len(), 7);
        assert!(hops.iter().all(|h| h.status == HopStatus::NoReply));
        assert!(hops.iter().all(|h| h.addr.is_none()));
    }

    #[test]
    fn test_destination_one_hop_away() {
        let prober = ScriptedPath {
            path_len: 1,
            reachable: true,
        };
        let hops = discover(&prober, target(), 30, Duration::from_millis(100));
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].status, HopStatus::Reached);
    }

    #[test]
    fn test_transport_error_recorded_as_failed_hop() {
        struct Flaky;
        impl Prober for Flaky {
            fn echo(&self, target: IpAddr, ttl: u8, _t: Duration) -> io::Result<EchoResponse> {
                match ttl {
                    2 => Err(io::Error::other("sendto failed")),
                    3 => Ok(EchoResponse {
                        status: EchoStatus::Reply,
                        responder: Some(target),
                        rtt: Duration::from_millis(9),
                    }),
                    _ => Ok(EchoResponse {
                        status: EchoStatus::TtlExpired,
                        responder: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, ttl))),
                        rtt: Duration::from_millis(1),
                    }),
                }
            }
        }

        let hops = discover(&Flaky, target(), 30, Duration::from_millis(100));
        assert_eq!(hops.len(), 3);
        assert_eq!(hops[1].status, HopStatus::Failed);
        assert!(hops[1].addr.is_none());
        assert_eq!(hops[2].status, HopStatus::Reached);
    }

    #[test]
    fn test_hop_label() {
        let hop = Hop {
            ordinal: 1,
            addr: None,
            target: target(),
            status: HopStatus::NoReply,
        };
        assert_eq!(hop.label(), "*");
    }
}
