use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::lookup::RdnsCache;
use crate::probe::Prober;
use crate::stats::HopStats;
use crate::trace::discover::Hop;
use crate::trace::engine::{ListenerRegistry, StatsPair};

/// Result of probing one hop in one cycle; consumed by the merge and
/// discarded
struct ProbeOutcome {
    ordinal: u8,
    rtt: Duration,
    reachable: bool,
    hostname: Option<String>,
}

impl ProbeOutcome {
    fn lost(ordinal: u8) -> Self {
        Self {
            ordinal,
            rtt: Duration::ZERO,
            reachable: false,
            hostname: None,
        }
    }
}

/// The continuous probing loop over a discovered route.
///
/// Each cycle fans out one probe per known hop, joins them (bounded by the
/// per-probe timeout), merges all outcomes into both stats arrays under one
/// lock, notifies listeners, then sleeps. Cancellation is cooperative: it is
/// observed at the top of a cycle and during the inter-cycle sleep, so an
/// in-flight cycle always completes and no partial cycle is merged.
pub(crate) struct Monitor {
    route: Arc<Vec<Hop>>,
    stats: Arc<Mutex<StatsPair>>,
    listeners: Arc<ListenerRegistry>,
    prober: Arc<dyn Prober>,
    resolver: Option<Arc<RdnsCache>>,
    ping_timeout: Duration,
    frequency: Duration,
    cancel: CancellationToken,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        route: Arc<Vec<Hop>>,
        stats: Arc<Mutex<StatsPair>>,
        listeners: Arc<ListenerRegistry>,
        prober: Arc<dyn Prober>,
        resolver: Option<Arc<RdnsCache>>,
        ping_timeout: Duration,
        frequency: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            route,
            stats,
            listeners,
            prober,
            resolver,
            ping_timeout,
            frequency,
            cancel,
        }
    }

    pub async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let outcomes = join_all(self.route.iter().map(|hop| self.probe_hop(hop))).await;

            // Single mutual-exclusion scope covering both arrays: a merge is
            // atomic with respect to snapshot readers and any concurrently
            // (erroneously) started second loop
            {
                let mut pair = self.stats.lock();
                for outcome in &outcomes {
                    let idx = (outcome.ordinal as usize).saturating_sub(1);
                    if let Some(tracker) = pair.console.get_mut(idx) {
                        apply(tracker, outcome);
                    }
                    if let Some(tracker) = pair.persisted.get_mut(idx) {
                        apply(tracker, outcome);
                    }
                }
            }

            // Synchronous delivery: a slow listener delays the next cycle
            self.listeners.notify();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.frequency) => {}
            }
        }
    }

    /// Probe one hop: echo the ultimate target with TTL = the hop's ordinal,
    /// so the hop identity fixed at discovery is re-verified against the
    /// original target each cycle. Hops that never answered during discovery
    /// yield a synthetic lost outcome without network I/O.
    async fn probe_hop(&self, hop: &Hop) -> ProbeOutcome {
        if hop.addr.is_none() {
            return ProbeOutcome::lost(hop.ordinal);
        }

        let prober = self.prober.clone();
        let (target, ttl, timeout) = (hop.target, hop.ordinal, self.ping_timeout);
        let result = tokio::task::spawn_blocking(move || prober.echo(target, ttl, timeout)).await;

        match result {
            Ok(Ok(resp)) if resp.status.is_reachable() => {
                let mut hostname = None;
                if let (Some(resolver), Some(ip)) = (&self.resolver, resp.responder) {
                    // Best effort; failure yields an empty hostname
                    hostname = Some(resolver.reverse(ip).await.unwrap_or_default());
                }
                ProbeOutcome {
                    ordinal: hop.ordinal,
                    rtt: resp.rtt,
                    reachable: true,
                    hostname,
                }
            }
            Ok(Ok(_)) => ProbeOutcome::lost(hop.ordinal),
            Ok(Err(e)) => {
                warn!(ordinal = hop.ordinal, error = %e, "probe transport failure");
                ProbeOutcome::lost(hop.ordinal)
            }
            Err(e) => {
                warn!(ordinal = hop.ordinal, error = %e, "probe task failed");
                ProbeOutcome::lost(hop.ordinal)
            }
        }
    }
}

fn apply(tracker: &mut HopStats, outcome: &ProbeOutcome) {
    if outcome.reachable {
        tracker.record_rtt(outcome.rtt);
        if let Some(hostname) = &outcome.hostname
            && !hostname.is_empty()
        {
            tracker.hostname = hostname.clone();
        }
    } else {
        tracker.record_lost();
    }
}
