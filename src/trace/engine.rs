use parking_lot::{Mutex, RwLock};
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::TraceError;
use crate::lookup::RdnsCache;
use crate::probe::Prober;
use crate::stats::HopStats;
use crate::trace::discover::{Hop, discover};
use crate::trace::monitor::Monitor;

/// Handle returned by [`TraceEngine::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type CycleListener = Box<dyn Fn() + Send + Sync>;

/// Registry of cycle-complete listeners.
///
/// Notification is synchronous on the loop task: a slow listener directly
/// delays the next cycle. Listeners must not subscribe or unsubscribe from
/// within their own callback.
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, CycleListener)>>,
}

impl ListenerRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, listener: CycleListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        ListenerId(id)
    }

    fn remove(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id.0);
    }

    pub fn notify(&self) {
        for (_, listener) in self.listeners.lock().iter() {
            listener();
        }
    }
}

/// The two parallel stats arrays, mutated only under one mutex
pub(crate) struct StatsPair {
    pub console: Vec<HopStats>,
    pub persisted: Vec<HopStats>,
}

/// Facade over route discovery, the continuous probing loop, and the dual
/// statistics views.
///
/// The engine exclusively owns the route snapshot and both stats arrays;
/// snapshots are owned copies taken under the merge lock, and the two views
/// are cleared independently (console on demand, persisted after each flush
/// to storage).
pub struct TraceEngine {
    config: Config,
    prober: Arc<dyn Prober>,
    resolver: Option<Arc<RdnsCache>>,
    route: RwLock<Option<Arc<Vec<Hop>>>>,
    stats: Arc<Mutex<StatsPair>>,
    listeners: Arc<ListenerRegistry>,
    cancel: RwLock<CancellationToken>,
}

impl TraceEngine {
    /// Validate the configuration and build the engine.
    pub fn new(config: Config, prober: Arc<dyn Prober>) -> Result<Self, TraceError> {
        config.validate()?;

        let resolver = config
            .resolve_hostnames
            .then(|| Arc::new(RdnsCache::new()));

        Ok(Self {
            config,
            prober,
            resolver,
            route: RwLock::new(None),
            stats: Arc::new(Mutex::new(StatsPair {
                console: Vec::new(),
                persisted: Vec::new(),
            })),
            listeners: Arc::new(ListenerRegistry::new()),
            cancel: RwLock::new(CancellationToken::new()),
        })
    }

    /// Resolve the configured target to an IPv4 address
    fn resolve_target(target: &str) -> Result<IpAddr, TraceError> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            if ip.is_ipv6() {
                return Err(TraceError::InvalidTarget(target.to_string()));
            }
            return Ok(ip);
        }

        let addrs = format!("{}:0", target)
            .to_socket_addrs()
            .map_err(|_| TraceError::InvalidTarget(target.to_string()))?;

        addrs
            .map(|s| s.ip())
            .find(|ip| ip.is_ipv4())
            .ok_or_else(|| TraceError::InvalidTarget(target.to_string()))
    }

    /// Run the discovery sweep and seed both stats arrays.
    ///
    /// Strictly sequential and blocking (run off the runtime); must complete
    /// before continuous probing starts, since hop identities are unknown
    /// until it finishes. Called once per session, or again after `reset()`.
    pub async fn discover(&self) -> Result<Arc<Vec<Hop>>, TraceError> {
        let target = Self::resolve_target(&self.config.target)?;

        let prober = self.prober.clone();
        let max_hops = self.config.max_hops;
        let timeout = self.config.discovery_timeout;
        let hops =
            tokio::task::spawn_blocking(move || discover(prober.as_ref(), target, max_hops, timeout))
                .await
                .map_err(|e| TraceError::Probe(io::Error::other(e)))?;

        let route = Arc::new(hops);

        {
            let track = self.config.track_percentiles;
            let seed = |hops: &[Hop]| -> Vec<HopStats> {
                hops.iter()
                    .map(|h| HopStats::new(h.ordinal, h.addr, track))
                    .collect()
            };
            let mut pair = self.stats.lock();
            pair.console = seed(&route);
            pair.persisted = seed(&route);
        }

        *self.route.write() = Some(route.clone());
        Ok(route)
    }

    /// Launch the continuous probing loop on the runtime. Non-blocking; the
    /// returned handle completes when the loop observes cancellation.
    ///
    /// Callers must not start a second loop without stopping the first, and
    /// must `reset()` before restarting after a `stop()`.
    pub fn start(&self) -> Result<JoinHandle<()>, TraceError> {
        let route = self
            .route
            .read()
            .clone()
            .ok_or(TraceError::NotDiscovered)?;

        let monitor = Monitor::new(
            route,
            self.stats.clone(),
            self.listeners.clone(),
            self.prober.clone(),
            self.resolver.clone(),
            self.config.ping_timeout,
            self.config.frequency,
            self.cancel.read().clone(),
        );

        Ok(tokio::spawn(monitor.run()))
    }

    /// Raise the cancellation signal. The in-flight cycle completes; no
    /// partial cycle is merged after it.
    pub fn stop(&self) {
        self.cancel.read().cancel();
    }

    /// Cancel any running loop, install a fresh cancellation signal, and
    /// discard the route so the next session re-discovers it.
    pub fn reset(&self) {
        {
            let mut cancel = self.cancel.write();
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        *self.route.write() = None;
    }

    /// Most recently discovered route, if any
    pub fn route(&self) -> Option<Arc<Vec<Hop>>> {
        self.route.read().clone()
    }

    /// Owned copy of the console-facing stats, taken under the merge lock
    pub fn snapshot_console(&self) -> Vec<HopStats> {
        self.stats.lock().console.clone()
    }

    /// Owned copy of the persistence-facing stats, taken under the merge lock
    pub fn snapshot_persisted(&self) -> Vec<HopStats> {
        self.stats.lock().persisted.clone()
    }

    /// Reset the console view; hop identities are preserved
    pub fn clear_console(&self) {
        for tracker in self.stats.lock().console.iter_mut() {
            tracker.clear();
        }
    }

    /// Reset the persisted view, typically after a successful flush
    pub fn clear_persisted(&self) {
        for tracker in self.stats.lock().persisted.iter_mut() {
            tracker.clear();
        }
    }

    /// Register a cycle-complete listener, called synchronously once per
    /// probe cycle after the merge. Slow listeners delay the next cycle.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.listeners.add(Box::new(listener))
    }

    /// Remove a previously registered listener
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}
