use std::io;

/// Library error taxonomy for path discovery and monitoring.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// No usable IPv4 address for the target (fatal pre-session).
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Invalid configuration (fatal pre-session).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `start()` called before the route was discovered.
    #[error("route not discovered; call discover() first")]
    NotDiscovered,

    /// Per-attempt transport failure surfaced from direct prober use.
    #[error("probe failed: {0}")]
    Probe(#[source] io::Error),
}
