//! Host-supplied tuning knobs.

use std::fmt;
use std::time::Duration;

use crate::strategy::StrategyFactory;

/// Configuration shared by [`Client`](crate::Client) and
/// [`Server`](crate::Server).
///
/// All timing is relative to `heartbeat_interval`, which paces liveness
/// detection and therefore leader failover.
#[derive(Clone)]
pub struct Config {
    /// Period of the heartbeat tick: handshake probes, election triggers and
    /// leadership announcements all run on this cadence.
    pub heartbeat_interval: Duration,
    /// Deadline for any single request/response conversation with a peer.
    pub request_timeout: Duration,
    /// Pause between client-side retries of a failed request.
    pub retry_backoff: Duration,
    /// Produces the follower behavior used for incoming prepare/accept
    /// commands. `None` selects [`BasicPaxos`](crate::BasicPaxos); tests
    /// install fault-injecting strategies here.
    pub strategy_factory: Option<StrategyFactory>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(2),
            retry_backoff: Duration::from_millis(500),
            strategy_factory: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("request_timeout", &self.request_timeout)
            .field("retry_backoff", &self.retry_backoff)
            .field(
                "strategy_factory",
                &self.strategy_factory.as_ref().map(|_| "custom"),
            )
            .finish()
    }
}
