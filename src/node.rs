//! State shared by the protocol tasks of one embedded node.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::connection::ConnectionPool;
use crate::context::PaxosContext;
use crate::quorum::Quorum;

/// Everything the heartbeat engine, round state machine and request pipeline
/// of a single node share.
///
/// The quorum and context sit behind short-lived sync locks and are never
/// held across an await, so per-replica mutations stay linearizable. The
/// pool owns its own synchronization.
pub(crate) struct NodeState {
    pub(crate) quorum: Mutex<Quorum>,
    pub(crate) context: Mutex<PaxosContext>,
    pub(crate) pool: ConnectionPool,
    pub(crate) config: Config,
    /// Serializes leader rounds: a second client request does not enter its
    /// prepare phase until the previous round has terminated.
    pub(crate) round_lock: tokio::sync::Mutex<()>,
}

impl NodeState {
    pub(crate) fn new(quorum: Quorum, config: Config) -> Arc<Self> {
        Arc::new(Self {
            quorum: Mutex::new(quorum),
            context: Mutex::new(PaxosContext::new()),
            pool: ConnectionPool::new(config.request_timeout),
            config,
            round_lock: tokio::sync::Mutex::new(()),
        })
    }
}
