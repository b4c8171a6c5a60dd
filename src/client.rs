//! The client handle: submit workloads to whichever replica leads.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::error::SendError;
use crate::heartbeat;
use crate::node::NodeState;
use crate::quorum::Quorum;
use crate::request::{self, QueuedRequest};
use crate::types::Endpoint;

/// External client of the quorum.
///
/// A client is not a member: it observes liveness and leadership through its
/// own heartbeat probes and funnels every submission through a single-flight
/// request queue aimed at the current leader.
pub struct Client {
    node: Arc<NodeState>,
    queue: mpsc::UnboundedSender<QueuedRequest>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<QueuedRequest>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Client {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        Self {
            node: NodeState::new(Quorum::client(), config),
            queue,
            pending: Mutex::new(Some(receiver)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a quorum member to talk to. Pre-start only.
    pub fn add(&self, endpoint: impl Into<Endpoint>) {
        self.node.quorum.lock().add(endpoint.into());
    }

    /// Launch the heartbeat engine and the request queue.
    pub fn start(&self) {
        let Some(receiver) = self.pending.lock().take() else {
            return;
        };
        debug!("client starting");
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(heartbeat::run(self.node.clone(), false)));
        tasks.push(tokio::spawn(request::run_queue(self.node.clone(), receiver)));
    }

    /// Resolve once a stable leader exists and a majority of the quorum is
    /// alive. With a reachable majority this takes at most a couple of
    /// heartbeat intervals.
    pub async fn wait_until_quorum_ready(&self) {
        loop {
            if self.node.quorum.lock().is_ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Submit a workload for consensus.
    ///
    /// Never fails synchronously: the outcome, including `not_ready` and
    /// retry exhaustion, arrives through the returned future. `retries`
    /// bounds how many times a transient failure is re-dispatched.
    pub async fn send(&self, workload: impl Into<Bytes>, retries: u16) -> Result<Bytes, SendError> {
        let (sink, outcome) = oneshot::channel();
        let request = QueuedRequest {
            workload: workload.into(),
            retries,
            sink,
        };
        if self.queue.send(request).is_err() {
            // Queue task is gone; the client is shut down.
            return Err(SendError::RequestError);
        }
        outcome.await.unwrap_or(Err(SendError::RequestError))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
