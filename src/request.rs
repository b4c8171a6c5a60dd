//! Single-flight client request pipeline.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::command::{Command, ErrorCode};
use crate::connection::Connection;
use crate::error::SendError;
use crate::node::NodeState;
use crate::types::Endpoint;

/// One submitted workload waiting its turn in the queue.
///
/// The queue owns the request from submission until its sink is fulfilled;
/// the sink is consumed exactly once, on the terminal outcome.
pub(crate) struct QueuedRequest {
    pub(crate) workload: Bytes,
    pub(crate) retries: u16,
    pub(crate) sink: oneshot::Sender<Result<Bytes, SendError>>,
}

/// Drain the queue strictly one request at a time: the next request does not
/// touch the wire until the previous one has terminated.
pub(crate) async fn run_queue(
    node: Arc<NodeState>,
    mut requests: mpsc::UnboundedReceiver<QueuedRequest>,
) {
    while let Some(request) = requests.recv().await {
        let outcome = dispatch(&node, &request.workload, request.retries).await;
        // The caller may have dropped its future; that is not an error.
        let _ = request.sink.send(outcome);
    }
}

/// Dispatch one request, retrying transient failures with a fixed back-off.
async fn dispatch(node: &NodeState, workload: &Bytes, mut retries: u16) -> Result<Bytes, SendError> {
    loop {
        let leader = {
            let quorum = node.quorum.lock();
            if quorum.is_ready() {
                quorum.who_is_our_leader()
            } else {
                None
            }
        };
        let Some(leader) = leader else {
            debug!("quorum not ready, failing request");
            return Err(SendError::NotReady);
        };

        match initiate(node, leader, workload.clone()).await {
            Ok(response) => return Ok(response),
            Err(code) => {
                debug!(%leader, %code, retries, "request attempt failed");
                if retries == 0 {
                    return Err(SendError::RequestError);
                }
                retries -= 1;
                tokio::time::sleep(node.config.retry_backoff).await;
            }
        }
    }
}

/// One attempt: hand the workload to the believed leader and await the
/// round's terminal outcome.
///
/// Uses a transient connection so a long round never delays the heartbeat
/// probes sharing the pool. Transport failures and timeouts mark the leader
/// suspect, which lets the retry loop re-evaluate who leads.
async fn initiate(node: &NodeState, leader: Endpoint, workload: Bytes) -> Result<Bytes, ErrorCode> {
    let attempt = async {
        let mut connection = Connection::connect(leader, node.config.request_timeout).await?;
        connection
            .write(Command::RequestInitiate { workload })
            .await?;
        // A round is a prepare exchange plus an accept exchange, each bounded
        // by the request timeout on the leader side.
        connection
            .read_next_timeout(2 * node.config.request_timeout)
            .await
    };

    match attempt.await {
        Ok(Command::RequestResponse { result }) => {
            trace!(%leader, ok = result.is_ok(), "request completed");
            result
        }
        Ok(other) => {
            debug!(%leader, ?other, "unexpected reply to request");
            node.quorum.lock().mark_dead(leader);
            Err(ErrorCode::ProtocolError)
        }
        Err(e) => {
            debug!(%leader, %e, "request transport failed");
            node.quorum.lock().mark_dead(leader);
            Err(e.error_code())
        }
    }
}
