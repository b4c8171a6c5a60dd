//! Leader-side round driver: one workload through prepare and accept.

mod core;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::command::{Command, ErrorCode};
use crate::node::NodeState;
use crate::types::Endpoint;

use self::core::{AcceptStep, PrepareStep, RoundCore};

/// Run one Paxos round for `workload` and return the committed response
/// bytes.
///
/// Rounds are single-flight per leader: the round lock is held from the
/// first prepare until the round terminates. Every alive member (including
/// the leader itself, over its own loopback connection) is a target, and a
/// transport failure or timeout from any of them fails the round — the
/// failing peer is marked suspect so the next attempt excludes it.
pub(crate) async fn run(node: &NodeState, workload: Bytes) -> Result<Bytes, ErrorCode> {
    let _flight = node.round_lock.lock().await;

    let (us, targets, majority) = {
        let quorum = node.quorum.lock();
        let Some(us) = quorum.our_endpoint() else {
            return Err(ErrorCode::NotLeader);
        };
        (
            us,
            quorum.alive_members().collect::<Vec<_>>(),
            quorum.majority(),
        )
    };
    if targets.len() < majority {
        return Err(ErrorCode::NoMajority);
    }

    let (proposal, committed_floor) = {
        let mut context = node.context.lock();
        (context.next_proposal(us), context.last_committed())
    };
    let mut core = RoundCore::new(workload, majority, committed_floor);
    debug!(%proposal, peers = targets.len(), "starting round");

    // Prepare phase.
    let replies = broadcast(node, &targets, Command::Prepare { proposal }).await;
    let mut quorum_value = None;
    let mut conflict = None;
    let mut failure = None;
    for (peer, reply) in replies {
        match reply {
            Ok(Command::Promise {
                proposal: for_proposal,
                previously_accepted,
            }) if for_proposal == proposal => {
                if let PrepareStep::Quorum { value } = core.handle_promise(previously_accepted) {
                    quorum_value = Some(value);
                }
            }
            Ok(Command::PrepareReject { promised, .. }) => {
                node.context.lock().observe_sequence(promised.sequence());
                core.handle_prepare_reject(promised);
                conflict = Some(promised);
            }
            Ok(other) => {
                warn!(%peer, ?other, "unexpected reply to prepare");
                suspect(node, peer).await;
                failure = Some(ErrorCode::ProtocolError);
            }
            Err(e) => {
                debug!(%peer, %e, "prepare failed");
                suspect(node, peer).await;
                failure = Some(e.error_code());
            }
        }
    }
    if let Some(promised) = conflict {
        debug!(%proposal, %promised, "round preempted during prepare");
        return Err(ErrorCode::Conflict);
    }
    if let Some(code) = failure {
        return Err(code);
    }
    let Some(value) = quorum_value else {
        return Err(ErrorCode::NoMajority);
    };

    // Accept phase, against the same responders.
    let replies = broadcast(
        node,
        &targets,
        Command::Accept {
            proposal,
            workload: value,
        },
    )
    .await;
    let mut chosen = false;
    let mut response = None;
    for (peer, reply) in replies {
        match reply {
            Ok(Command::Accepted {
                proposal: for_proposal,
                response: peer_response,
            }) if for_proposal == proposal => {
                record_response(&mut response, peer == us, peer_response);
                if core.handle_accepted() == AcceptStep::Chosen {
                    chosen = true;
                }
            }
            Ok(Command::AcceptReject { promised, .. }) => {
                node.context.lock().observe_sequence(promised.sequence());
                core.handle_accept_reject(promised);
                conflict = Some(promised);
            }
            Ok(other) => {
                warn!(%peer, ?other, "unexpected reply to accept");
                suspect(node, peer).await;
                failure = Some(ErrorCode::ProtocolError);
            }
            Err(e) => {
                debug!(%peer, %e, "accept failed");
                suspect(node, peer).await;
                failure = Some(e.error_code());
            }
        }
    }
    if let Some(promised) = conflict {
        debug!(%proposal, %promised, "round preempted during accept");
        return Err(ErrorCode::Conflict);
    }
    if let Some(code) = failure {
        return Err(code);
    }
    match (chosen, response) {
        (true, Some((_, response))) => {
            node.context.lock().record_commit(proposal);
            debug!(%proposal, "round committed");
            Ok(response)
        }
        _ => Err(ErrorCode::NoMajority),
    }
}

/// Send `command` to every target as its own conversation and collect all
/// replies. Each conversation is bounded by the request timeout.
async fn broadcast(
    node: &NodeState,
    targets: &[Endpoint],
    command: Command,
) -> Vec<(Endpoint, Result<Command, crate::error::ConnectionError>)> {
    join_all(targets.iter().map(|peer| {
        let command = command.clone();
        async move {
            (
                *peer,
                node.pool
                    .call(*peer, command, node.config.request_timeout)
                    .await,
            )
        }
    }))
    .await
}

async fn suspect(node: &NodeState, peer: Endpoint) {
    node.quorum.lock().mark_dead(peer);
    node.pool.evict(peer).await;
}

/// Keep the first response seen, preferring the leader's own replica.
/// Callbacks are deterministic so any accepted reply carries the same bytes;
/// the preference only matters if a host violates that.
fn record_response(response: &mut Option<(bool, Bytes)>, ours: bool, bytes: Bytes) {
    match response {
        Some((true, _)) => {}
        Some((false, _)) if !ours => {}
        _ => *response = Some((ours, bytes)),
    }
}
