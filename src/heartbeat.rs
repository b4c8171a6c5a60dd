//! Periodic liveness handshake, election trigger, leadership announcement.
//!
//! One engine runs per embedded node. Each tick probes every peer; a
//! participating server then recovers leadership if the quorum lost it and
//! re-announces it if we hold it. The engine is the only component that
//! flips liveness from handshake results; the round machinery may still mark
//! a peer suspect when a conversation with it fails mid-round.

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::election;
use crate::node::NodeState;
use crate::quorum::Quorum;
use crate::types::Endpoint;

/// Drive the heartbeat loop until the owning handle aborts the task.
///
/// `participant` is true for servers, which elect and announce; a client
/// only observes liveness and leader claims.
pub(crate) async fn run(node: Arc<NodeState>, participant: bool) {
    let mut ticker = tokio::time::interval(node.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        tick(&node, participant).await;
    }
}

/// One heartbeat round. Ticks never overlap: the loop awaits each in full.
async fn tick(node: &NodeState, participant: bool) {
    handshake(node).await;

    if participant && node.quorum.lock().needs_new_leader() {
        debug!("quorum needs a new leader");
        node.quorum.lock().reset_state();
        election::run(node).await;
    }

    if participant && node.quorum.lock().we_are_the_leader() {
        announce(node).await;
    }
}

/// Probe every remote member, marking responders alive (recording their
/// leader claim) and silent peers dead.
async fn handshake(node: &NodeState) {
    let (us, peers, leader) = {
        let quorum = node.quorum.lock();
        (
            quorum.our_endpoint(),
            quorum.members().collect::<Vec<_>>(),
            quorum.our_claim(),
        )
    };

    let probes = peers
        .into_iter()
        .filter(|peer| Some(*peer) != us)
        .map(|peer| async move {
            let reply = node
                .pool
                .call(
                    peer,
                    Command::HandshakeStart { leader },
                    node.config.request_timeout,
                )
                .await;
            (peer, reply)
        });

    for (peer, reply) in join_all(probes).await {
        match reply {
            Ok(Command::HandshakeResponse { leader }) => {
                trace!(%peer, ?leader, "peer is alive");
                let mut quorum = node.quorum.lock();
                quorum.mark_alive(peer);
                quorum.note_claim(peer, leader);
            }
            Ok(other) => {
                warn!(%peer, ?other, "unexpected handshake reply");
                node.quorum.lock().mark_dead(peer);
                node.pool.evict(peer).await;
            }
            Err(e) => {
                trace!(%peer, %e, "peer is unreachable");
                node.quorum.lock().mark_dead(peer);
            }
        }
    }
}

/// Broadcast our leadership to every live peer, keeping an open outgoing
/// connection to each of them.
async fn announce(node: &NodeState) {
    let (us, peers) = {
        let quorum = node.quorum.lock();
        (quorum.our_endpoint(), quorum.alive_members().collect::<Vec<_>>())
    };
    let Some(us) = us else { return };

    let casts = peers
        .into_iter()
        .filter(|peer| *peer != us)
        .map(|peer| async move {
            (
                peer,
                node.pool
                    .cast(peer, Command::LeaderAnnounce { leader: us })
                    .await,
            )
        });

    for (peer, result) in join_all(casts).await {
        if let Err(e) = result {
            debug!(%peer, %e, "announce failed");
        }
    }
}

/// Answer an inbound probe with our current leader claim.
pub(crate) fn receive_handshake(quorum: &Quorum) -> Command {
    Command::HandshakeResponse {
        leader: quorum.our_claim(),
    }
}

/// The established leader reminded us who leads.
pub(crate) fn receive_announce(quorum: &mut Quorum, leader: Endpoint) {
    trace!(%leader, "leadership announced");
    quorum.claim_for_ourselves(Some(leader));
    quorum.note_claim(leader, Some(leader));
}
