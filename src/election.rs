//! Leader-claim arbitration: highest live endpoint wins.

use futures::future::join_all;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::node::NodeState;
use crate::quorum::Quorum;
use crate::types::Endpoint;

/// Run one election attempt, claiming leadership for ourselves.
///
/// Every node that notices a missing leader claims itself; recipients
/// arbitrate by endpoint order, so only the highest live endpoint can
/// collect a majority. Re-running with an unchanged live set converges on
/// the same winner, and losing candidates simply wait to observe it through
/// subsequent handshakes.
pub(crate) async fn run(node: &NodeState) {
    let (us, peers, majority) = {
        let quorum = node.quorum.lock();
        let Some(us) = quorum.our_endpoint() else {
            return;
        };
        (
            us,
            quorum
                .alive_members()
                .filter(|peer| *peer != us)
                .collect::<Vec<_>>(),
            quorum.majority(),
        )
    };

    debug!(candidate = %us, peers = peers.len(), "starting election");

    let claims = peers.into_iter().map(|peer| async move {
        let reply = node
            .pool
            .call(
                peer,
                Command::LeaderClaim { claimer: us },
                node.config.request_timeout,
            )
            .await;
        (peer, reply)
    });

    // Our own vote.
    let mut acks = 1;
    for (peer, reply) in join_all(claims).await {
        match reply {
            Ok(Command::LeaderClaimAck) => acks += 1,
            Ok(Command::LeaderClaimReject { preferred }) => {
                // Informative only; the preferred node will claim for itself.
                trace!(%peer, %preferred, "claim rejected");
            }
            Ok(other) => {
                warn!(%peer, ?other, "unexpected reply to leader claim");
                node.quorum.lock().mark_dead(peer);
                node.pool.evict(peer).await;
            }
            Err(e) => {
                trace!(%peer, %e, "claim delivery failed");
                node.quorum.lock().mark_dead(peer);
            }
        }
    }

    if acks >= majority {
        debug!(leader = %us, acks, "election won");
        node.quorum.lock().claim_for_ourselves(Some(us));
    } else {
        trace!(candidate = %us, acks, majority, "election lost");
    }
}

/// Arbitrate an inbound claim: accept anything at least as high as the
/// endpoint we would prefer to follow, otherwise name that endpoint.
pub(crate) fn receive_claim(quorum: &mut Quorum, claimer: Endpoint) -> Command {
    let preferred = quorum
        .our_claim()
        .into_iter()
        .chain(quorum.highest_alive())
        .max();
    match preferred {
        Some(preferred) if claimer < preferred => {
            trace!(%claimer, %preferred, "rejecting leader claim");
            Command::LeaderClaimReject { preferred }
        }
        _ => {
            trace!(%claimer, "accepting leader claim");
            quorum.claim_for_ourselves(Some(claimer));
            Command::LeaderClaimAck
        }
    }
}
