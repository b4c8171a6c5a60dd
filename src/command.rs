//! Wire commands exchanged between replicas and clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{Endpoint, ProposalId};

/// One protocol message. Every frame on the wire is exactly one `Command`.
///
/// The variants cover three dialogues: the heartbeat handshake and leadership
/// traffic, the client request round-trip, and the prepare/promise and
/// accept/accepted exchanges of a Paxos round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Heartbeat probe. Carries the sender's current leader claim so the
    /// responder can observe it.
    HandshakeStart { leader: Option<Endpoint> },
    /// Reply to a probe, carrying the responder's current leader claim.
    HandshakeResponse { leader: Option<Endpoint> },
    /// A candidate asserting leadership of the quorum.
    LeaderClaim { claimer: Endpoint },
    /// The recipient accepts the claim.
    LeaderClaimAck,
    /// The recipient refuses, naming the endpoint it would rather follow.
    LeaderClaimReject { preferred: Endpoint },
    /// The established leader reminding a peer who leads.
    LeaderAnnounce { leader: Endpoint },
    /// A client asking the leader to run one round for this workload.
    RequestInitiate { workload: Bytes },
    /// Terminal answer to a `RequestInitiate`.
    RequestResponse { result: Result<Bytes, ErrorCode> },
    /// Phase 1a.
    Prepare { proposal: ProposalId },
    /// Phase 1b success: a promise not to accept anything below `proposal`,
    /// returning whatever this follower previously accepted.
    Promise {
        proposal: ProposalId,
        previously_accepted: Option<(ProposalId, Bytes)>,
    },
    /// Phase 1b refusal: a higher proposal was already promised.
    PrepareReject {
        proposal: ProposalId,
        promised: ProposalId,
    },
    /// Phase 2a.
    Accept {
        proposal: ProposalId,
        workload: Bytes,
    },
    /// Phase 2b success. `response` is the host callback's output for the
    /// accepted workload, so the leader can answer the client without
    /// re-running its own callback.
    Accepted {
        proposal: ProposalId,
        response: Bytes,
    },
    /// Phase 2b refusal.
    AcceptReject {
        proposal: ProposalId,
        promised: ProposalId,
    },
}

/// Protocol-level failure codes, carried on the wire and surfaced at the
/// client API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NoMajority,
    Conflict,
    Timeout,
    ConnectionClosed,
    NotLeader,
    ProtocolError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NoMajority => "no majority",
            ErrorCode::Conflict => "conflict",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectionClosed => "connection closed",
            ErrorCode::NotLeader => "not leader",
            ErrorCode::ProtocolError => "protocol error",
        };
        f.write_str(name)
    }
}
