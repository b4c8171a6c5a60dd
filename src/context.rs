//! Per-replica Paxos round state.

use bytes::Bytes;

use crate::types::{Endpoint, ProposalId};

/// Outcome of a phase-1 `prepare` against the local context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The proposal was promised. Carries whatever this replica previously
    /// accepted so the proposer can adopt it.
    Promised {
        previously_accepted: Option<(ProposalId, Bytes)>,
    },
    /// A proposal at least as high was already promised.
    Rejected { promised: ProposalId },
}

/// Outcome of a phase-2 `accept` against the local context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    /// A strictly higher proposal was promised after this one was prepared.
    Rejected { promised: ProposalId },
}

/// The replica's durable view of the prepare/accept dialogue:
/// the highest proposal promised, and the highest accepted with its workload.
///
/// All fields are monotone — transitions only ever move them upward, so the
/// context never rolls back no matter how messages are reordered. The context
/// also tracks the highest proposal *sequence* it has ever observed from any
/// source (including rejects reported by other replicas), which is the floor
/// for the next locally chosen proposal, and the last proposal this node
/// committed as leader, which closes that decree: an accepted value at or
/// below it is decided history, not an in-flight value a new round must
/// adopt.
#[derive(Debug, Default)]
pub struct PaxosContext {
    promised: Option<ProposalId>,
    accepted: Option<(ProposalId, Bytes)>,
    highest_seen: u64,
    last_committed: Option<ProposalId>,
}

impl PaxosContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn promised(&self) -> Option<ProposalId> {
        self.promised
    }

    #[must_use]
    pub fn accepted(&self) -> Option<&(ProposalId, Bytes)> {
        self.accepted.as_ref()
    }

    /// Phase 1: promise `proposal` iff it is strictly higher than anything
    /// promised before.
    pub fn prepare(&mut self, proposal: ProposalId) -> PrepareOutcome {
        self.observe_sequence(proposal.sequence());
        match self.promised {
            Some(promised) if proposal <= promised => PrepareOutcome::Rejected { promised },
            _ => {
                self.promised = Some(proposal);
                PrepareOutcome::Promised {
                    previously_accepted: self.accepted.clone(),
                }
            }
        }
    }

    /// Phase 2: accept `proposal` iff no strictly higher proposal has been
    /// promised since.
    pub fn accept(&mut self, proposal: ProposalId, workload: Bytes) -> AcceptOutcome {
        self.observe_sequence(proposal.sequence());
        match self.promised {
            Some(promised) if proposal < promised => AcceptOutcome::Rejected { promised },
            _ => {
                self.accepted = Some((proposal, workload));
                AcceptOutcome::Accepted
            }
        }
    }

    /// Pick a proposal id for a new round: strictly above every sequence this
    /// replica has observed, tie-broken by our own endpoint.
    pub fn next_proposal(&mut self, us: Endpoint) -> ProposalId {
        let sequence = self.highest_seen + 1;
        self.highest_seen = sequence;
        ProposalId::new(sequence, us)
    }

    /// Raise the floor for future proposals; used when a reject reports a
    /// higher promise elsewhere in the quorum.
    pub fn observe_sequence(&mut self, sequence: u64) {
        self.highest_seen = self.highest_seen.max(sequence);
    }

    #[must_use]
    pub fn last_committed(&self) -> Option<ProposalId> {
        self.last_committed
    }

    /// Close the decree committed at `proposal`: a majority accepted it and
    /// the workload was applied everywhere it was accepted.
    pub fn record_commit(&mut self, proposal: ProposalId) {
        if self.last_committed.is_none_or(|committed| proposal > committed) {
            self.last_committed = Some(proposal);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn proposal(sequence: u64, port: u16) -> ProposalId {
        ProposalId::new(sequence, endpoint(port))
    }

    #[test]
    fn test_prepare_fresh_context_promises() {
        let mut context = PaxosContext::new();
        let outcome = context.prepare(proposal(1, 1339));
        assert_eq!(
            outcome,
            PrepareOutcome::Promised {
                previously_accepted: None
            }
        );
        assert_eq!(context.promised(), Some(proposal(1, 1339)));
    }

    #[test]
    fn test_prepare_lower_or_equal_rejected() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(5, 1339));

        assert_eq!(
            context.prepare(proposal(4, 1338)),
            PrepareOutcome::Rejected {
                promised: proposal(5, 1339)
            }
        );
        // Equal proposals are also rejected; the promise is not re-issued.
        assert_eq!(
            context.prepare(proposal(5, 1339)),
            PrepareOutcome::Rejected {
                promised: proposal(5, 1339)
            }
        );
    }

    #[test]
    fn test_promised_never_decreases() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(3, 1339));
        context.prepare(proposal(1, 1337));
        context.prepare(proposal(2, 1338));
        assert_eq!(context.promised(), Some(proposal(3, 1339)));
    }

    #[test]
    fn test_prepare_returns_previous_accept() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(1, 1337));
        context.accept(proposal(1, 1337), Bytes::from_static(b"old"));

        let outcome = context.prepare(proposal(2, 1339));
        assert_eq!(
            outcome,
            PrepareOutcome::Promised {
                previously_accepted: Some((proposal(1, 1337), Bytes::from_static(b"old")))
            }
        );
    }

    #[test]
    fn test_accept_at_promise_level_succeeds() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(2, 1339));
        let outcome = context.accept(proposal(2, 1339), Bytes::from_static(b"foo"));
        assert_eq!(outcome, AcceptOutcome::Accepted);
        assert_eq!(
            context.accepted(),
            Some(&(proposal(2, 1339), Bytes::from_static(b"foo")))
        );
    }

    #[test]
    fn test_accept_below_promise_rejected() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(3, 1339));
        let outcome = context.accept(proposal(2, 1338), Bytes::from_static(b"foo"));
        assert_eq!(
            outcome,
            AcceptOutcome::Rejected {
                promised: proposal(3, 1339)
            }
        );
        assert!(context.accepted().is_none());
    }

    #[test]
    fn test_next_proposal_exceeds_observed() {
        let mut context = PaxosContext::new();
        context.prepare(proposal(7, 1338));
        let next = context.next_proposal(endpoint(1339));
        assert_eq!(next, proposal(8, 1339));
    }

    #[test]
    fn test_observe_sequence_raises_floor() {
        let mut context = PaxosContext::new();
        context.observe_sequence(41);
        assert_eq!(context.next_proposal(endpoint(1339)).sequence(), 42);
        // Observing something lower changes nothing.
        context.observe_sequence(3);
        assert_eq!(context.next_proposal(endpoint(1339)).sequence(), 43);
    }

    #[test]
    fn test_record_commit_is_monotone() {
        let mut context = PaxosContext::new();
        context.record_commit(proposal(4, 1339));
        context.record_commit(proposal(2, 1338));
        assert_eq!(context.last_committed(), Some(proposal(4, 1339)));
        context.record_commit(proposal(5, 1339));
        assert_eq!(context.last_committed(), Some(proposal(5, 1339)));
    }
}
