//! Follower behavior behind the prepare/accept commands.
//!
//! The server routes incoming round messages through a [`FollowerStrategy`]
//! so tests can swap in fault-injecting behavior (drop the connection, lie,
//! go silent) without touching the protocol plumbing. Production uses
//! [`BasicPaxos`].

use std::sync::Arc;

use bytes::Bytes;

use crate::context::{AcceptOutcome, PaxosContext, PrepareOutcome};
use crate::quorum::Quorum;
use crate::types::ProposalId;

/// Decision for an incoming `prepare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareAction {
    Promise {
        previously_accepted: Option<(ProposalId, Bytes)>,
    },
    Reject {
        promised: ProposalId,
    },
    /// Drop the connection without replying.
    Close,
}

/// Decision for an incoming `accept`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptAction {
    /// Accept the workload; the server runs the host callback and replies.
    Accept,
    Reject {
        promised: ProposalId,
    },
    /// Drop the connection without replying.
    Close,
}

/// Per-connection follower behavior for the Paxos round dialogue.
///
/// Implementations receive the local quorum view and the mutable paxos
/// context; the default implementation applies the classical transition
/// table, and that is the only one that should ever run in production.
pub trait FollowerStrategy: Send {
    fn on_prepare(
        &mut self,
        quorum: &Quorum,
        context: &mut PaxosContext,
        proposal: ProposalId,
    ) -> PrepareAction;

    fn on_accept(
        &mut self,
        quorum: &Quorum,
        context: &mut PaxosContext,
        proposal: ProposalId,
        workload: Bytes,
    ) -> AcceptAction;
}

/// Produces one strategy per inbound connection.
pub type StrategyFactory = Arc<dyn Fn() -> Box<dyn FollowerStrategy> + Send + Sync>;

/// The classical Basic Paxos follower: promise anything strictly higher than
/// what was promised, accept anything not below it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPaxos;

impl FollowerStrategy for BasicPaxos {
    fn on_prepare(
        &mut self,
        _quorum: &Quorum,
        context: &mut PaxosContext,
        proposal: ProposalId,
    ) -> PrepareAction {
        match context.prepare(proposal) {
            PrepareOutcome::Promised {
                previously_accepted,
            } => PrepareAction::Promise {
                previously_accepted,
            },
            PrepareOutcome::Rejected { promised } => PrepareAction::Reject { promised },
        }
    }

    fn on_accept(
        &mut self,
        _quorum: &Quorum,
        context: &mut PaxosContext,
        proposal: ProposalId,
        workload: Bytes,
    ) -> AcceptAction {
        match context.accept(proposal, workload) {
            AcceptOutcome::Accepted => AcceptAction::Accept,
            AcceptOutcome::Rejected { promised } => AcceptAction::Reject { promised },
        }
    }
}

pub(crate) fn make_strategy(factory: Option<&StrategyFactory>) -> Box<dyn FollowerStrategy> {
    match factory {
        Some(factory) => factory(),
        None => Box::new(BasicPaxos),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::types::Endpoint;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_basic_paxos_follows_the_context() {
        let quorum = Quorum::server(endpoint(1337));
        let mut context = PaxosContext::new();
        let mut strategy = BasicPaxos;

        let first = ProposalId::new(1, endpoint(1339));
        assert_eq!(
            strategy.on_prepare(&quorum, &mut context, first),
            PrepareAction::Promise {
                previously_accepted: None
            }
        );
        assert_eq!(
            strategy.on_accept(&quorum, &mut context, first, Bytes::from_static(b"foo")),
            AcceptAction::Accept
        );

        let stale = ProposalId::new(1, endpoint(1338));
        assert_eq!(
            strategy.on_prepare(&quorum, &mut context, stale),
            PrepareAction::Reject { promised: first }
        );
    }
}
