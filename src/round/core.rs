//! Pure accounting for one leader-driven round — no I/O, no async.

use bytes::Bytes;

use crate::types::ProposalId;

/// Result of folding one phase-1 reply into the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PrepareStep {
    Pending,
    /// A majority promised; `value` is what the accept phase must carry —
    /// either the highest previously-accepted workload or our own.
    Quorum { value: Bytes },
    /// A follower already promised something higher.
    Rejected { promised: ProposalId },
}

/// Result of folding one phase-2 reply into the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AcceptStep {
    Pending,
    /// A majority accepted; the workload is chosen.
    Chosen,
    Rejected { promised: ProposalId },
}

#[derive(Debug, PartialEq, Eq)]
enum Phase {
    Preparing,
    Accepting,
    Done,
}

/// Tracks one proposal through its prepare and accept phases.
///
/// The driver feeds replies in as they arrive; the core decides when the
/// majority threshold is crossed and which workload survives. Classical
/// Paxos value adoption: if any promise carried a previously accepted pair
/// above the committed floor, the one with the highest proposal id replaces
/// our own workload. Pairs at or below the floor belong to decrees this
/// leader already saw commit, so they are history rather than an in-flight
/// value that must be rescued.
#[derive(Debug)]
pub(crate) struct RoundCore {
    value: Bytes,
    majority: usize,
    committed_floor: Option<ProposalId>,
    phase: Phase,
    promises: usize,
    best_accepted: Option<(ProposalId, Bytes)>,
    accepts: usize,
}

impl RoundCore {
    pub(crate) fn new(
        workload: Bytes,
        majority: usize,
        committed_floor: Option<ProposalId>,
    ) -> Self {
        Self {
            value: workload,
            majority,
            committed_floor,
            phase: Phase::Preparing,
            promises: 0,
            best_accepted: None,
            accepts: 0,
        }
    }

    /// The workload the accept phase carries. Only meaningful once the
    /// prepare phase reported `Quorum`.
    #[cfg(test)]
    pub(crate) fn value(&self) -> &Bytes {
        &self.value
    }

    pub(crate) fn handle_promise(
        &mut self,
        previously_accepted: Option<(ProposalId, Bytes)>,
    ) -> PrepareStep {
        if self.phase != Phase::Preparing {
            return PrepareStep::Pending;
        }
        if let Some((id, workload)) = previously_accepted {
            let undecided = self.committed_floor.is_none_or(|floor| id > floor);
            let higher = self
                .best_accepted
                .as_ref()
                .is_none_or(|(best, _)| id > *best);
            if undecided && higher {
                self.best_accepted = Some((id, workload));
            }
        }
        self.promises += 1;
        if self.promises >= self.majority {
            if let Some((_, workload)) = self.best_accepted.take() {
                self.value = workload;
            }
            self.phase = Phase::Accepting;
            PrepareStep::Quorum {
                value: self.value.clone(),
            }
        } else {
            PrepareStep::Pending
        }
    }

    pub(crate) fn handle_prepare_reject(&mut self, promised: ProposalId) -> PrepareStep {
        PrepareStep::Rejected { promised }
    }

    pub(crate) fn handle_accepted(&mut self) -> AcceptStep {
        if self.phase != Phase::Accepting {
            return AcceptStep::Pending;
        }
        self.accepts += 1;
        if self.accepts >= self.majority {
            self.phase = Phase::Done;
            AcceptStep::Chosen
        } else {
            AcceptStep::Pending
        }
    }

    pub(crate) fn handle_accept_reject(&mut self, promised: ProposalId) -> AcceptStep {
        AcceptStep::Rejected { promised }
    }
}
