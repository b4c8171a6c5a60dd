//! Quorum membership and the local liveness/leadership view.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::types::Endpoint;

/// Liveness of a peer as observed by the local heartbeat engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Liveness {
    #[default]
    Unknown,
    Alive,
    Dead,
}

/// What the local node knows about one quorum member.
#[derive(Debug, Clone, Default)]
pub struct PeerView {
    liveness: Liveness,
    /// Which endpoint this peer last claimed as leader, if any.
    leader_claim: Option<Endpoint>,
    /// When the last successful handshake with this peer completed.
    last_seen: Option<Instant>,
}

impl PeerView {
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    #[must_use]
    pub fn leader_claim(&self) -> Option<Endpoint> {
        self.leader_claim
    }

    #[must_use]
    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }
}

/// The static membership set plus the dynamic per-peer view.
///
/// Membership is fixed before start; only liveness and leader claims change
/// afterwards. Leadership is a pure function of the views: an endpoint leads
/// when a strict majority of the membership, counting only peers currently
/// alive, claims it.
#[derive(Debug)]
pub struct Quorum {
    /// The local endpoint when this node is itself a member; a client
    /// observing the quorum from outside has none.
    us: Option<Endpoint>,
    members: BTreeMap<Endpoint, PeerView>,
}

impl Quorum {
    /// View owned by a participating server. The server itself is a member
    /// and permanently alive in its own view.
    #[must_use]
    pub fn server(us: Endpoint) -> Self {
        let mut quorum = Self {
            us: Some(us),
            members: BTreeMap::new(),
        };
        quorum.add(us);
        quorum.mark_alive(us);
        quorum
    }

    /// View owned by an external client: all members are remote.
    #[must_use]
    pub fn client() -> Self {
        Self {
            us: None,
            members: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn our_endpoint(&self) -> Option<Endpoint> {
        self.us
    }

    /// Register a member. Static configuration, pre-start only.
    pub fn add(&mut self, endpoint: Endpoint) {
        self.members.entry(endpoint).or_default();
    }

    pub fn mark_alive(&mut self, endpoint: Endpoint) {
        if let Some(view) = self.members.get_mut(&endpoint) {
            view.liveness = Liveness::Alive;
            view.last_seen = Some(Instant::now());
        }
    }

    pub fn mark_dead(&mut self, endpoint: Endpoint) {
        // Our own entry never transitions: a node does not suspect itself.
        if self.us == Some(endpoint) {
            return;
        }
        if let Some(view) = self.members.get_mut(&endpoint) {
            view.liveness = Liveness::Dead;
        }
    }

    /// Record that `claimer` asserts `leader` leads the quorum.
    pub fn record_leader_claim(&mut self, leader: Endpoint, claimer: Endpoint) {
        self.note_claim(claimer, Some(leader));
    }

    /// Record `claimer`'s current claim verbatim, including the absence of
    /// one (as reported in a handshake response).
    pub(crate) fn note_claim(&mut self, claimer: Endpoint, leader: Option<Endpoint>) {
        if let Some(view) = self.members.get_mut(&claimer) {
            view.leader_claim = leader;
        }
    }

    /// Record the local node's own claim. No-op for client views.
    pub(crate) fn claim_for_ourselves(&mut self, leader: Option<Endpoint>) {
        if let Some(us) = self.us {
            self.note_claim(us, leader);
        }
    }

    /// The local node's own current claim, if it is a member and has one.
    pub(crate) fn our_claim(&self) -> Option<Endpoint> {
        self.us
            .and_then(|us| self.view(us))
            .and_then(PeerView::leader_claim)
    }

    /// The endpoint named leader by a strict majority of the membership,
    /// counting only claims from peers currently alive.
    #[must_use]
    pub fn who_is_our_leader(&self) -> Option<Endpoint> {
        let mut tally: BTreeMap<Endpoint, usize> = BTreeMap::new();
        for view in self.members.values() {
            if view.liveness == Liveness::Alive {
                if let Some(leader) = view.leader_claim {
                    *tally.entry(leader).or_default() += 1;
                }
            }
        }
        tally
            .into_iter()
            .find(|(_, votes)| *votes >= self.majority())
            .map(|(leader, _)| leader)
    }

    /// True when recovery should run: there is no leader, or the one we had
    /// is no longer known to be alive.
    #[must_use]
    pub fn needs_new_leader(&self) -> bool {
        match self.who_is_our_leader() {
            None => true,
            Some(leader) => !self.is_alive(leader),
        }
    }

    #[must_use]
    pub fn we_are_the_leader(&self) -> bool {
        self.us.is_some() && self.who_is_our_leader() == self.us
    }

    /// True when a stable leader exists and a strict majority of members is
    /// alive — the quorum can serve requests.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let Some(leader) = self.who_is_our_leader() else {
            return false;
        };
        self.is_alive(leader) && self.alive_count() >= self.majority()
    }

    /// Forget all leader claims. Liveness is untouched; called when an
    /// election is about to start so stale claims cannot outvote it.
    pub fn reset_state(&mut self) {
        for view in self.members.values_mut() {
            view.leader_claim = None;
        }
    }

    #[must_use]
    pub fn is_alive(&self, endpoint: Endpoint) -> bool {
        self.members
            .get(&endpoint)
            .is_some_and(|view| view.liveness == Liveness::Alive)
    }

    /// Smallest strict majority of the static membership.
    #[must_use]
    pub fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.members
            .values()
            .filter(|view| view.liveness == Liveness::Alive)
            .count()
    }

    /// All members, in endpoint order.
    pub fn members(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.members.keys().copied()
    }

    /// Members currently alive, in endpoint order.
    pub fn alive_members(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.members
            .iter()
            .filter(|(_, view)| view.liveness == Liveness::Alive)
            .map(|(endpoint, _)| *endpoint)
    }

    /// Highest endpoint currently alive — the natural election winner.
    #[must_use]
    pub fn highest_alive(&self) -> Option<Endpoint> {
        self.alive_members().max()
    }

    #[must_use]
    pub fn view(&self, endpoint: Endpoint) -> Option<&PeerView> {
        self.members.get(&endpoint)
    }
}
