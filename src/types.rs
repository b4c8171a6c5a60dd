//! Core identity types: peer endpoints and proposal identifiers.

use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Network identity of a peer — host address plus port.
///
/// Endpoints are the stable identity used in every protocol exchange: quorum
/// membership, leader claims, and proposal tie-breaking all key on them.
/// Ordering is lexicographic over `(host, port)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Endpoint {
    host: IpAddr,
    port: u16,
}

impl Endpoint {
    #[must_use]
    pub const fn new(host: IpAddr, port: u16) -> Self {
        Self { host, port }
    }

    #[must_use]
    pub const fn host(&self) -> IpAddr {
        self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        SocketAddr::new(endpoint.host, endpoint.port)
    }
}

impl From<(IpAddr, u16)> for Endpoint {
    fn from((host, port): (IpAddr, u16)) -> Self {
        Self::new(host, port)
    }
}

impl FromStr for Endpoint {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self::from)
    }
}

/// Identifier of one Paxos round attempt.
///
/// Totally ordered by `(sequence, proposer)` — the derived ordering compares
/// fields in declaration order, so the sequence dominates and the proposer
/// endpoint breaks ties between competing leaders.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProposalId {
    sequence: u64,
    proposer: Endpoint,
}

impl ProposalId {
    #[must_use]
    pub const fn new(sequence: u64, proposer: Endpoint) -> Self {
        Self { sequence, proposer }
    }

    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    #[must_use]
    pub const fn proposer(&self) -> Endpoint {
        self.proposer
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.sequence, self.proposer)
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_endpoint_order_is_host_then_port() {
        let a = Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 9000);
        let b = Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 1000);
        assert!(a < b);
        assert!(endpoint(1337) < endpoint(1338));
    }

    #[test]
    fn test_endpoint_parse_round_trip() {
        let parsed: Endpoint = "127.0.0.1:1337".parse().unwrap();
        assert_eq!(parsed, endpoint(1337));
        assert_eq!(parsed.to_string(), "127.0.0.1:1337");
    }

    #[test]
    fn test_proposal_sequence_dominates() {
        let low = ProposalId::new(1, endpoint(1339));
        let high = ProposalId::new(2, endpoint(1337));
        assert!(low < high);
    }

    #[test]
    fn test_proposal_endpoint_breaks_ties() {
        let a = ProposalId::new(7, endpoint(1337));
        let b = ProposalId::new(7, endpoint(1338));
        assert!(a < b);
        assert_eq!(a.cmp(&a), std::cmp::Ordering::Equal);
    }
}
