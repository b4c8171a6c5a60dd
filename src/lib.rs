//! Basic Paxos replicated state machine over TCP.
//!
//! A fixed set of peer processes — the quorum — agrees on a totally ordered
//! sequence of opaque byte-string workloads submitted by external clients.
//! Every replica hands each committed workload to a host-supplied callback,
//! so deterministic callbacks keep replica state identical everywhere.
//!
//! # Architecture
//!
//! - A **heartbeat engine** on every node probes the membership, maintains
//!   the local liveness view, and triggers recovery.
//! - An **election** names the highest live endpoint leader; the leader
//!   periodically announces itself.
//! - The leader drives the classical **prepare/promise, accept/accepted**
//!   dialogue for each client workload, one round in flight at a time.
//! - A client funnels submissions through a **single-flight request queue**
//!   with retry-on-failure semantics.
//!
//! Framing is a 4-byte big-endian length prefix followed by one
//! postcard-serialized [`Command`]; any reliable bidirectional stream could
//! carry it, and this crate runs it over plain TCP.
//!
//! # Example
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! use basic_paxos::{Client, Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
//!     let callback = |workload: &[u8]| workload.to_ascii_uppercase();
//!
//!     let mut servers = Vec::new();
//!     for port in [1337, 1338, 1339] {
//!         let server = Server::new(host, port, callback);
//!         for member in [1337, 1338, 1339] {
//!             server.add((host, member));
//!         }
//!         servers.push(server);
//!     }
//!     for server in &mut servers {
//!         server.start().await?;
//!     }
//!
//!     let client = Client::new(Config::default());
//!     for port in [1337, 1338, 1339] {
//!         client.add((host, port));
//!     }
//!     client.start();
//!     client.wait_until_quorum_ready().await;
//!
//!     let response = client.send("foo", 3).await.expect("quorum is up");
//!     assert_eq!(&response[..], b"FOO");
//!     Ok(())
//! }
//! ```

mod client;
mod codec;
mod command;
mod config;
mod connection;
mod context;
mod election;
mod error;
mod heartbeat;
mod node;
mod quorum;
mod request;
mod round;
mod server;
mod strategy;
mod types;

pub use crate::client::Client;
pub use crate::command::{Command, ErrorCode};
pub use crate::config::Config;
pub use crate::context::{AcceptOutcome, PaxosContext, PrepareOutcome};
pub use crate::error::{ConnectionError, SendError};
pub use crate::quorum::{Liveness, PeerView, Quorum};
pub use crate::server::{Callback, Server};
pub use crate::strategy::{
    AcceptAction, BasicPaxos, FollowerStrategy, PrepareAction, StrategyFactory,
};
pub use crate::types::{Endpoint, ProposalId};
