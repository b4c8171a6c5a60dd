//! The participating replica: listener, command dispatch, host callback.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::command::{Command, ErrorCode};
use crate::config::Config;
use crate::connection::Connection;
use crate::election;
use crate::heartbeat;
use crate::node::NodeState;
use crate::quorum::Quorum;
use crate::round;
use crate::strategy::{AcceptAction, FollowerStrategy, PrepareAction, make_strategy};
use crate::types::Endpoint;

/// Executes a committed workload on this replica and produces the response
/// bytes. Must be deterministic across replicas.
pub type Callback = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// One replica of the quorum, embedded in a host process.
///
/// Construct it with the local endpoint and the host callback, `add` the
/// full membership (itself included), then `start`. The server participates
/// in heartbeats and elections, follows rounds driven by whichever peer
/// leads, and drives rounds itself while it holds leadership.
pub struct Server {
    node: Arc<NodeState>,
    callback: Callback,
    endpoint: Endpoint,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server with default configuration.
    pub fn new<F>(host: IpAddr, port: u16, callback: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::with_config(host, port, callback, Config::default())
    }

    pub fn with_config<F>(host: IpAddr, port: u16, callback: F, config: Config) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let endpoint = Endpoint::new(host, port);
        Self {
            node: NodeState::new(Quorum::server(endpoint), config),
            callback: Arc::new(callback),
            endpoint,
            tasks: Vec::new(),
        }
    }

    /// Register a quorum member. Call for the full membership, including this
    /// server's own endpoint, before `start`.
    pub fn add(&self, endpoint: impl Into<Endpoint>) {
        self.node.quorum.lock().add(endpoint.into());
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Bind the listener and launch the protocol tasks.
    pub async fn start(&mut self) -> io::Result<()> {
        if !self.tasks.is_empty() {
            return Ok(());
        }
        let listener = TcpListener::bind(std::net::SocketAddr::from(self.endpoint)).await?;
        debug!(endpoint = %self.endpoint, "server listening");

        self.tasks.push(tokio::spawn(accept_loop(
            self.node.clone(),
            self.callback.clone(),
            listener,
        )));
        self.tasks
            .push(tokio::spawn(heartbeat::run(self.node.clone(), true)));
        Ok(())
    }

    /// Stop participating: cancel the protocol tasks and drop every
    /// connection. Pending conversations with this server fail with a closed
    /// connection.
    pub async fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.node.pool.close_all().await;
        debug!(endpoint = %self.endpoint, "server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Accept inbound connections and run one dispatch loop per connection.
/// Dropping this task aborts every per-connection loop with it.
async fn accept_loop(node: Arc<NodeState>, callback: Callback, listener: TcpListener) {
    let mut connections = JoinSet::new();
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "accepted connection");
                connections.spawn(handle_connection(node.clone(), callback.clone(), stream));
            }
            Err(e) => {
                warn!(%e, "accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
        // Reap loops that already finished.
        while connections.try_join_next().is_some() {}
    }
}

/// Process commands from one peer or client in arrival order until the
/// channel closes or a command forces us to drop it.
async fn handle_connection(node: Arc<NodeState>, callback: Callback, stream: TcpStream) {
    let mut connection = Connection::from_stream(stream);
    let mut strategy = make_strategy(node.config.strategy_factory.as_ref());

    loop {
        let command = match connection.read_next().await {
            Ok(command) => command,
            Err(e) => {
                debug!(%e, "connection finished");
                return;
            }
        };

        let reply = match dispatch(&node, &callback, strategy.as_mut(), command).await {
            Dispatch::Reply(reply) => reply,
            Dispatch::Silent => continue,
            Dispatch::Drop => {
                connection.close().await;
                return;
            }
        };
        if let Err(e) = connection.write(reply).await {
            debug!(%e, "reply failed");
            return;
        }
    }
}

enum Dispatch {
    Reply(Command),
    Silent,
    Drop,
}

async fn dispatch(
    node: &NodeState,
    callback: &Callback,
    strategy: &mut dyn FollowerStrategy,
    command: Command,
) -> Dispatch {
    match command {
        Command::HandshakeStart { .. } => {
            Dispatch::Reply(heartbeat::receive_handshake(&node.quorum.lock()))
        }
        Command::LeaderClaim { claimer } => {
            Dispatch::Reply(election::receive_claim(&mut node.quorum.lock(), claimer))
        }
        Command::LeaderAnnounce { leader } => {
            heartbeat::receive_announce(&mut node.quorum.lock(), leader);
            Dispatch::Silent
        }
        Command::RequestInitiate { workload } => {
            let leading = node.quorum.lock().we_are_the_leader();
            let result = if leading {
                round::run(node, workload).await
            } else {
                Err(ErrorCode::NotLeader)
            };
            Dispatch::Reply(Command::RequestResponse { result })
        }
        Command::Prepare { proposal } => {
            let action = {
                let quorum = node.quorum.lock();
                let mut context = node.context.lock();
                strategy.on_prepare(&quorum, &mut context, proposal)
            };
            match action {
                PrepareAction::Promise {
                    previously_accepted,
                } => Dispatch::Reply(Command::Promise {
                    proposal,
                    previously_accepted,
                }),
                PrepareAction::Reject { promised } => {
                    Dispatch::Reply(Command::PrepareReject { proposal, promised })
                }
                PrepareAction::Close => Dispatch::Drop,
            }
        }
        Command::Accept { proposal, workload } => {
            let action = {
                let quorum = node.quorum.lock();
                let mut context = node.context.lock();
                strategy.on_accept(&quorum, &mut context, proposal, workload.clone())
            };
            match action {
                AcceptAction::Accept => {
                    // The accepted workload takes effect on this replica.
                    let response = Bytes::from(callback(&workload));
                    Dispatch::Reply(Command::Accepted { proposal, response })
                }
                AcceptAction::Reject { promised } => {
                    Dispatch::Reply(Command::AcceptReject { proposal, promised })
                }
                AcceptAction::Close => Dispatch::Drop,
            }
        }
        other => {
            // Commands that only ever flow the other way are a protocol
            // violation; drop the connection rather than guess.
            warn!(?other, "unexpected inbound command");
            Dispatch::Drop
        }
    }
}
