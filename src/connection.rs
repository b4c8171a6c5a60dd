//! Framed command channels and the per-endpoint connection pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::CommandCodec;
use crate::command::Command;
use crate::error::ConnectionError;
use crate::types::Endpoint;

/// A bidirectional, length-prefixed command channel over one TCP stream.
///
/// Writes pass through the codec's outbound buffer, so commands queued while
/// an earlier frame is still in flight drain FIFO behind it.
pub(crate) struct Connection {
    framed: Framed<TcpStream, CommandCodec>,
}

impl Connection {
    /// Dial `peer` within `timeout`.
    pub(crate) async fn connect(
        peer: Endpoint,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(std::net::SocketAddr::from(peer)))
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;
        trace!(%peer, "connected");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-accepted stream.
    pub(crate) fn from_stream(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, CommandCodec::new()),
        }
    }

    /// Send one command, flushing it out of the local socket buffer.
    pub(crate) async fn write(&mut self, command: Command) -> Result<(), ConnectionError> {
        self.framed.send(command).await.map_err(ConnectionError::from)
    }

    /// Receive the next complete command. A closed stream yields
    /// [`ConnectionError::Closed`]; a short or malformed frame is a codec
    /// error and poisons the channel.
    pub(crate) async fn read_next(&mut self) -> Result<Command, ConnectionError> {
        match self.framed.next().await {
            Some(Ok(command)) => Ok(command),
            Some(Err(e)) => Err(ConnectionError::from(e)),
            None => Err(ConnectionError::Closed),
        }
    }

    /// Receive with a deadline. Successful receipt ends the timed scope,
    /// which resets the deadline for whatever conversation follows.
    pub(crate) async fn read_next_timeout(
        &mut self,
        deadline: Duration,
    ) -> Result<Command, ConnectionError> {
        tokio::time::timeout(deadline, self.read_next())
            .await
            .map_err(|_| ConnectionError::Timeout)?
    }

    pub(crate) async fn close(&mut self) {
        let _ = self.framed.close().await;
    }
}

/// Outgoing connections keyed by endpoint, shared between the heartbeat
/// engine and the round state machine.
///
/// Each pooled connection sits behind its own async mutex: a conversation
/// (one write, one paired reply) locks the connection for its duration, which
/// both serializes writes and keeps replies matched to the request that
/// prompted them. Connections that fail a conversation are evicted so a stale
/// buffered reply can never leak into the next exchange.
pub(crate) struct ConnectionPool {
    connect_timeout: Duration,
    connections: Mutex<HashMap<Endpoint, Arc<Mutex<Connection>>>>,
}

impl ConnectionPool {
    pub(crate) fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Reuse the pooled connection to `peer`, dialing a fresh one if absent.
    pub(crate) async fn checkout(
        &self,
        peer: Endpoint,
    ) -> Result<Arc<Mutex<Connection>>, ConnectionError> {
        if let Some(connection) = self.connections.lock().await.get(&peer) {
            return Ok(connection.clone());
        }
        let connection = Arc::new(Mutex::new(
            Connection::connect(peer, self.connect_timeout).await?,
        ));
        self.connections
            .lock()
            .await
            .insert(peer, connection.clone());
        Ok(connection)
    }

    pub(crate) async fn evict(&self, peer: Endpoint) {
        if let Some(connection) = self.connections.lock().await.remove(&peer) {
            debug!(%peer, "evicting connection");
            connection.lock().await.close().await;
        }
    }

    /// One request/response conversation: send `command`, await the paired
    /// reply within `deadline`. Any failure evicts the connection.
    pub(crate) async fn call(
        &self,
        peer: Endpoint,
        command: Command,
        deadline: Duration,
    ) -> Result<Command, ConnectionError> {
        let connection = self.checkout(peer).await?;
        let result = {
            let mut connection = connection.lock().await;
            match connection.write(command).await {
                Ok(()) => connection.read_next_timeout(deadline).await,
                Err(e) => Err(e),
            }
        };
        if result.is_err() {
            self.evict(peer).await;
        }
        result
    }

    /// Fire-and-forget send, used for announcements that have no reply.
    /// Ensures an open connection to `peer` as a side effect.
    pub(crate) async fn cast(
        &self,
        peer: Endpoint,
        command: Command,
    ) -> Result<(), ConnectionError> {
        let connection = self.checkout(peer).await?;
        let result = connection.lock().await.write(command).await;
        if result.is_err() {
            self.evict(peer).await;
        }
        result
    }

    pub(crate) async fn close_all(&self) {
        let connections = std::mem::take(&mut *self.connections.lock().await);
        for (_, connection) in connections {
            connection.lock().await.close().await;
        }
    }
}
