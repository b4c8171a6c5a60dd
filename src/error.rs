//! Error types for transport failures and terminal client outcomes.

use std::fmt;
use std::io;

use crate::command::ErrorCode;

/// Failure of a single framed connection or conversation.
#[derive(Debug)]
pub enum ConnectionError {
    /// Establishing the TCP connection failed.
    Connect(String),
    /// A frame could not be encoded or decoded.
    Codec(String),
    /// The underlying socket failed mid-stream.
    Io(io::Error),
    /// The peer closed the channel.
    Closed,
    /// No reply arrived within the deadline.
    Timeout,
}

impl ConnectionError {
    /// Collapse a transport failure into the wire-level error code reported
    /// to clients.
    pub(crate) fn error_code(&self) -> ErrorCode {
        match self {
            ConnectionError::Timeout => ErrorCode::Timeout,
            ConnectionError::Codec(_) => ErrorCode::ProtocolError,
            ConnectionError::Connect(_) | ConnectionError::Io(_) | ConnectionError::Closed => {
                ErrorCode::ConnectionClosed
            }
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Connect(e) => write!(f, "connection failed: {e}"),
            ConnectionError::Codec(e) => write!(f, "codec error: {e}"),
            ConnectionError::Io(e) => write!(f, "IO error: {e}"),
            ConnectionError::Closed => f.write_str("connection closed"),
            ConnectionError::Timeout => f.write_str("timed out waiting for reply"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::InvalidData {
            ConnectionError::Codec(e.to_string())
        } else {
            ConnectionError::Io(e)
        }
    }
}

/// Terminal outcome of [`Client::send`](crate::Client::send).
///
/// Transient failures are retried inside the request pipeline; only these
/// two states ever reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The quorum has no stable leader or fewer than a majority of peers
    /// alive. Not retried.
    NotReady,
    /// All retries were exhausted without a successful round.
    RequestError,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotReady => f.write_str("quorum is not ready"),
            SendError::RequestError => f.write_str("request failed after all retries"),
        }
    }
}

impl std::error::Error for SendError {}
