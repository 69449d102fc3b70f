//! Peer connections: dialing with retries, the signed handshake, framed delivery and liveness.

pub mod connection;
pub mod handshake;
pub mod linear_backoff;
pub mod manager;
pub mod prelude;
pub mod sender;

pub use connection::{ConnectionHandle, ConnectionInfo};
pub use manager::{ConnectionManager, Inbound, ManagerConfig};
pub use sender::{Broadcast, Deliver, Sender};

use crate::codec;
use crate::network::{NetworkId, TransportKind};

/// Connection level failures. Cloneable so that every caller coalesced onto one connection
/// attempt receives the same outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The connection is gone; anything still queued on it was not sent.
    ConnectionClosed,
    Transport(String),
    UnsupportedTransport(TransportKind),
    Handshake(String),
    /// The responder proved an identity other than the one that was dialed.
    UnexpectedPeer { expected: NetworkId, actual: NetworkId },
    InvalidProof,
    Timeout,
    Cancelled,
    Codec(codec::Error),
    IO(String),
    Shutdown,
}

impl std::error::Error for Error {}

impl std::convert::From<crate::transport::Error> for Error {
    fn from(error: crate::transport::Error) -> Self {
        Error::Transport(format!("{}", error))
    }
}

impl std::convert::From<crate::channel::Error> for Error {
    fn from(error: crate::channel::Error) -> Self {
        match error {
            crate::channel::Error::IO(err) => Error::IO(format!("{}", err)),
            crate::channel::Error::Codec(err) => Error::Codec(err),
        }
    }
}

impl std::convert::From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl std::convert::From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
