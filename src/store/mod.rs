//! Content-addressed message storage using [`sled`](http://docs.rs/sled/) as backend

mod message_store;
mod stored_message;

pub use message_store::{MessageStore, PutOutcome};
pub use stored_message::StoredMessage;

#[derive(Debug, PartialEq)]
pub enum Error {
    /// The payload is larger than its own `max_size_bytes`.
    OversizedMessage { size: u64, max: u64 },
    /// The content hash does not match the payload.
    HashMismatch,
    Bincode(String),
    Sled(sled::Error),
}

impl std::error::Error for Error {}

impl std::convert::From<Box<bincode::ErrorKind>> for Error {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        Error::Bincode(format!("{:?}", error))
    }
}

impl std::convert::From<sled::Error> for Error {
    fn from(error: sled::Error) -> Self {
        Error::Sled(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
