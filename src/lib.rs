#[macro_use]
extern crate serde_derive;
#[macro_use(Message)]
extern crate actix_derive;
extern crate colored;

pub mod channel;
pub mod codec;
pub mod contract;
pub mod id;
pub mod network;
pub mod offer;
pub mod p2p;
pub mod protocol;
pub mod server;
pub mod store;
pub mod trade;
pub mod transport;
pub mod util;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Dalek(ed25519_dalek::ed25519::Error),
    Actix(actix::MailboxError),
    Config(config::ConfigError),

    // component errors
    Transport(transport::Error),
    Connection(p2p::Error),
    Store(store::Error),
    Codec(codec::Error),
    Trade(trade::Error),

    /// The node keypair file exists but does not hold a hex encoded keypair
    InvalidKeypair,
    /// Error caused by converting from a `String` to an `Id`, a transport kind or a peer
    TryFromStringError,
    /// Error when parsing a peer description `PUBKEY@HOST:PORT`
    PeerParseError,
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<ed25519_dalek::ed25519::Error> for Error {
    fn from(error: ed25519_dalek::ed25519::Error) -> Self {
        Error::Dalek(error)
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(error: actix::MailboxError) -> Self {
        Error::Actix(error)
    }
}

impl std::convert::From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::Config(error)
    }
}

impl std::convert::From<transport::Error> for Error {
    fn from(error: transport::Error) -> Self {
        Error::Transport(error)
    }
}

impl std::convert::From<p2p::Error> for Error {
    fn from(error: p2p::Error) -> Self {
        Error::Connection(error)
    }
}

impl std::convert::From<store::Error> for Error {
    fn from(error: store::Error) -> Self {
        Error::Store(error)
    }
}

impl std::convert::From<codec::Error> for Error {
    fn from(error: codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl std::convert::From<trade::Error> for Error {
    fn from(error: trade::Error) -> Self {
        Error::Trade(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
