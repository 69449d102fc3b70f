//! Negotiation of a single trade between a taker and a maker.
//!
//! Each trade is a [TradeSession] owned by the [TradeProtocol] actor. Sessions move through
//! `Initiated → AwaitingCounterpartySignature → ContractSigned → Completed` on the taker side
//! (the maker goes straight from `Initiated` to `ContractSigned`), and any non-terminal
//! session can fail. Terminal sessions are kept until their ttl runs out so that late or
//! duplicate messages are acknowledged without effect.

mod message;
mod protocol;
mod session;

pub use message::{TradeMessage, TradePayload, MAX_SIZE_BYTES, TTL_MILLIS, TYPE_TAGS};
pub use protocol::{
    Cancel, ExpireSessions, Finalize, GetSession, Outcome, ReceiveTradeMessage, ResendPending,
    RestoreSessions, SubscribeEvents, TakeOffer, TradeEvent, TradeEventKind, TradeProtocol,
};
pub use session::{FailureReason, FailureRecord, Role, TradeSession, TradeState};

use crate::id::Id;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The counterparty did not answer within the session ttl.
    Timeout,
    /// A response from the wrong peer, for another contract or signed by the wrong key.
    MismatchedResponse,
    InvalidSignature,
    /// The contract itself is unacceptable.
    InvalidContract(String),
    UnknownTrade(Id),
    DuplicateTrade(Id),
    InvalidTransition { from: TradeState, to: TradeState },
    /// The message needs this node to be the maker (or taker) of the contract and it is not.
    WrongParty,
    NothingPending,
    Delivery(crate::p2p::Error),
    Cancelled(String),
    Codec(crate::codec::Error),
    Store(String),
    Mailbox,
}

impl std::error::Error for Error {}

impl std::convert::From<crate::p2p::Error> for Error {
    fn from(error: crate::p2p::Error) -> Self {
        Error::Delivery(error)
    }
}

impl std::convert::From<crate::codec::Error> for Error {
    fn from(error: crate::codec::Error) -> Self {
        Error::Codec(error)
    }
}

impl std::convert::From<crate::store::Error> for Error {
    fn from(error: crate::store::Error) -> Self {
        Error::Store(format!("{}", error))
    }
}

impl std::convert::From<actix::MailboxError> for Error {
    fn from(_: actix::MailboxError) -> Self {
        Error::Mailbox
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
