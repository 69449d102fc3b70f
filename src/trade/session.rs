use super::{Error, Result, TradeMessage, MAX_SIZE_BYTES, TTL_MILLIS};

use crate::codec;
use crate::contract::{Contract, ContractSignatureData};
use crate::id::Id;
use crate::network::NetworkId;
use crate::protocol::MetaData;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Taker,
    Maker,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TradeState {
    Initiated,
    AwaitingCounterpartySignature,
    ContractSigned,
    Completed,
    Failed,
}

impl TradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeState::Completed | TradeState::Failed)
    }

    fn can_move_to(&self, to: TradeState) -> bool {
        use TradeState::*;
        match (self, to) {
            (Initiated, AwaitingCounterpartySignature) => true,
            (Initiated, ContractSigned) => true,
            (AwaitingCounterpartySignature, ContractSigned) => true,
            (ContractSigned, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSession {
    pub trade_id: Id,
    pub peer: NetworkId,
    pub role: Role,
    pub state: TradeState,
    /// The last message this node sent and may have to send again.
    pub pending: Option<TradeMessage>,
    pub contract: Contract,
    pub own_signature: Option<ContractSignatureData>,
    pub peer_signature: Option<ContractSignatureData>,
    pub created_at: u64,
    pub last_transition_at: u64,
    pub ttl_millis: u64,
    pub failure: Option<Error>,
}

impl TradeSession {
    pub fn new(contract: Contract, role: Role, now: u64) -> Self {
        let peer = match role {
            Role::Taker => contract.maker().clone(),
            Role::Maker => contract.taker().clone(),
        };
        TradeSession {
            trade_id: contract.trade_id(),
            peer,
            role,
            state: TradeState::Initiated,
            pending: None,
            contract,
            own_signature: None,
            peer_signature: None,
            created_at: now,
            last_transition_at: now,
            ttl_millis: TTL_MILLIS,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transition(&mut self, to: TradeState, now: u64) -> Result<()> {
        if !self.state.can_move_to(to) {
            return Err(Error::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        self.last_transition_at = now;
        Ok(())
    }

    /// Fails the session; `false` if it already was terminal.
    pub fn fail(&mut self, reason: Error, now: u64) -> bool {
        if self.transition(TradeState::Failed, now).is_err() {
            return false;
        }
        self.failure = Some(reason);
        self.pending = None;
        true
    }

    /// A live session past its ttl.
    pub fn is_timed_out(&self, now: u64) -> bool {
        !self.is_terminal() && now > self.created_at.saturating_add(self.ttl_millis)
    }

    /// A terminal session that no longer needs to absorb late messages.
    pub fn is_stale_tombstone(&self, now: u64) -> bool {
        self.is_terminal() && now > self.last_transition_at.saturating_add(self.ttl_millis)
    }
}

/// Why a session failed, in a form that can be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    Timeout,
    MismatchedResponse,
    InvalidSignature,
    InvalidContract(String),
    Cancelled(String),
}

impl From<&Error> for FailureReason {
    fn from(error: &Error) -> Self {
        match error {
            Error::Timeout => FailureReason::Timeout,
            Error::MismatchedResponse => FailureReason::MismatchedResponse,
            Error::InvalidSignature => FailureReason::InvalidSignature,
            Error::InvalidContract(reason) => FailureReason::InvalidContract(reason.clone()),
            Error::Cancelled(reason) => FailureReason::Cancelled(reason.clone()),
            other => FailureReason::InvalidContract(format!("{}", other)),
        }
    }
}

impl From<FailureReason> for Error {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::Timeout => Error::Timeout,
            FailureReason::MismatchedResponse => Error::MismatchedResponse,
            FailureReason::InvalidSignature => Error::InvalidSignature,
            FailureReason::InvalidContract(reason) => Error::InvalidContract(reason),
            FailureReason::Cancelled(reason) => Error::Cancelled(reason),
        }
    }
}

/// A failure decided by this node. Never sent; stored next to the trade messages so that a
/// restarted node does not revive the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub trade_id: Id,
    pub reason: FailureReason,
    pub failed_at: u64,
}

impl FailureRecord {
    pub const TYPE_TAG: &'static str = "TradeFailure";

    pub fn new(trade_id: Id, reason: &Error, failed_at: u64) -> Self {
        FailureRecord { trade_id, reason: FailureReason::from(reason), failed_at }
    }

    pub fn meta_data() -> MetaData {
        MetaData::new(TTL_MILLIS, MAX_SIZE_BYTES, FailureRecord::TYPE_TAG)
    }

    pub fn to_bytes(&self) -> codec::Result<Vec<u8>> {
        codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> codec::Result<Self> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, PubKey, TransportKind};
    use crate::offer::{Direction, Market, Offer, PriceSpec};

    fn session() -> TradeSession {
        let id = |b: u8| {
            NetworkId::new(PubKey::from_bytes(&[b; 32]).unwrap(), Address::new("h", 1, TransportKind::Clear))
        };
        let offer = Offer::new(id(1), Direction::Buy, Market::new("BTC", "USD"), 3, PriceSpec::MarketRelative);
        TradeSession::new(Contract::new(offer, id(2), 3, 3), Role::Taker, 1_000)
    }

    #[test]
    fn taker_peer_is_the_maker() {
        let session = session();
        assert_eq!(&session.peer, session.contract.maker());
    }

    #[test]
    fn legal_path_to_completion() {
        let mut session = session();
        session.transition(TradeState::AwaitingCounterpartySignature, 1).unwrap();
        session.transition(TradeState::ContractSigned, 2).unwrap();
        session.transition(TradeState::Completed, 3).unwrap();
        assert_eq!(session.last_transition_at, 3);
        assert!(!session.fail(Error::Timeout, 4));
        assert_eq!(session.state, TradeState::Completed);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut session = session();
        assert_eq!(
            session.transition(TradeState::Completed, 1),
            Err(Error::InvalidTransition { from: TradeState::Initiated, to: TradeState::Completed })
        );
    }

    #[test]
    fn fails_once() {
        let mut session = session();
        assert!(session.fail(Error::Timeout, 5));
        assert!(!session.fail(Error::InvalidSignature, 6));
        assert_eq!(session.failure, Some(Error::Timeout));
    }

    #[test]
    fn timeout_and_tombstone_windows() {
        let mut session = session();
        let deadline = 1_000 + TTL_MILLIS;
        assert!(!session.is_timed_out(deadline));
        assert!(session.is_timed_out(deadline + 1));
        session.fail(Error::Timeout, deadline + 1);
        assert!(!session.is_timed_out(deadline + 2));
        assert!(!session.is_stale_tombstone(deadline + 1 + TTL_MILLIS));
        assert!(session.is_stale_tombstone(deadline + 2 + TTL_MILLIS));
    }

    #[test]
    fn failure_record_keeps_the_reason() {
        let trade_id = Id::new(b"trade");
        for reason in vec![
            Error::Timeout,
            Error::MismatchedResponse,
            Error::InvalidSignature,
            Error::Cancelled("changed my mind".to_owned()),
        ] {
            let record = FailureRecord::new(trade_id, &reason, 42);
            let decoded = FailureRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
            assert_eq!(decoded, record);
            assert_eq!(Error::from(decoded.reason), reason);
        }
    }
}
