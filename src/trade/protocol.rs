//! Defines the `TradeProtocol` actor, which owns every trade session of the node.
use super::{
    Error, FailureRecord, Result, Role, TradeMessage, TradePayload, TradeSession, TradeState, TYPE_TAGS,
};

use crate::codec::Proto;
use crate::colored::Colorize;
use crate::contract::{Contract, ContractSignatureData};
use crate::id::Id;
use crate::network::NetworkId;
use crate::p2p::Deliver;
use crate::protocol;
use crate::store::{MessageStore, StoredMessage};
use crate::util;

use actix::{
    Actor, ActorFutureExt, AsyncContext, Context, Handler, MessageResult, Recipient, ResponseActFuture,
    ResponseFuture, WrapFuture,
};
use ed25519_dalek::Keypair;
use futures::Future;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::sync::Arc;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEventKind {
    StateChanged(TradeState),
    Failed(Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeEvent {
    pub trade_id: Id,
    pub kind: TradeEventKind,
}

/// What an inbound trade message did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    /// The session moved to the given state.
    Applied(TradeState),
    /// The message was a duplicate or arrived after the session ended.
    Ignored,
}

pub struct TradeProtocol {
    keypair: Arc<Keypair>,
    local: NetworkId,
    sender: Recipient<Deliver>,
    store: MessageStore,
    sessions: HashMap<Id, TradeSession>,
    events: broadcast::Sender<TradeEvent>,
}

impl TradeProtocol {
    pub fn new(keypair: Arc<Keypair>, local: NetworkId, sender: Recipient<Deliver>, store: MessageStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        TradeProtocol { keypair, local, sender, store, sessions: HashMap::new(), events }
    }

    fn delivery(&self, peer: NetworkId, message: TradeMessage) -> impl Future<Output = Result<()>> + 'static {
        let request = self.sender.send(Deliver { peer, message: protocol::Message::Trade(message) });
        async move { request.await?.map_err(Error::Delivery) }
    }

    fn spawn_delivery(&self, ctx: &mut Context<Self>, peer: NetworkId, message: TradeMessage) {
        let trade_id = message.trade_id();
        let delivery = self.delivery(peer, message);
        ctx.spawn(
            async move {
                if let Err(err) = delivery.await {
                    warn!("[{}] could not deliver message for {}: {}", "trade".magenta(), trade_id, err);
                }
            }
            .into_actor(self),
        );
    }

    /// Keeps sent and applied messages so that sessions survive a restart.
    fn persist(&self, message: &TradeMessage, now: u64) {
        let stored = message
            .to_bytes()
            .map_err(Error::from)
            .and_then(|bytes| Ok(self.store.put(StoredMessage::new(bytes, message.meta_data().clone(), now))?));
        if let Err(err) = stored {
            warn!("[{}] could not persist {}: {}", "trade".magenta(), message.meta_data().type_tag, err);
        }
    }

    /// Failures decided locally are never sent, so they are recorded on their own.
    fn persist_failure(&self, trade_id: &Id, reason: &Error, now: u64) {
        let record = FailureRecord::new(*trade_id, reason, now);
        let stored = record
            .to_bytes()
            .map_err(Error::from)
            .and_then(|bytes| Ok(self.store.put(StoredMessage::new(bytes, FailureRecord::meta_data(), now))?));
        if let Err(err) = stored {
            warn!("[{}] could not persist the failure of {}: {}", "trade".magenta(), trade_id, err);
        }
    }

    fn emit(&self, session: &TradeSession) {
        let kind = match (&session.state, &session.failure) {
            (TradeState::Failed, Some(reason)) => TradeEventKind::Failed(reason.clone()),
            (state, _) => TradeEventKind::StateChanged(*state),
        };
        // No subscribers is fine.
        let _ = self.events.send(TradeEvent { trade_id: session.trade_id, kind });
    }

    fn fail(&mut self, trade_id: &Id, reason: Error, now: u64) -> bool {
        let failed = match self.sessions.get_mut(trade_id) {
            Some(session) => session.fail(reason.clone(), now),
            None => false,
        };
        if failed {
            info!("[{}] trade {} failed: {}", "trade".magenta(), trade_id, reason);
            self.persist_failure(trade_id, &reason, now);
            if let Some(session) = self.sessions.get(trade_id) {
                self.emit(session);
            }
        }
        failed
    }

    fn start_take(&mut self, contract: Contract) -> Result<(Id, NetworkId, TradeMessage)> {
        if contract.taker().pub_key() != self.local.pub_key() {
            return Err(Error::WrongParty);
        }
        contract.check_terms().map_err(Error::InvalidContract)?;
        let trade_id = contract.trade_id();
        if self.sessions.contains_key(&trade_id) {
            return Err(Error::DuplicateTrade(trade_id));
        }
        let now = util::now_millis();
        let signature_data = ContractSignatureData::sign(&self.keypair, &contract)?;
        let request = TradeMessage::new(
            trade_id,
            self.local.clone(),
            TradePayload::TakeOfferRequest { contract: contract.clone(), signature_data: signature_data.clone() },
        );
        let mut session = TradeSession::new(contract, Role::Taker, now);
        session.own_signature = Some(signature_data);
        session.transition(TradeState::AwaitingCounterpartySignature, now)?;
        session.pending = Some(request.clone());
        let peer = session.peer.clone();

        self.persist(&request, now);
        self.emit(&session);
        self.sessions.insert(trade_id, session);
        info!("[{}] taking offer as trade {} with {}", "trade".magenta(), trade_id, peer);
        Ok((trade_id, peer, request))
    }

    fn on_request(
        &mut self,
        from: NetworkId,
        message: TradeMessage,
        contract: Contract,
        signature_data: ContractSignatureData,
        ctx: &mut Context<Self>,
    ) -> ResponseActFuture<Self, Result<Outcome>> {
        let trade_id = message.trade_id();
        if let Some(session) = self.sessions.get(&trade_id) {
            // A taker that missed our response asks again.
            if session.role == Role::Maker
                && session.state == TradeState::ContractSigned
                && session.peer.pub_key() == from.pub_key()
            {
                if let Some(response) = session.pending.clone() {
                    let peer = session.peer.clone();
                    self.spawn_delivery(ctx, peer, response);
                }
            }
            return Box::pin(actix::fut::ready(Ok(Outcome::Ignored)));
        }
        if contract.maker().pub_key() != self.local.pub_key() || contract.taker().pub_key() != from.pub_key() {
            return Box::pin(actix::fut::ready(Err(Error::WrongParty)));
        }

        let rejection = match contract.hash() {
            Err(err) => Some(Error::from(err)),
            Ok(hash) if &hash != signature_data.contract_hash() => {
                Some(Error::InvalidContract("signature covers another contract".to_owned()))
            }
            Ok(_) if signature_data.signer() != contract.taker().pub_key() => {
                Some(Error::InvalidContract("signed by someone other than the taker".to_owned()))
            }
            Ok(_) => contract.check_terms().err().map(Error::InvalidContract),
        };
        let verification = {
            let signature_data = signature_data.clone();
            let checked = rejection.is_none();
            async move { !checked || signature_data.verify_blocking().await }
        };

        Box::pin(verification.into_actor(self).map(move |valid, act, ctx| {
            if act.sessions.contains_key(&trade_id) {
                return Ok(Outcome::Ignored);
            }
            let now = util::now_millis();
            let mut session = TradeSession::new(contract, Role::Maker, now);
            let reason = match rejection {
                Some(reason) => Some(reason),
                None if !valid => Some(Error::InvalidSignature),
                None => None,
            };
            if let Some(reason) = reason {
                warn!("[{}] rejecting take offer request {}: {}", "trade".magenta(), trade_id, reason);
                act.persist(&message, now);
                act.persist_failure(&trade_id, &reason, now);
                session.fail(reason, now);
                act.emit(&session);
                act.sessions.insert(trade_id, session);
                return Ok(Outcome::Applied(TradeState::Failed));
            }

            let own_signature = ContractSignatureData::sign(&act.keypair, &session.contract)?;
            let response = TradeMessage::new(
                trade_id,
                act.local.clone(),
                TradePayload::TakeOfferResponse { signature_data: own_signature.clone() },
            );
            session.peer_signature = Some(signature_data);
            session.own_signature = Some(own_signature);
            session.transition(TradeState::ContractSigned, now)?;
            session.pending = Some(response.clone());

            act.persist(&message, now);
            act.persist(&response, now);
            act.emit(&session);
            let peer = session.peer.clone();
            act.sessions.insert(trade_id, session);
            info!("[{}] signed contract for trade {} with {}", "trade".magenta(), trade_id, peer);
            act.spawn_delivery(ctx, peer, response);
            Ok(Outcome::Applied(TradeState::ContractSigned))
        }))
    }

    fn on_response(
        &mut self,
        from: NetworkId,
        message: TradeMessage,
        signature_data: ContractSignatureData,
    ) -> ResponseActFuture<Self, Result<Outcome>> {
        let trade_id = message.trade_id();
        let session = match self.sessions.get(&trade_id) {
            Some(session) => session,
            None => return Box::pin(actix::fut::ready(Err(Error::UnknownTrade(trade_id)))),
        };
        if session.role != Role::Taker || session.state != TradeState::AwaitingCounterpartySignature {
            debug!("[{}] ignoring response for trade {} in {:?}", "trade".magenta(), trade_id, session.state);
            return Box::pin(actix::fut::ready(Ok(Outcome::Ignored)));
        }
        let expected_hash = session.own_signature.as_ref().map(|own| *own.contract_hash());
        let mismatched = session.peer.pub_key() != from.pub_key()
            || signature_data.signer() != session.peer.pub_key()
            || expected_hash.as_ref() != Some(signature_data.contract_hash());
        if mismatched {
            self.fail(&trade_id, Error::MismatchedResponse, util::now_millis());
            return Box::pin(actix::fut::ready(Ok(Outcome::Applied(TradeState::Failed))));
        }

        let verification = {
            let signature_data = signature_data.clone();
            async move { signature_data.verify_blocking().await }
        };
        Box::pin(verification.into_actor(self).map(move |valid, act, _ctx| {
            let now = util::now_millis();
            let state = act.sessions.get(&trade_id).map(|session| session.state);
            if state != Some(TradeState::AwaitingCounterpartySignature) {
                return Ok(Outcome::Ignored);
            }
            if !valid {
                act.fail(&trade_id, Error::InvalidSignature, now);
                return Ok(Outcome::Applied(TradeState::Failed));
            }
            let session = match act.sessions.get_mut(&trade_id) {
                Some(session) => session,
                None => return Ok(Outcome::Ignored),
            };
            session.transition(TradeState::ContractSigned, now)?;
            session.peer_signature = Some(signature_data);
            session.pending = None;
            let session = session.clone();
            act.persist(&message, now);
            act.emit(&session);
            info!("[{}] contract for trade {} countersigned", "trade".magenta(), trade_id);
            Ok(Outcome::Applied(TradeState::ContractSigned))
        }))
    }

    fn on_cancel(&mut self, from: &NetworkId, message: &TradeMessage, reason: String) -> Result<Outcome> {
        let trade_id = message.trade_id();
        let session = self.sessions.get(&trade_id).ok_or(Error::UnknownTrade(trade_id))?;
        if session.is_terminal() {
            return Ok(Outcome::Ignored);
        }
        if session.peer.pub_key() != from.pub_key() {
            return Err(Error::WrongParty);
        }
        let now = util::now_millis();
        self.persist(message, now);
        self.fail(&trade_id, Error::Cancelled(reason), now);
        Ok(Outcome::Applied(TradeState::Failed))
    }

    /// Rebuilds one session step from a persisted message.
    fn replay(&mut self, message: TradeMessage, at: u64) {
        let trade_id = message.trade_id();
        match message.payload().clone() {
            TradePayload::TakeOfferRequest { contract, signature_data } => {
                if self.sessions.contains_key(&trade_id) {
                    return;
                }
                let role = if contract.taker().pub_key() == self.local.pub_key() {
                    Role::Taker
                } else if contract.maker().pub_key() == self.local.pub_key() {
                    Role::Maker
                } else {
                    return;
                };
                let mut session = TradeSession::new(contract, role, at);
                if role == Role::Taker {
                    session.own_signature = Some(signature_data);
                    session.pending = Some(message);
                    let _ = session.transition(TradeState::AwaitingCounterpartySignature, at);
                } else {
                    session.peer_signature = Some(signature_data);
                }
                self.sessions.insert(trade_id, session);
            }
            TradePayload::TakeOfferResponse { signature_data } => {
                if let Some(session) = self.sessions.get_mut(&trade_id) {
                    if session.transition(TradeState::ContractSigned, at).is_ok() {
                        match session.role {
                            Role::Taker => {
                                session.peer_signature = Some(signature_data);
                                session.pending = None;
                            }
                            Role::Maker => {
                                session.own_signature = Some(signature_data);
                                session.pending = Some(message);
                            }
                        }
                    }
                }
            }
            TradePayload::CancelTrade { reason } => {
                if let Some(session) = self.sessions.get_mut(&trade_id) {
                    session.fail(Error::Cancelled(reason), at);
                }
            }
        }
    }

    fn replay_failure(&mut self, record: FailureRecord) {
        if let Some(session) = self.sessions.get_mut(&record.trade_id) {
            session.fail(record.reason.into(), record.failed_at);
        }
    }

    fn restore(&mut self) -> Result<usize> {
        let mut stored = Vec::new();
        for tag in TYPE_TAGS.iter() {
            stored.extend(self.store.messages_with_tag(tag)?);
        }
        // After the messages so that a failure stored in the same millisecond replays last.
        stored.extend(self.store.messages_with_tag(FailureRecord::TYPE_TAG)?);
        stored.sort_by_key(|entry| entry.received_at);
        for entry in stored {
            if entry.meta_data.type_tag == FailureRecord::TYPE_TAG {
                match FailureRecord::from_bytes(&entry.payload) {
                    Ok(record) => self.replay_failure(record),
                    Err(err) => warn!("[{}] skipping unreadable failure record: {}", "trade".magenta(), err),
                }
                continue;
            }
            match TradeMessage::from_bytes(&entry.payload) {
                Ok(message) => self.replay(message, entry.received_at),
                Err(err) => warn!("[{}] skipping unreadable stored message: {}", "trade".magenta(), err),
            }
        }

        // Sessions that ran out while the node was down fail before any message reaches them.
        self.expire(util::now_millis());
        Ok(self.sessions.len())
    }

    fn expire(&mut self, now: u64) -> Vec<Id> {
        let timed_out: Vec<Id> =
            self.sessions.values().filter(|session| session.is_timed_out(now)).map(|session| session.trade_id).collect();
        for trade_id in timed_out.iter() {
            self.fail(trade_id, Error::Timeout, now);
        }
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_stale_tombstone(now));
        if before != self.sessions.len() {
            debug!("[{}] dropped {} tombstones", "trade".magenta(), before - self.sessions.len());
        }
        timed_out
    }
}

impl Actor for TradeProtocol {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] started for {}", "trade".magenta(), self.local);
    }
}

/// Takes an offer as the taker; resolves once the request has been handed to the maker.
///
/// A failed delivery leaves the session waiting with the request pending, see [ResendPending].
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<Id>")]
pub struct TakeOffer {
    pub contract: Contract,
}

impl Handler<TakeOffer> for TradeProtocol {
    type Result = ResponseFuture<Result<Id>>;

    fn handle(&mut self, msg: TakeOffer, _ctx: &mut Context<Self>) -> Self::Result {
        match self.start_take(msg.contract) {
            Ok((trade_id, peer, request)) => {
                let delivery = self.delivery(peer, request);
                Box::pin(async move { delivery.await.map(|()| trade_id) })
            }
            Err(err) => Box::pin(futures::future::ready(Err(err))),
        }
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<()>")]
pub struct ResendPending {
    pub trade_id: Id,
}

impl Handler<ResendPending> for TradeProtocol {
    type Result = ResponseFuture<Result<()>>;

    fn handle(&mut self, msg: ResendPending, _ctx: &mut Context<Self>) -> Self::Result {
        let pending = match self.sessions.get(&msg.trade_id) {
            None => Err(Error::UnknownTrade(msg.trade_id)),
            Some(session) if session.is_terminal() => Err(Error::NothingPending),
            Some(session) => {
                session.pending.clone().map(|pending| (session.peer.clone(), pending)).ok_or(Error::NothingPending)
            }
        };
        match pending {
            Ok((peer, message)) => Box::pin(self.delivery(peer, message)),
            Err(err) => Box::pin(futures::future::ready(Err(err))),
        }
    }
}

/// A trade message received from `from`, the peer proven by the connection handshake.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<Outcome>")]
pub struct ReceiveTradeMessage {
    pub from: NetworkId,
    pub message: TradeMessage,
}

impl Handler<ReceiveTradeMessage> for TradeProtocol {
    type Result = ResponseActFuture<Self, Result<Outcome>>;

    fn handle(&mut self, msg: ReceiveTradeMessage, ctx: &mut Context<Self>) -> Self::Result {
        let ReceiveTradeMessage { from, message } = msg;
        match message.payload().clone() {
            TradePayload::TakeOfferRequest { contract, signature_data } => {
                self.on_request(from, message, contract, signature_data, ctx)
            }
            TradePayload::TakeOfferResponse { signature_data } => self.on_response(from, message, signature_data),
            TradePayload::CancelTrade { reason } => {
                Box::pin(actix::fut::ready(self.on_cancel(&from, &message, reason)))
            }
        }
    }
}

/// Marks a signed contract as completed. Purely local.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<()>")]
pub struct Finalize {
    pub trade_id: Id,
}

impl Handler<Finalize> for TradeProtocol {
    type Result = Result<()>;

    fn handle(&mut self, msg: Finalize, _ctx: &mut Context<Self>) -> Self::Result {
        let session = self.sessions.get_mut(&msg.trade_id).ok_or(Error::UnknownTrade(msg.trade_id))?;
        if session.state == TradeState::Completed {
            return Ok(());
        }
        session.transition(TradeState::Completed, util::now_millis())?;
        let session = session.clone();
        self.emit(&session);
        info!("[{}] trade {} completed", "trade".magenta(), msg.trade_id);
        Ok(())
    }
}

/// Abandons a trade and tells the counterparty.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<()>")]
pub struct Cancel {
    pub trade_id: Id,
    pub reason: String,
}

impl Handler<Cancel> for TradeProtocol {
    type Result = ResponseFuture<Result<()>>;

    fn handle(&mut self, msg: Cancel, _ctx: &mut Context<Self>) -> Self::Result {
        let peer = match self.sessions.get(&msg.trade_id) {
            None => return Box::pin(futures::future::ready(Err(Error::UnknownTrade(msg.trade_id)))),
            Some(session) if session.is_terminal() => {
                let err = Error::InvalidTransition { from: session.state, to: TradeState::Failed };
                return Box::pin(futures::future::ready(Err(err)));
            }
            Some(session) => session.peer.clone(),
        };
        let now = util::now_millis();
        let cancel = TradeMessage::new(
            msg.trade_id,
            self.local.clone(),
            TradePayload::CancelTrade { reason: msg.reason.clone() },
        );
        self.persist(&cancel, now);
        self.fail(&msg.trade_id, Error::Cancelled(msg.reason), now);
        Box::pin(self.delivery(peer, cancel))
    }
}

/// Fails every live session past its ttl and forgets expired tombstones. Resolves to the
/// trades that timed out.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Vec<Id>")]
pub struct ExpireSessions {
    pub now: u64,
}

impl Handler<ExpireSessions> for TradeProtocol {
    type Result = Vec<Id>;

    fn handle(&mut self, msg: ExpireSessions, _ctx: &mut Context<Self>) -> Self::Result {
        self.expire(msg.now)
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "Option<TradeSession>")]
pub struct GetSession {
    pub trade_id: Id,
}

impl Handler<GetSession> for TradeProtocol {
    type Result = Option<TradeSession>;

    fn handle(&mut self, msg: GetSession, _ctx: &mut Context<Self>) -> Self::Result {
        self.sessions.get(&msg.trade_id).cloned()
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "broadcast::Receiver<TradeEvent>")]
pub struct SubscribeEvents;

impl Handler<SubscribeEvents> for TradeProtocol {
    type Result = MessageResult<SubscribeEvents>;

    fn handle(&mut self, _msg: SubscribeEvents, _ctx: &mut Context<Self>) -> Self::Result {
        MessageResult(self.events.subscribe())
    }
}

/// Rebuilds sessions from the trade messages in the store; resolves to the session count.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<usize>")]
pub struct RestoreSessions;

impl Handler<RestoreSessions> for TradeProtocol {
    type Result = Result<usize>;

    fn handle(&mut self, _msg: RestoreSessions, _ctx: &mut Context<Self>) -> Self::Result {
        let restored = self.restore()?;
        info!("[{}] restored {} sessions", "trade".magenta(), restored);
        Ok(restored)
    }
}
