use crate::codec::Proto;
use crate::colored::Colorize;
use crate::network::NetworkId;
use crate::p2p::{Broadcast, Sender};
use crate::protocol::{GossipMessage, Message};
use crate::store::{MessageStore, PutOutcome, StoredMessage};
use crate::trade::{ReceiveTradeMessage, TradeProtocol};
use crate::util;

use actix::{Actor, ActorFutureExt, Addr, AsyncContext, Context, Handler, StreamHandler, WrapFuture};
use tracing::{debug, info, warn};

/// Dispatches inbound application messages: trade messages to the trade protocol, gossip to
/// the store and on to the other peers.
pub struct Router {
    store: MessageStore,
    trade: Addr<TradeProtocol>,
    sender: Addr<Sender>,
}

impl Router {
    pub fn new(store: MessageStore, trade: Addr<TradeProtocol>, sender: Addr<Sender>) -> Self {
        Router { store, trade, sender }
    }

    /// Stores a verified gossip message; only messages new to this node are passed on.
    fn accept_gossip(&self, from: Option<&NetworkId>, gossip: GossipMessage) -> bool {
        let bytes = match gossip.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("[{}] cannot encode gossip: {}", "router".yellow(), err);
                return false;
            }
        };
        let stored = StoredMessage::new(bytes, gossip.meta_data().clone(), util::now_millis());
        let content_hash = stored.content_hash;
        match self.store.put(stored) {
            Ok(PutOutcome::Accepted) => {
                debug!("[{}] stored {} {}", "router".yellow(), gossip.meta_data().type_tag, content_hash);
                let except = from.cloned();
                self.sender.do_send(Broadcast { message: Message::Gossip(gossip), except });
                true
            }
            Ok(PutOutcome::Duplicate) => false,
            Err(err) => {
                warn!("[{}] rejected {}: {}", "router".yellow(), gossip.meta_data().type_tag, err);
                false
            }
        }
    }
}

impl Actor for Router {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] started", "router".yellow());
    }
}

impl StreamHandler<(NetworkId, Message)> for Router {
    fn handle(&mut self, (from, message): (NetworkId, Message), ctx: &mut Context<Self>) {
        match message {
            Message::Trade(message) => {
                let trade = self.trade.clone();
                let type_tag = message.meta_data().type_tag.clone();
                ctx.spawn(
                    async move {
                        match trade.send(ReceiveTradeMessage { from: from.clone(), message }).await {
                            Ok(Ok(outcome)) => {
                                debug!("[{}] {} from {}: {:?}", "router".yellow(), type_tag, from, outcome)
                            }
                            Ok(Err(err)) => warn!("[{}] {} from {} failed: {}", "router".yellow(), type_tag, from, err),
                            Err(err) => warn!("[{}] trade protocol unavailable: {}", "router".yellow(), err),
                        }
                    }
                    .into_actor(self),
                );
            }
            Message::Gossip(gossip) => {
                let verify = {
                    let gossip = gossip.clone();
                    async move { tokio::task::spawn_blocking(move || gossip.verify()).await.unwrap_or(false) }
                };
                ctx.spawn(verify.into_actor(self).map(move |valid, act, _ctx| {
                    if valid {
                        act.accept_gossip(Some(&from), gossip);
                    } else {
                        warn!("[{}] dropping gossip with a bad signature from {}", "router".yellow(), from);
                    }
                }));
            }
        }
    }

    fn finished(&mut self, _ctx: &mut Context<Self>) {
        info!("[{}] inbound stream closed", "router".yellow());
    }
}

/// Gossip originating at this node.
#[derive(Debug, Clone, Message)]
#[rtype(result = "bool")]
pub struct Publish {
    pub gossip: GossipMessage,
}

impl Handler<Publish> for Router {
    type Result = bool;

    fn handle(&mut self, msg: Publish, _ctx: &mut Context<Self>) -> Self::Result {
        self.accept_gossip(None, msg.gossip)
    }
}
