//! Defines the `Sender` actor, the actor-side entry point for outbound application messages.
use super::prelude::*;
use super::manager::ConnectionManager;

use actix::{Actor, Context, Handler, ResponseFuture};

pub struct Sender {
    manager: ConnectionManager,
}

impl Sender {
    pub fn new(manager: ConnectionManager) -> Self {
        Sender { manager }
    }
}

impl Actor for Sender {
    type Context = Context<Self>;

    fn stopped(&mut self, _ctx: &mut Context<Self>) {
        debug!("[{}] stopped", "sender".cyan());
    }
}

/// Delivers `message` to `peer`, connecting first if needed.
#[derive(Debug, Clone, Message)]
#[rtype(result = "Result<()>")]
pub struct Deliver {
    pub peer: NetworkId,
    pub message: Message,
}

/// Sends `message` to every connected peer but `except`; resolves to the number reached.
#[derive(Debug, Clone, Message)]
#[rtype(result = "usize")]
pub struct Broadcast {
    pub message: Message,
    pub except: Option<NetworkId>,
}

/// Connects and sends; a connection replaced between the two steps is retried once.
pub async fn deliver(manager: &ConnectionManager, peer: &NetworkId, message: Message) -> Result<()> {
    let handle = manager.connect_to(peer).await?;
    match manager.send(&handle, message.clone()).await {
        Err(Error::ConnectionClosed) => {
            debug!("[{}] connection to {} went away, reconnecting", "sender".cyan(), peer);
            let handle = manager.connect_to(peer).await?;
            manager.send(&handle, message).await
        }
        result => result,
    }
}

impl Handler<Deliver> for Sender {
    type Result = ResponseFuture<Result<()>>;

    fn handle(&mut self, msg: Deliver, _ctx: &mut Context<Self>) -> Self::Result {
        let manager = self.manager.clone();
        Box::pin(async move {
            let result = deliver(&manager, &msg.peer, msg.message).await;
            if let Err(err) = result.as_ref() {
                warn!("[{}] delivery to {} failed: {}", "sender".cyan(), msg.peer, err);
            }
            result
        })
    }
}

impl Handler<Broadcast> for Sender {
    type Result = ResponseFuture<usize>;

    fn handle(&mut self, msg: Broadcast, _ctx: &mut Context<Self>) -> Self::Result {
        let manager = self.manager.clone();
        Box::pin(async move { manager.broadcast(msg.message, msg.except.as_ref()).await })
    }
}
