//! Defines the `Janitor` actor, which runs periodic maintenance.
use crate::colored::Colorize;
use crate::p2p::ConnectionManager;
use crate::store::MessageStore;
use crate::trade::{ExpireSessions, TradeProtocol};
use crate::util;

use actix::{Actor, ActorContext, Addr, AsyncContext, Context, Handler};
use tracing::{debug, info, warn};

use std::time::Duration;

pub struct Janitor {
    manager: ConnectionManager,
    store: MessageStore,
    trade: Addr<TradeProtocol>,
    interval: Duration,
    idle_timeout: Duration,
    keep_alive: Duration,
}

impl Janitor {
    pub fn new(
        manager: ConnectionManager,
        store: MessageStore,
        trade: Addr<TradeProtocol>,
        interval: Duration,
        idle_timeout: Duration,
        keep_alive: Duration,
    ) -> Self {
        Janitor { manager, store, trade, interval, idle_timeout, keep_alive }
    }
}

impl Actor for Janitor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        ctx.run_interval(self.interval, |_act, ctx| ctx.notify(Sweep));
    }
}

/// One maintenance round: idle connections, keep-alives, expired messages and sessions.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Sweep;

impl Handler<Sweep> for Janitor {
    type Result = ();

    fn handle(&mut self, _msg: Sweep, _ctx: &mut Context<Self>) -> Self::Result {
        let now = util::now_millis();
        let closed = self.manager.close_stale(self.idle_timeout);
        if !closed.is_empty() {
            info!("[{}] closed {} idle connections", "janitor".green(), closed.len());
        }
        self.manager.keep_alive(self.keep_alive);
        self.trade.do_send(ExpireSessions { now });

        let store = self.store.clone();
        actix::spawn(async move {
            match store.garbage_collect(now).await {
                Ok(0) => {}
                Ok(removed) => debug!("[{}] removed {} expired messages", "janitor".green(), removed),
                Err(err) => warn!("[{}] garbage collection failed: {}", "janitor".green(), err),
            }
        });
    }
}

#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct StopJanitor;

impl Handler<StopJanitor> for Janitor {
    type Result = ();

    fn handle(&mut self, _msg: StopJanitor, ctx: &mut Context<Self>) -> Self::Result {
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, NetworkId, PubKey, TransportKind};
    use crate::p2p::{ManagerConfig, Sender};
    use crate::protocol::MetaData;
    use crate::store::StoredMessage;
    use crate::trade::TradeProtocol;
    use crate::transport::clearnet::{ClearnetSettings, ClearnetTransport};
    use crate::transport::{Config, IoPool};

    use ed25519_dalek::Keypair;
    use rand::rngs::OsRng;
    use std::sync::Arc;

    #[actix_rt::test]
    async fn sweep_drops_expired_messages() {
        let keypair = Arc::new(Keypair::generate(&mut OsRng {}));
        let local = NetworkId::new(PubKey::from(&keypair.public), Address::new("127.0.0.1", 1, TransportKind::Clear));
        let config = Config { base_dir: std::env::temp_dir(), socket_timeout: Duration::from_secs(1) };
        let transport =
            Arc::new(ClearnetTransport::new(config, ClearnetSettings::default(), IoPool::new(1).unwrap()));
        let manager = ConnectionManager::new(keypair.clone(), local.clone(), transport, ManagerConfig::default());
        let store = MessageStore::temporary().unwrap();
        let sender = Sender::new(manager.clone()).start();
        let trade = TradeProtocol::new(keypair, local, sender.recipient(), store.clone()).start();

        store.put(StoredMessage::new(b"old".to_vec(), MetaData::new(1, 100, "Offer"), 0)).unwrap();
        store.put(StoredMessage::new(b"new".to_vec(), MetaData::new(60_000, 100, "Offer"), util::now_millis())).unwrap();

        let janitor = Janitor::new(
            manager,
            store.clone(),
            trade,
            Duration::from_secs(3600),
            Duration::from_secs(60),
            Duration::from_secs(30),
        )
        .start();
        janitor.send(Sweep).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), 1);
    }
}
