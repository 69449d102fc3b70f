use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::codec::Proto;
use crate::colored::Colorize;
use crate::contract::Contract;
use crate::id::Id;
use crate::network::{NetworkId, PubKey};
use crate::offer::{Direction, Market, Offer, PriceSpec};
use crate::p2p::{ConnectionManager, Sender};
use crate::protocol::{GossipMessage, GossipPayload};
use crate::server::{Janitor, Publish, StopJanitor, Router, Server, Settings};
use crate::store::MessageStore;
use crate::trade::{RestoreSessions, TakeOffer, TradeProtocol};
use crate::transport::{self, IoPool, Transport};
use crate::util;
use crate::{Error, Result};

use actix::{Actor, Addr, AsyncContext};
use ed25519_dalek::Keypair;
use rand::rngs::OsRng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A running node: one transport, its connections, the store and the trade protocol.
pub struct Node {
    local: NetworkId,
    keypair: Arc<Keypair>,
    io_pool: IoPool,
    transport: Arc<dyn Transport>,
    manager: ConnectionManager,
    store: MessageStore,
    router: Addr<Router>,
    trade: Addr<TradeProtocol>,
    janitor: Addr<Janitor>,
    accepting: CancellationToken,
}

impl Node {
    /// Brings the node up. Any failure here (transport bootstrap, listening, opening the store,
    /// restoring sessions) is returned and leaves nothing running. Sessions are restored before
    /// the node accepts connections.
    pub async fn start(settings: Settings) -> Result<Node> {
        let base_dir = settings.base_dir();
        std::fs::create_dir_all(&base_dir)?;
        let keypair = Arc::new(read_or_generate_keypair(&base_dir.join("node.keypair"))?);
        let pub_key = PubKey::from(&keypair.public);
        info!("[{}] node {} is starting on {}", "node".cyan(), pub_key, settings.transport);

        let io_pool = IoPool::new(settings.io_pool_workers)?;
        let transport =
            transport::create(settings.transport, base_dir.clone(), &settings.transports, io_pool.clone());
        if let Err(err) = transport.initialize().await {
            abandon(&transport, &io_pool).await;
            return Err(err.into());
        }
        let listening = match transport.listen(settings.port(), pub_key.id().to_string()).await {
            Ok(listening) => listening,
            Err(err) => {
                abandon(&transport, &io_pool).await;
                return Err(err.into());
            }
        };
        let local = NetworkId::new(pub_key, listening.address.clone());
        let store = match MessageStore::open(&base_dir.join("store")) {
            Ok(store) => store,
            Err(err) => {
                abandon(&transport, &io_pool).await;
                return Err(err.into());
            }
        };

        let manager = ConnectionManager::new(
            keypair.clone(),
            local.clone(),
            transport.clone(),
            settings.network.manager_config(),
        );
        let inbound = match manager.receive() {
            Some(inbound) => inbound,
            None => {
                abandon(&transport, &io_pool).await;
                return Err(Error::Connection(crate::p2p::Error::Shutdown));
            }
        };

        let sender = Sender::new(manager.clone()).start();
        let trade =
            TradeProtocol::new(keypair.clone(), local.clone(), sender.clone().recipient(), store.clone()).start();

        // Sessions are back in place before the first inbound message is routed.
        let restored: Result<usize> = match trade.send(RestoreSessions).await {
            Ok(restored) => restored.map_err(Error::from),
            Err(err) => Err(err.into()),
        };
        if let Err(err) = restored {
            manager.shutdown();
            abandon(&transport, &io_pool).await;
            return Err(err);
        }

        let router = {
            let store = store.clone();
            let trade = trade.clone();
            Router::create(move |ctx| {
                ctx.add_stream(inbound);
                Router::new(store, trade, sender)
            })
        };
        let janitor = Janitor::new(
            manager.clone(),
            store.clone(),
            trade.clone(),
            settings.maintenance_interval(),
            settings.network.idle_timeout(),
            settings.network.keep_alive(),
        )
        .start();

        let accepting = CancellationToken::new();
        let server = Server::new(manager.clone(), listening.server);
        tokio::spawn(server.listen(accepting.clone()));

        for peer in settings.bootstrap_peers.iter() {
            match util::parse_peer(peer, settings.transport) {
                Ok(peer) => {
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        if let Err(err) = manager.connect_to(&peer).await {
                            warn!("[{}] bootstrap peer {} unreachable: {}", "node".cyan(), peer, err);
                        }
                    });
                }
                Err(_) => warn!("[{}] ignoring malformed bootstrap peer {}", "node".cyan(), peer),
            }
        }

        info!("[{}] {} is up", "node".cyan(), local);
        Ok(Node { local, keypair, io_pool, transport, manager, store, router, trade, janitor, accepting })
    }

    pub fn local(&self) -> &NetworkId {
        &self.local
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn trade(&self) -> &Addr<TradeProtocol> {
        &self.trade
    }

    pub async fn connect(&self, peer: &NetworkId) -> Result<()> {
        self.manager.connect_to(peer).await?;
        Ok(())
    }

    /// Signs an offer made by this node, stores it and broadcasts it to every connected peer.
    pub async fn publish_offer(
        &self,
        direction: Direction,
        market: Market,
        base_amount: u64,
        price_spec: PriceSpec,
    ) -> Result<Offer> {
        let offer = Offer::new(self.local.clone(), direction, market, base_amount, price_spec);
        let gossip = GossipMessage::sign(&self.keypair, GossipPayload::Offer(offer.clone()))?;
        self.router.send(Publish { gossip }).await?;
        info!("[{}] published offer {}", "node".cyan(), offer.id());
        Ok(offer)
    }

    /// Every unexpired offer in the store, own offers included.
    pub fn offers(&self) -> Result<Vec<Offer>> {
        let mut offers = vec![];
        for stored in self.store.messages_with_tag(Offer::TYPE_TAG)? {
            let gossip = GossipMessage::from_bytes(&stored.payload)?;
            match gossip.payload() {
                GossipPayload::Offer(offer) => offers.push(offer.clone()),
            }
        }
        Ok(offers)
    }

    /// Takes `offer` as the taker. Resolves once the request reached the maker.
    pub async fn take_offer(&self, offer: Offer, base_amount: u64, quote_amount: u64) -> Result<Id> {
        let contract = Contract::new(offer, self.local.clone(), base_amount, quote_amount);
        Ok(self.trade.send(TakeOffer { contract }).await??)
    }

    /// Stops accepting, closes every connection and shuts the transport down.
    pub async fn shutdown(self) -> Result<()> {
        self.accepting.cancel();
        self.janitor.do_send(StopJanitor);
        self.manager.shutdown();
        let result = self.transport.shutdown().await;
        self.store.flush().await?;
        self.io_pool.shutdown();
        info!("[{}] {} stopped", "node".cyan(), self.local);
        Ok(result?)
    }
}

/// Undoes a partial start.
async fn abandon(transport: &Arc<dyn Transport>, io_pool: &IoPool) {
    if let Err(err) = transport.shutdown().await {
        warn!("[{}] transport shutdown failed: {}", "node".cyan(), err);
    }
    io_pool.shutdown();
}

/// The node identity is an ed25519 keypair stored hex encoded at `path`.
pub fn read_or_generate_keypair(path: &Path) -> Result<Keypair> {
    match std::fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let bytes = hex::decode(contents.trim()).map_err(|_| Error::InvalidKeypair)?;
            Ok(Keypair::from_bytes(&bytes)?)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let keypair = Keypair::generate(&mut OsRng {});
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let mut file = std::fs::File::create(path)?;
            file.write_all(hex::encode(keypair.to_bytes()).as_bytes())?;
            info!("[{}] generated a new node keypair", "node".cyan());
            Ok(keypair)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::TransportKind;
    use crate::trade::{GetSession, Role, TradeState};

    use std::future::Future;
    use std::time::Duration;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.transport = TransportKind::Clear;
        settings.port = Some(0);
        settings.base_dir = Some(std::env::temp_dir().join(format!("tradenet-node-{}", Id::generate())));
        settings.transports.clear.bind_host = "127.0.0.1".to_owned();
        settings.io_pool_workers = 1;
        settings
    }

    async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    async fn state_of(node: &Node, trade_id: Id) -> Option<TradeState> {
        node.trade().send(GetSession { trade_id }).await.unwrap().map(|session| session.state)
    }

    #[actix_rt::test]
    async fn offer_is_gossiped_and_taken() {
        let maker = Node::start(settings()).await.unwrap();
        let taker = Node::start(settings()).await.unwrap();
        let (m, t) = (&maker, &taker);

        taker.connect(maker.local()).await.unwrap();
        assert!(eventually(|| async move { m.manager().is_connected(t.local()) }).await);

        let offer = maker
            .publish_offer(Direction::Sell, Market::new("BTC", "EUR"), 50_000, PriceSpec::MarketRelative)
            .await
            .unwrap();
        let offer_id = offer.id();
        assert!(eventually(|| async move { t.offers().unwrap().iter().any(|o| o.id() == offer_id) }).await);

        let trade_id = taker.take_offer(offer.clone(), 20_000, 1_000).await.unwrap();
        assert!(
            eventually(|| async move { state_of(t, trade_id).await == Some(TradeState::ContractSigned) }).await
        );
        assert_eq!(state_of(&maker, trade_id).await, Some(TradeState::ContractSigned));

        let session = maker.trade().send(GetSession { trade_id }).await.unwrap().unwrap();
        assert_eq!(session.role, Role::Maker);
        assert_eq!(&session.peer, taker.local());

        taker.shutdown().await.unwrap();
        maker.shutdown().await.unwrap();
    }

    #[actix_rt::test]
    async fn start_skips_an_unreadable_store_entry() {
        let settings = settings();
        let base_dir = settings.base_dir();
        {
            let db = sled::open(base_dir.join("store")).unwrap();
            let tree = db.open_tree("messages").unwrap();
            tree.insert([7u8; 32], b"not a message".to_vec()).unwrap();
            db.flush().unwrap();
        }
        let node = Node::start(settings).await.unwrap();
        assert!(node.offers().unwrap().is_empty());
        node.shutdown().await.unwrap();
    }

    #[test]
    fn keypair_is_generated_once() {
        let dir = std::env::temp_dir().join(format!("tradenet-keypair-{}", Id::generate()));
        let path = dir.join("node.keypair");
        let first = read_or_generate_keypair(&path).unwrap();
        let second = read_or_generate_keypair(&path).unwrap();
        assert_eq!(first.to_bytes().to_vec(), second.to_bytes().to_vec());
    }

    #[test]
    fn garbage_keypair_is_an_error() {
        let dir = std::env::temp_dir().join(format!("tradenet-keypair-{}", Id::generate()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("node.keypair");
        std::fs::write(&path, "not hex").unwrap();
        assert!(matches!(read_or_generate_keypair(&path), Err(Error::InvalidKeypair)));
    }
}
