use super::prelude::*;

use super::connection::{Connection, ConnectionHandle, ConnectionInfo, ConnectionKey, Outbound};
use super::handshake;
use super::linear_backoff::LinearBackoff;

use crate::channel::{self, Channel};
use crate::util;

use ed25519_dalek::Keypair;
use futures::channel::mpsc as unbounded;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Every application message received on any connection, in per-peer order.
pub type Inbound = unbounded::UnboundedReceiver<(NetworkId, Message)>;

type PendingDial = Shared<BoxFuture<'static, Result<ConnectionHandle>>>;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub handshake_timeout: Duration,
    pub connect_attempts: u32,
    pub backoff_delta: Duration,
    /// Envelopes that may wait for the writer of one connection.
    pub send_queue_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            handshake_timeout: Duration::from_secs(30),
            connect_attempts: 3,
            backoff_delta: Duration::from_secs(1),
            send_queue_size: 64,
        }
    }
}

/// Owns every live connection of the node.
///
/// There is at most one connection per peer and transport. Concurrent `connect_to` calls for
/// the same peer share one attempt, and a connection only becomes visible after the handshake
/// succeeded. Cloning is cheap.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    keypair: Arc<Keypair>,
    local: NetworkId,
    transport: Arc<dyn Transport>,
    config: ManagerConfig,
    connections: Mutex<HashMap<ConnectionKey, Arc<Connection>>>,
    pending: Mutex<HashMap<ConnectionKey, PendingDial>>,
    inbound_tx: unbounded::UnboundedSender<(NetworkId, Message)>,
    inbound_rx: Mutex<Option<Inbound>>,
    serial: AtomicU64,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        keypair: Arc<Keypair>,
        local: NetworkId,
        transport: Arc<dyn Transport>,
        config: ManagerConfig,
    ) -> ConnectionManager {
        let (inbound_tx, inbound_rx) = unbounded::unbounded();
        let inner = Inner {
            keypair,
            local,
            transport,
            config,
            connections: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            serial: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        };
        ConnectionManager { inner: Arc::new(inner) }
    }

    pub fn local(&self) -> &NetworkId {
        &self.inner.local
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Returns the live connection to `peer`, dialing it if there is none.
    pub async fn connect_to(&self, peer: &NetworkId) -> Result<ConnectionHandle> {
        self.dial_shared(peer)?.await
    }

    /// Like [ConnectionManager::connect_to], but gives up when `cancel` fires. The shared
    /// attempt keeps running for other callers.
    pub async fn connect_to_cancellable(
        &self,
        peer: &NetworkId,
        cancel: CancellationToken,
    ) -> Result<ConnectionHandle> {
        let attempt = self.dial_shared(peer)?;
        tokio::select! {
            result = attempt => result,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    fn dial_shared(&self, peer: &NetworkId) -> Result<PendingDial> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }
        if peer.transport_kind() != self.inner.transport.kind() {
            return Err(Error::UnsupportedTransport(peer.transport_kind()));
        }
        let key = (peer.clone(), peer.transport_kind());
        // Checking for a live connection under the pending lock closes the gap between a
        // dial registering its connection and removing its pending entry.
        let mut pending = self.inner.pending.lock();
        if let Some(conn) = self.inner.connections.lock().get(&key) {
            let handle = conn.handle();
            return Ok(futures::future::ready(Ok(handle)).boxed().shared());
        }
        if let Some(attempt) = pending.get(&key) {
            return Ok(attempt.clone());
        }
        let inner = self.inner.clone();
        let target = peer.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let result = tokio::select! {
                result = Inner::dial(&inner, &target) => result,
                _ = inner.shutdown.cancelled() => Err(Error::Shutdown),
            };
            inner.pending.lock().remove(&task_key);
            result
        });
        let attempt = task.map(|joined| joined.unwrap_or(Err(Error::Cancelled))).boxed().shared();
        pending.insert(key, attempt.clone());
        Ok(attempt)
    }

    /// Runs the responder side of the handshake on an accepted stream and registers it.
    pub async fn accept_inbound(&self, stream: ConnectionStream) -> Result<ConnectionHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }
        let (mut sender, mut receiver) = Channel::wrap(stream).split();
        let inner = &self.inner;
        let remote = timeout(
            inner.config.handshake_timeout,
            handshake::perform(&mut sender, &mut receiver, &inner.keypair, &inner.local, None),
        )
        .await??;
        let dialed_by = *remote.pub_key();
        Inner::register(inner, remote, dialed_by, false, sender, receiver)
    }

    /// Sends `message` on the connection behind `handle`.
    ///
    /// Fails with [Error::ConnectionClosed] once that connection has been removed, including
    /// for messages that were queued but not yet written.
    pub async fn send(&self, handle: &ConnectionHandle, message: Message) -> Result<()> {
        let conn = self.inner.live(handle).ok_or(Error::ConnectionClosed)?;
        let result = conn.send(Envelope::Message(message)).await;
        if result.is_ok() {
            conn.touch();
        }
        result
    }

    /// Sends `message` to every connected peer except `except`; returns how many accepted it.
    pub async fn broadcast(&self, message: Message, except: Option<&NetworkId>) -> usize {
        let targets: Vec<Arc<Connection>> = self
            .inner
            .connections
            .lock()
            .values()
            .filter(|conn| Some(&conn.peer) != except)
            .cloned()
            .collect();
        let sends = targets.iter().map(|conn| conn.send(Envelope::Message(message.clone())));
        let results = futures::future::join_all(sends).await;
        results.into_iter().filter(|r| r.is_ok()).count()
    }

    /// Takes the stream of inbound messages. Only the first call gets it.
    pub fn receive(&self) -> Option<Inbound> {
        self.inner.inbound_rx.lock().take()
    }

    /// Closes every connection without traffic for longer than `idle_threshold`.
    pub fn close_stale(&self, idle_threshold: Duration) -> Vec<NetworkId> {
        let now = util::now_millis();
        let stale: Vec<Arc<Connection>> = {
            let mut connections = self.inner.connections.lock();
            let keys: Vec<ConnectionKey> = connections
                .iter()
                .filter(|(_, conn)| conn.is_idle(now, idle_threshold))
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| connections.remove(key)).collect()
        };
        for conn in stale.iter() {
            info!("[{}] closing idle connection to {}", "p2p".cyan(), conn.peer);
            conn.close();
        }
        stale.into_iter().map(|conn| conn.peer.clone()).collect()
    }

    /// Pings every connection that has been quiet for `interval`; the pong (or any other
    /// traffic) refreshes its activity.
    pub fn keep_alive(&self, interval: Duration) -> usize {
        let now = util::now_millis();
        let connections = self.inner.connections.lock();
        let mut pinged = 0;
        for conn in connections.values() {
            if conn.is_idle(now, interval) && conn.try_send(Envelope::Ping(now)) {
                pinged += 1;
            }
        }
        pinged
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.inner.connections.lock().values().map(|conn| conn.info()).collect()
    }

    pub fn is_connected(&self, peer: &NetworkId) -> bool {
        self.inner.connections.lock().contains_key(&(peer.clone(), peer.transport_kind()))
    }

    pub fn close(&self, peer: &NetworkId) -> bool {
        let removed = self.inner.connections.lock().remove(&(peer.clone(), peer.transport_kind()));
        match removed {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    /// Closes everything and refuses new connections.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let connections: Vec<Arc<Connection>> =
            self.inner.connections.lock().drain().map(|(_, conn)| conn).collect();
        for conn in connections {
            conn.close();
        }
        self.inner.pending.lock().clear();
        info!("[{}] connection manager shut down", "p2p".cyan());
    }
}

impl Inner {
    async fn dial(inner: &Arc<Inner>, peer: &NetworkId) -> Result<ConnectionHandle> {
        let backoff = LinearBackoff::new(inner.config.backoff_delta, inner.config.connect_attempts);
        let transport = inner.transport.clone();
        let address = peer.address().clone();
        let stream = backoff
            .retry(|_| {
                let transport = transport.clone();
                let address = address.clone();
                async move { transport.connect(&address).await }
            })
            .await?;
        let (mut sender, mut receiver) = Channel::wrap(stream).split();
        let remote = timeout(
            inner.config.handshake_timeout,
            handshake::perform(&mut sender, &mut receiver, &inner.keypair, &inner.local, Some(peer)),
        )
        .await??;
        let dialed_by = *inner.local.pub_key();
        Inner::register(inner, remote, dialed_by, true, sender, receiver)
    }

    fn register(
        inner: &Arc<Inner>,
        peer: NetworkId,
        dialed_by: PubKey,
        outbound: bool,
        sender: channel::Sender,
        receiver: channel::Receiver,
    ) -> Result<ConnectionHandle> {
        if inner.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }
        let serial = inner.serial.fetch_add(1, Ordering::Relaxed);
        let (queue, outbox) = mpsc::channel(inner.config.send_queue_size.max(1));
        let closed = inner.shutdown.child_token();
        let conn = Arc::new(Connection::new(peer.clone(), serial, dialed_by, outbound, queue, closed));
        let key = (peer.clone(), peer.transport_kind());

        let (kept, dropped) = {
            let mut connections = inner.connections.lock();
            match connections.get(&key).cloned() {
                Some(existing) if !inner.replaces(&existing, &conn) => (existing, Some(conn.clone())),
                previous => {
                    connections.insert(key.clone(), conn.clone());
                    (conn.clone(), previous)
                }
            }
        };

        if let Some(dropped) = dropped {
            debug!("[{}] dropping duplicate connection #{} to {}", "p2p".cyan(), dropped.serial, peer);
            dropped.close();
        }
        // Tasks run even for a losing connection so that its stream is closed in an orderly way.
        tokio::spawn(write_loop(conn.clone(), outbox, sender));
        tokio::spawn(read_loop(Arc::downgrade(inner), conn.clone(), key, receiver));
        if Arc::ptr_eq(&kept, &conn) {
            info!(
                "[{}] {} {}",
                "p2p".cyan(),
                if outbound { "connected to" } else { "accepted" },
                peer
            );
        }
        Ok(kept.handle())
    }

    /// Simultaneous dials: both nodes keep the connection dialed by the lower public key.
    fn replaces(&self, existing: &Connection, candidate: &Connection) -> bool {
        if existing.closed.is_cancelled() || existing.dialed_by == candidate.dialed_by {
            return true;
        }
        let preferred = std::cmp::min(*self.local.pub_key(), *candidate.peer.pub_key());
        candidate.dialed_by == preferred
    }

    fn live(&self, handle: &ConnectionHandle) -> Option<Arc<Connection>> {
        self.connections.lock().get(&handle.key()).filter(|conn| conn.serial == handle.serial).cloned()
    }

    /// Removes the connection if it is still the registered one for its key.
    fn remove(&self, key: &ConnectionKey, serial: u64) {
        let mut connections = self.connections.lock();
        if connections.get(key).map(|conn| conn.serial) == Some(serial) {
            connections.remove(key);
        }
    }
}

async fn write_loop(conn: Arc<Connection>, mut outbox: mpsc::Receiver<Outbound>, mut sender: channel::Sender) {
    loop {
        let outbound = tokio::select! {
            _ = conn.closed.cancelled() => break,
            outbound = outbox.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
        };
        let result = sender.send(&outbound.envelope).await.map_err(Error::from);
        let failed = result.as_ref().map_err(|err| err.clone()).err();
        if let Some(ack) = outbound.ack {
            let _ = ack.send(result);
        }
        if let Some(err) = failed {
            match err {
                Error::Codec(err) => warn!("[{}] could not encode message for {}: {}", "p2p".cyan(), conn.peer, err),
                err => {
                    warn!("[{}] write to {} failed: {}", "p2p".cyan(), conn.peer, err);
                    break;
                }
            }
        }
    }
    conn.close();
    // Everything still queued fails with ConnectionClosed when its ack is dropped.
    outbox.close();
    while outbox.recv().await.is_some() {}
    let _ = sender.close().await;
}

async fn read_loop(
    inner: Weak<Inner>,
    conn: Arc<Connection>,
    key: ConnectionKey,
    mut receiver: channel::Receiver,
) {
    loop {
        let received = tokio::select! {
            _ = conn.closed.cancelled() => break,
            received = receiver.recv() => received,
        };
        match received {
            Ok(Some(envelope)) => {
                conn.touch();
                match envelope {
                    Envelope::Ping(nonce) => {
                        conn.try_send(Envelope::Pong(nonce));
                    }
                    Envelope::Pong(_) => {}
                    Envelope::Message(message) => {
                        let inner = match inner.upgrade() {
                            Some(inner) => inner,
                            None => break,
                        };
                        if inner.inbound_tx.unbounded_send((conn.peer.clone(), message)).is_err() {
                            debug!("[{}] inbound stream dropped, discarding message", "p2p".cyan());
                        }
                    }
                    other => {
                        warn!("[{}] unexpected {} from {}", "p2p".cyan(), other.message_case(), conn.peer);
                    }
                }
            }
            Ok(None) => {
                debug!("[{}] {} closed the connection", "p2p".cyan(), conn.peer);
                break;
            }
            Err(err) if !err.is_fatal() => {
                warn!("[{}] dropping message from {}: {}", "p2p".cyan(), conn.peer, err);
            }
            Err(err) => {
                warn!("[{}] read from {} failed: {}", "p2p".cyan(), conn.peer, err);
                break;
            }
        }
    }
    conn.close();
    if let Some(inner) = inner.upgrade() {
        inner.remove(&key, conn.serial);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;
    use crate::network::Address;
    use crate::offer::{Direction, Market, Offer, PriceSpec};
    use crate::protocol::{GossipMessage, GossipPayload};
    use crate::transport::clearnet::{ClearnetSettings, ClearnetTransport};
    use crate::transport::{self, Config, IoPool, ProxyHandle, ServerSocketResult};

    use ed25519_dalek::Keypair;
    use futures::StreamExt;
    use rand::rngs::OsRng;
    use std::sync::atomic::AtomicUsize;

    /// Counts dials and otherwise delegates to a clearnet transport.
    struct CountingTransport {
        inner: ClearnetTransport,
        dials: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn kind(&self) -> TransportKind {
            self.inner.kind()
        }

        fn initialize(&self) -> BoxFuture<'_, transport::Result<()>> {
            self.inner.initialize()
        }

        fn listen(&self, port: u16, node_id: String) -> BoxFuture<'_, transport::Result<ServerSocketResult>> {
            self.inner.listen(port, node_id)
        }

        fn connect<'a>(&'a self, address: &'a crate::network::Address) -> BoxFuture<'a, transport::Result<ConnectionStream>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            self.inner.connect(address)
        }

        fn is_reachable<'a>(&'a self, address: &'a crate::network::Address) -> BoxFuture<'a, bool> {
            self.inner.is_reachable(address)
        }

        fn resolve_public_address(&self, node_id: &str) -> Option<crate::network::Address> {
            self.inner.resolve_public_address(node_id)
        }

        fn proxy(&self) -> Option<ProxyHandle> {
            self.inner.proxy()
        }

        fn shutdown(&self) -> BoxFuture<'_, transport::Result<()>> {
            self.inner.shutdown()
        }
    }

    struct TestNode {
        manager: ConnectionManager,
        id: NetworkId,
        keypair: Arc<Keypair>,
        transport: Arc<CountingTransport>,
    }

    fn fast_config() -> ManagerConfig {
        ManagerConfig {
            handshake_timeout: Duration::from_secs(5),
            connect_attempts: 2,
            backoff_delta: Duration::from_millis(50),
            send_queue_size: 16,
        }
    }

    async fn node() -> TestNode {
        let config = Config {
            base_dir: std::env::temp_dir().join(format!("tradenet-manager-{}", Id::generate())),
            socket_timeout: Duration::from_secs(5),
        };
        let settings = ClearnetSettings { bind_host: "127.0.0.1".to_owned(), ..Default::default() };
        let clear = ClearnetTransport::new(config, settings, IoPool::new(1).unwrap());
        let transport = Arc::new(CountingTransport { inner: clear, dials: AtomicUsize::new(0) });
        transport.initialize().await.unwrap();
        let mut server = transport.listen(0, "node".to_owned()).await.unwrap();

        let keypair = Arc::new(Keypair::generate(&mut OsRng {}));
        let id = NetworkId::new(PubKey::from(&keypair.public), server.address.clone());
        let manager = ConnectionManager::new(keypair.clone(), id.clone(), transport.clone(), fast_config());
        let acceptor = manager.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = server.server.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    let _ = acceptor.accept_inbound(stream).await;
                });
            }
        });
        TestNode { manager, id, keypair, transport }
    }

    fn gossip(node: &TestNode) -> Message {
        let offer = Offer::new(
            node.id.clone(),
            Direction::Sell,
            Market::new("BTC", "EUR"),
            100_000,
            PriceSpec::from_premium_as_percentage(0.01),
        );
        Message::Gossip(GossipMessage::sign(&node.keypair, GossipPayload::Offer(offer)).unwrap())
    }

    #[actix_rt::test]
    async fn delivers_messages_with_the_proven_sender() {
        let a = node().await;
        let b = node().await;
        let mut inbound = b.manager.receive().unwrap();
        assert!(b.manager.receive().is_none());

        let handle = a.manager.connect_to(&b.id).await.unwrap();
        assert_eq!(handle.peer(), &b.id);
        let message = gossip(&a);
        a.manager.send(&handle, message.clone()).await.unwrap();

        let (from, received) = timeout(Duration::from_secs(5), inbound.next()).await.unwrap().unwrap();
        assert_eq!(from, a.id);
        assert_eq!(received, message);
        assert!(b.manager.is_connected(&a.id));
    }

    #[actix_rt::test]
    async fn concurrent_connects_share_one_dial() {
        let a = node().await;
        let b = node().await;
        let attempts = (0..8).map(|_| a.manager.connect_to(&b.id));
        let handles = futures::future::join_all(attempts).await;
        let first = handles[0].as_ref().unwrap().clone();
        for handle in handles {
            assert_eq!(handle.unwrap(), first);
        }
        assert_eq!(a.transport.dials.load(Ordering::SeqCst), 1);

        // A live connection is reused without dialing again.
        assert_eq!(a.manager.connect_to(&b.id).await.unwrap(), first);
        assert_eq!(a.transport.dials.load(Ordering::SeqCst), 1);
        assert_eq!(a.manager.connections().len(), 1);
    }

    #[actix_rt::test]
    async fn closed_connection_rejects_sends() {
        let a = node().await;
        let b = node().await;
        let handle = a.manager.connect_to(&b.id).await.unwrap();
        assert!(a.manager.close(&b.id));
        assert!(!a.manager.close(&b.id));
        assert_eq!(a.manager.send(&handle, gossip(&a)).await, Err(Error::ConnectionClosed));

        // A fresh connection gets a fresh handle; the old one stays dead.
        let fresh = a.manager.connect_to(&b.id).await.unwrap();
        assert_ne!(fresh, handle);
        assert_eq!(a.manager.send(&handle, gossip(&a)).await, Err(Error::ConnectionClosed));
        a.manager.send(&fresh, gossip(&a)).await.unwrap();
    }

    #[actix_rt::test]
    async fn idle_connections_are_closed() {
        let a = node().await;
        let b = node().await;
        a.manager.connect_to(&b.id).await.unwrap();
        assert!(a.manager.close_stale(Duration::from_secs(60)).is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(a.manager.close_stale(Duration::from_millis(1)), vec![b.id.clone()]);
        assert!(a.manager.connections().is_empty());
    }

    #[actix_rt::test]
    async fn keep_alive_refreshes_both_sides() {
        let a = node().await;
        let b = node().await;
        a.manager.connect_to(&b.id).await.unwrap();
        assert_eq!(a.manager.keep_alive(Duration::from_secs(60)), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(a.manager.keep_alive(Duration::from_millis(100)), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a.manager.close_stale(Duration::from_millis(150)).is_empty());
        assert!(b.manager.close_stale(Duration::from_millis(150)).is_empty());
    }

    #[actix_rt::test]
    async fn broadcast_skips_the_excluded_peer() {
        let a = node().await;
        let b = node().await;
        let c = node().await;
        a.manager.connect_to(&b.id).await.unwrap();
        a.manager.connect_to(&c.id).await.unwrap();
        assert_eq!(a.manager.broadcast(gossip(&a), Some(&c.id)).await, 1);
        assert_eq!(a.manager.broadcast(gossip(&a), None).await, 2);
    }

    #[actix_rt::test]
    async fn dialing_the_wrong_identity_fails() {
        let a = node().await;
        let b = node().await;
        let stranger = Keypair::generate(&mut OsRng {});
        let impostor = NetworkId::new(PubKey::from(&stranger.public), b.id.address().clone());
        match a.manager.connect_to(&impostor).await {
            Err(Error::UnexpectedPeer { expected, actual }) => {
                assert_eq!(expected, impostor);
                assert_eq!(actual, b.id);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(a.manager.connections().is_empty());
    }

    #[actix_rt::test]
    async fn other_transports_are_refused() {
        let a = node().await;
        let onion = NetworkId::new(*a.id.pub_key(), Address::new("abcdef.onion", 9999, TransportKind::Tor));
        assert_eq!(
            a.manager.connect_to(&onion).await,
            Err(Error::UnsupportedTransport(TransportKind::Tor))
        );
    }

    #[actix_rt::test]
    async fn simultaneous_dials_settle_on_one_connection() {
        let a = node().await;
        let b = node().await;
        let (ab, ba) = tokio::join!(a.manager.connect_to(&b.id), b.manager.connect_to(&a.id));
        ab.unwrap();
        ba.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(a.manager.connections().len(), 1);
        assert_eq!(b.manager.connections().len(), 1);

        let mut inbound = b.manager.receive().unwrap();
        let handle = a.manager.connect_to(&b.id).await.unwrap();
        a.manager.send(&handle, gossip(&a)).await.unwrap();
        let (from, _) = timeout(Duration::from_secs(5), inbound.next()).await.unwrap().unwrap();
        assert_eq!(from, a.id);
    }

    #[actix_rt::test]
    async fn shutdown_refuses_new_work() {
        let a = node().await;
        let b = node().await;
        let handle = a.manager.connect_to(&b.id).await.unwrap();
        a.manager.shutdown();
        assert!(a.manager.connections().is_empty());
        assert_eq!(a.manager.connect_to(&b.id).await, Err(Error::Shutdown));
        assert_eq!(a.manager.send(&handle, gossip(&a)).await, Err(Error::ConnectionClosed));
    }

    #[actix_rt::test]
    async fn cancelled_connect_returns_early() {
        let a = node().await;
        let unreachable = NetworkId::new(
            PubKey::from(&Keypair::generate(&mut OsRng {}).public),
            Address::new("10.255.255.1", 9, TransportKind::Clear),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(a.manager.connect_to_cancellable(&unreachable, cancel).await, Err(Error::Cancelled));
    }
}
