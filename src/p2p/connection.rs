use super::prelude::*;

use crate::util;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) type ConnectionKey = (NetworkId, TransportKind);

/// Refers to one live connection. Becomes stale when that connection is removed, even if a
/// new connection to the same peer takes its place.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ConnectionHandle {
    pub(crate) peer: NetworkId,
    pub(crate) serial: u64,
}

impl ConnectionHandle {
    pub fn peer(&self) -> &NetworkId {
        &self.peer
    }

    pub(crate) fn key(&self) -> ConnectionKey {
        (self.peer.clone(), self.peer.transport_kind())
    }
}

/// A snapshot of a connection for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub peer: NetworkId,
    pub kind: TransportKind,
    pub created_at: u64,
    pub last_activity: u64,
    pub outbound: bool,
}

pub(crate) struct Outbound {
    pub envelope: Envelope,
    pub ack: Option<oneshot::Sender<Result<()>>>,
}

/// The manager's side of a connection: a queue into its writer task plus bookkeeping.
pub(crate) struct Connection {
    pub peer: NetworkId,
    pub serial: u64,
    /// Key of the node that dialed this connection; decides simultaneous-dial races.
    pub dialed_by: PubKey,
    pub outbound: bool,
    pub created_at: u64,
    last_activity: AtomicU64,
    queue: mpsc::Sender<Outbound>,
    pub closed: CancellationToken,
}

impl Connection {
    pub fn new(
        peer: NetworkId,
        serial: u64,
        dialed_by: PubKey,
        outbound: bool,
        queue: mpsc::Sender<Outbound>,
        closed: CancellationToken,
    ) -> Connection {
        let now = util::now_millis();
        Connection {
            peer,
            serial,
            dialed_by,
            outbound,
            created_at: now,
            last_activity: AtomicU64::new(now),
            queue,
            closed,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        ConnectionHandle { peer: self.peer.clone(), serial: self.serial }
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            peer: self.peer.clone(),
            kind: self.peer.transport_kind(),
            created_at: self.created_at,
            last_activity: self.last_activity(),
            outbound: self.outbound,
        }
    }

    pub fn touch(&self) {
        self.last_activity.fetch_max(util::now_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn is_idle(&self, now: u64, threshold: Duration) -> bool {
        now.saturating_sub(self.last_activity()) > threshold.as_millis() as u64
    }

    /// Queues `envelope` and waits for the writer task to put it on the wire.
    pub async fn send(&self, envelope: Envelope) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        let (ack, done) = oneshot::channel();
        self.queue
            .send(Outbound { envelope, ack: Some(ack) })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        done.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Queues `envelope` without waiting; dropped when the queue is full.
    pub fn try_send(&self, envelope: Envelope) -> bool {
        !self.closed.is_cancelled() && self.queue.try_send(Outbound { envelope, ack: None }).is_ok()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Address;

    fn connection() -> (Connection, mpsc::Receiver<Outbound>) {
        let peer = NetworkId::new(
            PubKey::from_bytes(&[1u8; 32]).unwrap(),
            Address::new("127.0.0.1", 1, TransportKind::Clear),
        );
        let (tx, rx) = mpsc::channel(1);
        let conn = Connection::new(peer.clone(), 1, *peer.pub_key(), true, tx, CancellationToken::new());
        (conn, rx)
    }

    #[actix_rt::test]
    async fn send_after_close_fails() {
        let (conn, _rx) = connection();
        conn.close();
        assert_eq!(conn.send(Envelope::Ping(1)).await, Err(Error::ConnectionClosed));
        assert!(!conn.try_send(Envelope::Ping(1)));
    }

    #[actix_rt::test]
    async fn dropped_writer_fails_queued_sends() {
        let (conn, mut rx) = connection();
        let writer = tokio::spawn(async move {
            // Take the message and drop it without acknowledging, as a dying writer does.
            let _ = rx.recv().await;
        });
        assert_eq!(conn.send(Envelope::Ping(1)).await, Err(Error::ConnectionClosed));
        writer.await.unwrap();
    }

    #[test]
    fn idleness() {
        let (conn, _rx) = connection();
        let now = conn.last_activity();
        assert!(!conn.is_idle(now + 1_000, Duration::from_secs(1)));
        assert!(conn.is_idle(now + 1_001, Duration::from_secs(1)));
    }
}
