//! Garlic-routed transport through an I2P router's SAM bridge.

mod sam;

pub use sam::{SamConnection, SamReply};

use super::{Acceptor, Config, ConnectionStream, Error, IoPool, Lifecycle, ProxyHandle, Result};
use super::{ServerSocketResult, Transport};

use crate::colored::Colorize;
use crate::id::Id;
use crate::network::{Address, TransportKind};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
pub struct I2pSettings {
    #[serde(default = "default_sam_address")]
    pub sam_address: SocketAddr,
    /// 7 is EdDSA-SHA512-Ed25519.
    #[serde(default = "default_signature_type")]
    pub signature_type: u8,
    /// Session creation builds tunnels and can take minutes on a fresh router.
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

fn default_sam_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7656))
}
fn default_signature_type() -> u8 {
    7
}
fn default_session_timeout_secs() -> u64 {
    300
}

impl Default for I2pSettings {
    fn default() -> Self {
        I2pSettings {
            sam_address: default_sam_address(),
            signature_type: default_signature_type(),
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

/// A SAM session; it lives as long as its control socket stays open.
struct Session {
    id: String,
    _control: SamConnection,
}

pub struct I2pTransport {
    config: Config,
    settings: I2pSettings,
    io_pool: IoPool,
    lifecycle: Lifecycle,
    i2p_dir: PathBuf,
    /// Listening sessions by node id.
    sessions: Mutex<HashMap<String, Session>>,
    /// Session used to dial out when nothing is listening.
    dialer: Mutex<Option<Session>>,
}

impl I2pTransport {
    pub fn new(config: Config, settings: I2pSettings, io_pool: IoPool) -> Self {
        let i2p_dir = config.base_dir.join("i2p");
        I2pTransport {
            config,
            settings,
            io_pool,
            lifecycle: Lifecycle::default(),
            i2p_dir,
            sessions: Mutex::new(HashMap::new()),
            dialer: Mutex::new(None),
        }
    }

    fn node_dir(&self, node_id: &str) -> PathBuf {
        self.i2p_dir.join(node_id)
    }

    async fn create_session(&self, session_id: String, private: Option<String>) -> Result<(Session, String, String)> {
        let bridge = self.settings.sam_address;
        let signature_type = self.settings.signature_type;
        let within = Duration::from_secs(self.settings.session_timeout_secs);
        let id = session_id.clone();
        self.io_pool
            .run(async move {
                let create = async {
                    let mut control = SamConnection::open(bridge).await?;
                    let private = control.create_session(&id, private.as_deref(), signature_type).await?;
                    let public = control.lookup("ME").await?;
                    Ok::<_, Error>((Session { id: id.clone(), _control: control }, private, public))
                };
                timeout(within, create).await?
            })
            .await
    }

    /// Any live session id to originate streams from.
    async fn dialing_session(&self) -> Result<String> {
        if let Some(session) = self.sessions.lock().await.values().next() {
            return Ok(session.id.clone());
        }
        let mut dialer = self.dialer.lock().await;
        if let Some(session) = dialer.as_ref() {
            return Ok(session.id.clone());
        }
        let id = format!("tradenet-dial-{}", &Id::generate().to_string()[..8]);
        let (session, _, _) = self.create_session(id, None).await?;
        let id = session.id.clone();
        *dialer = Some(session);
        Ok(id)
    }
}

impl Transport for I2pTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::I2p
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.begin_initialize()?;
            let bridge = self.settings.sam_address;
            let socket_timeout = self.config.socket_timeout;
            let hello = self
                .io_pool
                .run(async move { timeout(socket_timeout, SamConnection::open(bridge)).await? })
                .await;
            let running = self.lifecycle.finish_initialize(hello.is_ok());
            hello.map_err(|e| Error::Bootstrap(format!("SAM bridge at {} unavailable: {}", bridge, e)))?;
            if !running {
                return Err(Error::Shutdown);
            }
            info!("[{}] SAM bridge at {} ready", "i2p".yellow(), bridge);
            Ok(())
        })
    }

    fn listen(&self, port: u16, node_id: String) -> BoxFuture<'_, Result<ServerSocketResult>> {
        Box::pin(async move {
            self.lifecycle.ensure_running()?;
            let ts = Instant::now();
            let dir = self.node_dir(&node_id);
            tokio::fs::create_dir_all(&dir).await?;
            let existing = tokio::fs::read_to_string(dir.join("destination")).await.ok().map(|d| d.trim().to_owned());

            let session_id = format!("tradenet-{}", node_id);
            let (session, private, public) = self.create_session(session_id.clone(), existing).await?;
            tokio::fs::write(dir.join("destination"), &private).await?;
            tokio::fs::write(dir.join("public"), &public).await?;
            self.sessions.lock().await.insert(node_id.clone(), session);

            let address = Address::new(public, port, TransportKind::I2p);
            info!("[{}] session {} ready in {:?}", "i2p".yellow(), session_id, ts.elapsed());
            let server = I2pAcceptor { bridge: self.settings.sam_address, session_id, io_pool: self.io_pool.clone() };
            Ok(ServerSocketResult { node_id, server: Box::new(server), address })
        })
    }

    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<ConnectionStream>> {
        Box::pin(async move {
            if address.kind() != TransportKind::I2p || !address.is_plausible() {
                return Err(Error::UnsupportedAddress(address.clone()));
            }
            self.lifecycle.ensure_running()?;
            let session_id = self.dialing_session().await?;
            let bridge = self.settings.sam_address;
            let destination = address.host().to_owned();
            let socket_timeout = self.config.socket_timeout;
            let ts = Instant::now();
            let stream = self
                .io_pool
                .run(async move {
                    let connect = async {
                        SamConnection::open(bridge).await?.stream_connect(&session_id, &destination).await
                    };
                    timeout(socket_timeout, connect).await?
                })
                .await?;
            info!("[{}] stream to {} created in {:?}", "i2p".yellow(), address, ts.elapsed());
            Ok(ConnectionStream::Tcp(stream))
        })
    }

    fn is_reachable<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.connect(address).await.is_ok() })
    }

    fn resolve_public_address(&self, node_id: &str) -> Option<Address> {
        let public = std::fs::read_to_string(self.node_dir(node_id).join("public")).ok()?;
        let public = public.trim();
        if public.is_empty() {
            return None;
        }
        Some(Address::new(public, TransportKind::I2p.default_port(), TransportKind::I2p))
    }

    fn proxy(&self) -> Option<ProxyHandle> {
        None
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.lifecycle.begin_shutdown() {
                // Closing the control sockets ends the sessions on the router.
                self.sessions.lock().await.clear();
                self.dialer.lock().await.take();
                info!("[{}] shut down", "i2p".yellow());
            }
            Ok(())
        })
    }
}

struct I2pAcceptor {
    bridge: SocketAddr,
    session_id: String,
    io_pool: IoPool,
}

impl Acceptor for I2pAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, Result<(ConnectionStream, String)>> {
        let bridge = self.bridge;
        let session_id = self.session_id.clone();
        let io_pool = self.io_pool.clone();
        Box::pin(async move {
            let (stream, peer) = io_pool
                .run(async move { SamConnection::open(bridge).await?.stream_accept(&session_id).await })
                .await?;
            let peer = peer.chars().take(16).collect();
            Ok((ConnectionStream::Tcp(stream), peer))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(sam_address: SocketAddr) -> I2pTransport {
        let config = Config {
            base_dir: std::env::temp_dir().join(format!("tradenet-i2p-{}", Id::generate())),
            socket_timeout: Duration::from_secs(1),
        };
        let settings = I2pSettings { sam_address, ..Default::default() };
        I2pTransport::new(config, settings, IoPool::new(1).unwrap())
    }

    #[actix_rt::test]
    async fn missing_bridge_fails_initialize() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let t = transport(addr);
        assert!(matches!(t.initialize().await, Err(Error::Bootstrap(_))));
        assert!(matches!(t.listen(5000, "n".to_owned()).await, Err(Error::Shutdown)));
    }

    #[actix_rt::test]
    async fn persisted_destination_resolves() {
        let t = transport(default_sam_address());
        let dir = t.node_dir("n1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("public"), "AAAA~base64~dest").unwrap();
        assert_eq!(
            t.resolve_public_address("n1"),
            Some(Address::new("AAAA~base64~dest", 5000, TransportKind::I2p))
        );
    }
}
