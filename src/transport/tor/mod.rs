//! Onion-routed transport backed by a `tor` process owned by the node.

mod control;
mod daemon;
mod socks5;

pub use control::{ControlConnection, OnionService};
pub use daemon::TorDaemon;

use super::{Acceptor, Config, ConnectionStream, Error, IoPool, Lifecycle, ProxyHandle, Result};
use super::{ServerSocketResult, Transport};

use crate::colored::Colorize;
use crate::network::{Address, TransportKind};

use futures::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
pub struct TorSettings {
    #[serde(default = "default_tor_binary")]
    pub tor_binary: String,
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
    #[serde(default = "default_control_port")]
    pub control_port: u16,
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub bootstrap_timeout_secs: u64,
    /// How long `listen` waits for the onion descriptor to be published.
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
}

fn default_tor_binary() -> String {
    "tor".to_owned()
}
fn default_socks_port() -> u16 {
    19050
}
fn default_control_port() -> u16 {
    19051
}
fn default_bootstrap_timeout_secs() -> u64 {
    180
}
fn default_publish_timeout_secs() -> u64 {
    180
}

impl Default for TorSettings {
    fn default() -> Self {
        TorSettings {
            tor_binary: default_tor_binary(),
            socks_port: default_socks_port(),
            control_port: default_control_port(),
            bootstrap_timeout_secs: default_bootstrap_timeout_secs(),
            publish_timeout_secs: default_publish_timeout_secs(),
        }
    }
}

struct TorState {
    daemon: TorDaemon,
    control: ControlConnection,
}

pub struct TorTransport {
    config: Config,
    settings: TorSettings,
    io_pool: IoPool,
    lifecycle: Lifecycle,
    tor_dir: PathBuf,
    state: Mutex<Option<TorState>>,
}

impl TorTransport {
    pub fn new(config: Config, settings: TorSettings, io_pool: IoPool) -> Self {
        let tor_dir = config.base_dir.join("tor");
        TorTransport { config, settings, io_pool, lifecycle: Lifecycle::default(), tor_dir, state: Mutex::new(None) }
    }

    fn socks_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.settings.socks_port))
    }

    fn control_address(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.settings.control_port))
    }

    fn hidden_service_dir(&self, node_id: &str) -> PathBuf {
        self.tor_dir.join("hiddenservice").join(node_id)
    }

    async fn authenticated_control(&self) -> Result<ControlConnection> {
        let mut control = ControlConnection::connect(self.control_address()).await?;
        control.authenticate(&daemon::cookie_file(&self.tor_dir)).await?;
        Ok(control)
    }

    async fn start(&self) -> Result<TorState> {
        let settings = self.settings.clone();
        let tor_dir = self.tor_dir.clone();
        let daemon = self.io_pool.run(async move { TorDaemon::launch(&settings, &tor_dir).await }).await?;
        match self.authenticated_control().await {
            Ok(control) => Ok(TorState { daemon, control }),
            Err(err) => {
                let _ = self.io_pool.run(daemon.stop()).await;
                Err(err)
            }
        }
    }

    async fn stop(&self, mut state: TorState) -> Result<()> {
        if let Err(err) = state.control.signal_shutdown().await {
            warn!("[{}] shutdown signal failed: {}", "tor".purple(), err);
        }
        self.io_pool.run(state.daemon.stop()).await
    }

    async fn publish(&self, port: u16, node_id: &str, local_port: u16) -> Result<String> {
        let hs_dir = self.hidden_service_dir(node_id);
        tokio::fs::create_dir_all(&hs_dir).await?;
        let key_file = hs_dir.join("private_key");
        let existing_key = match tokio::fs::read_to_string(&key_file).await {
            Ok(key) => Some(key.trim().to_owned()),
            Err(_) => None,
        };

        // Subscribe before creating the service so the upload event cannot be missed.
        let mut events = self.authenticated_control().await?;
        events.subscribe_hs_desc().await?;

        let service = {
            let mut state = self.state.lock().await;
            let state = state.as_mut().ok_or(Error::NotInitialized)?;
            state.control.add_onion(existing_key.as_deref(), port, local_port).await?
        };
        if let Some(key) = &service.private_key {
            tokio::fs::write(&key_file, key).await?;
        }
        let hostname = format!("{}.onion", service.service_id);
        tokio::fs::write(hs_dir.join("hostname"), &hostname).await?;

        let publish_timeout = Duration::from_secs(self.settings.publish_timeout_secs);
        events.wait_for_upload(&service.service_id, publish_timeout).await?;
        Ok(hostname)
    }
}

impl Transport for TorTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tor
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.begin_initialize()?;
            info!("[{}] initializing", "tor".purple());
            let ts = Instant::now();
            let started = self.start().await;
            // Held until the state is stored so that a concurrent shutdown either finds it or
            // is seen here.
            let mut slot = self.state.lock().await;
            let running = self.lifecycle.finish_initialize(started.is_ok());
            let state = started?;
            if !running {
                drop(slot);
                info!("[{}] shut down while starting, stopping tor", "tor".purple());
                self.stop(state).await?;
                return Err(Error::Shutdown);
            }
            *slot = Some(state);
            info!("[{}] ready in {:?}", "tor".purple(), ts.elapsed());
            Ok(())
        })
    }

    fn listen(&self, port: u16, node_id: String) -> BoxFuture<'_, Result<ServerSocketResult>> {
        Box::pin(async move {
            self.lifecycle.ensure_running()?;
            info!("[{}] starting onion service on port {} for {}", "tor".purple(), port, node_id);
            let ts = Instant::now();
            let listener =
                self.io_pool.run(async { Ok(TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?) }).await?;
            let local_port = listener.local_addr()?.port();
            let hostname = self.publish(port, &node_id, local_port).await?;
            let address = Address::new(hostname, port, TransportKind::Tor);
            info!("[{}] onion service {} ready in {:?}", "tor".purple(), address, ts.elapsed());
            Ok(ServerSocketResult { node_id, server: Box::new(TorAcceptor { listener }), address })
        })
    }

    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<ConnectionStream>> {
        Box::pin(async move {
            if address.kind() != TransportKind::Tor || !address.is_plausible() {
                return Err(Error::UnsupportedAddress(address.clone()));
            }
            self.lifecycle.ensure_running()?;
            let proxy = self.socks_address();
            let host = address.host().to_owned();
            let port = address.port();
            let socket_timeout = self.config.socket_timeout;
            let ts = Instant::now();
            let stream = self
                .io_pool
                .run(async move { timeout(socket_timeout, socks5::connect(proxy, &host, port)).await? })
                .await?;
            info!("[{}] socket to {} created in {:?}", "tor".purple(), address, ts.elapsed());
            Ok(ConnectionStream::Tcp(stream))
        })
    }

    fn is_reachable<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, bool> {
        Box::pin(async move { self.connect(address).await.is_ok() })
    }

    fn resolve_public_address(&self, node_id: &str) -> Option<Address> {
        let hostname = std::fs::read_to_string(self.hidden_service_dir(node_id).join("hostname")).ok()?;
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return None;
        }
        Some(Address::new(hostname, TransportKind::Tor.default_port(), TransportKind::Tor))
    }

    fn proxy(&self) -> Option<ProxyHandle> {
        self.lifecycle.ensure_running().ok()?;
        Some(ProxyHandle { socks_address: self.socks_address() })
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.lifecycle.begin_shutdown() {
                return Ok(());
            }
            info!("[{}] shutting down", "tor".purple());
            let state = self.state.lock().await.take();
            if let Some(state) = state {
                self.stop(state).await?;
            }
            Ok(())
        })
    }
}

struct TorAcceptor {
    listener: TcpListener,
}

impl Acceptor for TorAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, Result<(ConnectionStream, String)>> {
        Box::pin(async move {
            // Tor forwards every inbound stream from localhost; the remote end is anonymous.
            let (stream, _) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            Ok((ConnectionStream::Tcp(stream), "onion".to_owned()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;

    fn transport() -> TorTransport {
        let config = Config {
            base_dir: std::env::temp_dir().join(format!("tradenet-tor-{}", Id::generate())),
            socket_timeout: Duration::from_secs(1),
        };
        TorTransport::new(config, TorSettings::default(), IoPool::new(1).unwrap())
    }

    #[actix_rt::test]
    async fn persisted_hostname_resolves_with_default_port() {
        let t = transport();
        assert_eq!(t.resolve_public_address("n1"), None);
        let dir = t.hidden_service_dir("n1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hostname"), "abcdefghij.onion\n").unwrap();
        assert_eq!(
            t.resolve_public_address("n1"),
            Some(Address::new("abcdefghij.onion", 9999, TransportKind::Tor))
        );
    }

    #[actix_rt::test]
    async fn no_proxy_and_no_dialing_before_initialize() {
        let t = transport();
        assert_eq!(t.proxy(), None);
        let onion = Address::new("abcdefghij.onion", 9999, TransportKind::Tor);
        assert!(matches!(t.connect(&onion).await, Err(Error::NotInitialized)));
        let clear = Address::new("127.0.0.1", 9999, TransportKind::Clear);
        assert!(matches!(t.connect(&clear).await, Err(Error::UnsupportedAddress(_))));
        t.shutdown().await.unwrap();
        t.shutdown().await.unwrap();
    }
}
