use super::tls::certificate;
use super::tls::upgrader::{tcp_upgraders, tls_upgraders, Upgrader, Upgraders};
use super::{Acceptor, Config, ConnectionStream, Error, IoPool, Lifecycle, ProxyHandle, Result};
use super::{ServerSocketResult, Transport};

use crate::colored::Colorize;
use crate::network::{Address, TransportKind};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Deserialize)]
pub struct ClearnetSettings {
    #[serde(default)]
    pub use_tls: bool,
    /// Interface the listener binds to.
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    /// Host advertised to peers.
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_public_host() -> String {
    "127.0.0.1".to_owned()
}

impl Default for ClearnetSettings {
    fn default() -> Self {
        ClearnetSettings { use_tls: false, bind_host: default_bind_host(), public_host: default_public_host() }
    }
}

/// Direct TCP connections, optionally wrapped in TLS.
pub struct ClearnetTransport {
    config: Config,
    settings: ClearnetSettings,
    io_pool: IoPool,
    lifecycle: Lifecycle,
    upgraders: Mutex<Option<Upgraders>>,
    listening: Mutex<HashMap<String, Address>>,
}

impl ClearnetTransport {
    pub fn new(config: Config, settings: ClearnetSettings, io_pool: IoPool) -> Self {
        ClearnetTransport {
            config,
            settings,
            io_pool,
            lifecycle: Lifecycle::default(),
            upgraders: Mutex::new(None),
            listening: Mutex::new(HashMap::new()),
        }
    }

    fn upgraders(&self) -> Result<Upgraders> {
        self.lifecycle.ensure_running()?;
        self.upgraders.lock().clone().ok_or(Error::NotInitialized)
    }

    fn build_upgraders(&self) -> Result<Upgraders> {
        if self.settings.use_tls {
            let (cert, key) = certificate::load_or_generate(&self.config.base_dir.join("tls"))?;
            Ok(tls_upgraders(&cert, &key)?)
        } else {
            Ok(tcp_upgraders())
        }
    }
}

impl Transport for ClearnetTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Clear
    }

    fn initialize(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.begin_initialize()?;
            let upgraders = self.build_upgraders();
            let running = self.lifecycle.finish_initialize(upgraders.is_ok());
            let upgraders = upgraders?;
            if !running {
                return Err(Error::Shutdown);
            }
            *self.upgraders.lock() = Some(upgraders);
            info!("[{}] initialized (tls = {})", "clearnet".green(), self.settings.use_tls);
            Ok(())
        })
    }

    fn listen(&self, port: u16, node_id: String) -> BoxFuture<'_, Result<ServerSocketResult>> {
        Box::pin(async move {
            let upgraders = self.upgraders()?;
            let bind = (self.settings.bind_host.clone(), port);
            let listener = self.io_pool.run(async move { Ok(TcpListener::bind(bind).await?) }).await?;
            let port = listener.local_addr()?.port();
            let address = Address::new(self.settings.public_host.clone(), port, TransportKind::Clear);
            self.listening.lock().insert(node_id.clone(), address.clone());
            info!("[{}] listening on {} for {}", "clearnet".green(), address, node_id);
            let server = ClearnetAcceptor {
                listener,
                upgrader: upgraders.server,
                socket_timeout: self.config.socket_timeout,
            };
            Ok(ServerSocketResult { node_id, server: Box::new(server), address })
        })
    }

    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<ConnectionStream>> {
        Box::pin(async move {
            if address.kind() != TransportKind::Clear {
                return Err(Error::UnsupportedAddress(address.clone()));
            }
            let upgrader = self.upgraders()?.client;
            let socket_timeout = self.config.socket_timeout;
            let target = (address.host().to_owned(), address.port());
            let ts = Instant::now();
            let stream = self
                .io_pool
                .run(async move {
                    let tcp = timeout(socket_timeout, TcpStream::connect(target)).await??;
                    tcp.set_nodelay(true)?;
                    Ok(timeout(socket_timeout, upgrader.upgrade(tcp)).await??)
                })
                .await?;
            debug!("[{}] connected to {} in {:?}", "clearnet".green(), address, ts.elapsed());
            Ok(stream)
        })
    }

    fn is_reachable<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let target = (address.host().to_owned(), address.port());
            let socket_timeout = self.config.socket_timeout;
            self.io_pool
                .run(async move { Ok(timeout(socket_timeout, TcpStream::connect(target)).await??) })
                .await
                .is_ok()
        })
    }

    fn resolve_public_address(&self, node_id: &str) -> Option<Address> {
        self.listening.lock().get(node_id).cloned()
    }

    fn proxy(&self) -> Option<ProxyHandle> {
        None
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.lifecycle.begin_shutdown() {
                self.upgraders.lock().take();
                self.listening.lock().clear();
                info!("[{}] shut down", "clearnet".green());
            }
            Ok(())
        })
    }
}

struct ClearnetAcceptor {
    listener: TcpListener,
    upgrader: Arc<dyn Upgrader>,
    socket_timeout: Duration,
}

impl Acceptor for ClearnetAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, Result<(ConnectionStream, String)>> {
        Box::pin(async move {
            let (tcp, peer) = self.listener.accept().await?;
            tcp.set_nodelay(true)?;
            let stream = timeout(self.socket_timeout, self.upgrader.upgrade(tcp)).await??;
            Ok((stream, peer.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn transport(use_tls: bool) -> ClearnetTransport {
        let config = Config {
            base_dir: std::env::temp_dir().join(format!("tradenet-clear-{}", Id::generate())),
            socket_timeout: Duration::from_secs(5),
        };
        let settings = ClearnetSettings { use_tls, bind_host: "127.0.0.1".to_owned(), ..Default::default() };
        ClearnetTransport::new(config, settings, IoPool::new(1).unwrap())
    }

    async fn exchange(use_tls: bool) {
        let t = transport(use_tls);
        t.initialize().await.unwrap();
        let mut result = t.listen(0, "node".to_owned()).await.unwrap();
        assert_eq!(t.resolve_public_address("node"), Some(result.address.clone()));
        let address = result.address.clone();
        let accepted = tokio::spawn(async move {
            let (mut stream, _) = result.server.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });
        let mut stream = t.connect(&address).await.unwrap();
        assert_eq!(stream.is_tls(), use_tls);
        stream.write_all(b"ping").await.unwrap();
        stream.flush().await.unwrap();
        assert_eq!(&accepted.await.unwrap(), b"ping");
        t.shutdown().await.unwrap();
    }

    #[actix_rt::test]
    async fn plain_tcp_round_trip() {
        exchange(false).await;
    }

    #[actix_rt::test]
    async fn tls_round_trip() {
        exchange(true).await;
    }

    #[actix_rt::test]
    async fn lifecycle_is_enforced() {
        let t = transport(false);
        t.shutdown().await.unwrap();
        assert!(matches!(t.initialize().await, Err(Error::Shutdown)));

        let t = transport(false);
        assert!(matches!(t.listen(0, "n".to_owned()).await, Err(Error::NotInitialized)));
        t.initialize().await.unwrap();
        assert!(matches!(t.initialize().await, Err(Error::AlreadyInitialized)));
    }

    #[actix_rt::test]
    async fn rejects_foreign_addresses() {
        let t = transport(false);
        t.initialize().await.unwrap();
        let onion = Address::new("abc.onion", 9999, TransportKind::Tor);
        assert!(matches!(t.connect(&onion).await, Err(Error::UnsupportedAddress(_))));
    }

    #[actix_rt::test]
    async fn unreachable_port_is_not_reachable() {
        let t = transport(false);
        t.initialize().await.unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!t.is_reachable(&Address::new("127.0.0.1", port, TransportKind::Clear)).await);
    }
}
