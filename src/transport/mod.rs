//! Transports: the ways a node can listen for and dial peers.
//!
//! Every transport implements [Transport] and hands out [ConnectionStream]s. Which one a node
//! uses is decided by configuration through [create].

pub mod clearnet;
mod connection_stream;
pub mod i2p;
mod io_pool;
pub mod tls;
pub mod tor;

pub use connection_stream::ConnectionStream;
pub use io_pool::IoPool;

use crate::network::{Address, TransportKind};

use futures::future::BoxFuture;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    /// `initialize` was called on a transport that is already running.
    AlreadyInitialized,
    NotInitialized,
    /// The transport was shut down.
    Shutdown,
    IoPoolShutdown,
    Timeout,
    /// The overlay daemon or bridge could not be brought up.
    Bootstrap(String),
    /// Unexpected reply on the Tor control port.
    Control(String),
    Socks(String),
    /// Unexpected reply from the SAM bridge.
    Sam(String),
    /// The address belongs to another transport or cannot be dialed.
    UnsupportedAddress(Address),
    Certificate(tls::certificate::Error),
    Tls(tokio_rustls::rustls::Error),
}

impl std::error::Error for Error {}

impl std::convert::From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::IO(error)
    }
}

impl std::convert::From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl std::convert::From<tls::certificate::Error> for Error {
    fn from(error: tls::certificate::Error) -> Self {
        Error::Certificate(error)
    }
}

impl std::convert::From<tokio_rustls::rustls::Error> for Error {
    fn from(error: tokio_rustls::rustls::Error) -> Self {
        Error::Tls(error)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Accepts inbound connections on a listening transport.
pub trait Acceptor: Send {
    /// Waits for the next inbound stream. The string describes the remote end for logging.
    fn accept(&mut self) -> BoxFuture<'_, Result<(ConnectionStream, String)>>;
}

/// What [Transport::listen] produces: the listener and the address peers should dial.
pub struct ServerSocketResult {
    pub node_id: String,
    pub server: Box<dyn Acceptor>,
    pub address: Address,
}

impl std::fmt::Debug for ServerSocketResult {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "ServerSocketResult({}, {})", self.node_id, self.address)
    }
}

/// A SOCKS5 proxy exposed by a transport, for callers that want to route their own traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHandle {
    pub socks_address: SocketAddr,
}

/// A way of reaching peers.
///
/// Implementations are constructed once, initialised once and shut down once; shutting down
/// is idempotent and allowed without a prior `initialize`.
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn initialize(&self) -> BoxFuture<'_, Result<()>>;

    /// Opens a listener on `port` for the local node `node_id`.
    fn listen(&self, port: u16, node_id: String) -> BoxFuture<'_, Result<ServerSocketResult>>;

    fn connect<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<ConnectionStream>>;

    /// Whether a listener appears to be reachable at `address`.
    fn is_reachable<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, bool>;

    /// The address previously published for `node_id`, if this transport persisted one.
    fn resolve_public_address(&self, node_id: &str) -> Option<Address>;

    fn proxy(&self) -> Option<ProxyHandle>;

    fn shutdown(&self) -> BoxFuture<'_, Result<()>>;
}

/// Settings shared by every transport.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for persisted transport state.
    pub base_dir: PathBuf,
    pub socket_timeout: Duration,
}

/// Per-variant settings as they appear in the node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    #[serde(default)]
    pub tor: tor::TorSettings,
    #[serde(default)]
    pub i2p: i2p::I2pSettings,
    #[serde(default)]
    pub clear: clearnet::ClearnetSettings,
}

fn default_socket_timeout_secs() -> u64 {
    120
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            socket_timeout_secs: default_socket_timeout_secs(),
            tor: tor::TorSettings::default(),
            i2p: i2p::I2pSettings::default(),
            clear: clearnet::ClearnetSettings::default(),
        }
    }
}

/// Builds the transport selected by `kind`.
pub fn create(
    kind: TransportKind,
    base_dir: PathBuf,
    settings: &TransportSettings,
    io_pool: IoPool,
) -> Arc<dyn Transport> {
    let config = Config { base_dir, socket_timeout: Duration::from_secs(settings.socket_timeout_secs) };
    match kind {
        TransportKind::Tor => Arc::new(tor::TorTransport::new(config, settings.tor.clone(), io_pool)),
        TransportKind::I2p => Arc::new(i2p::I2pTransport::new(config, settings.i2p.clone(), io_pool)),
        TransportKind::Clear => {
            Arc::new(clearnet::ClearnetTransport::new(config, settings.clear.clone(), io_pool))
        }
    }
}

/// Guards the initialise-once, shutdown-idempotent lifecycle shared by all transports.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: parking_lot::Mutex<LifecycleState>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum LifecycleState {
    New,
    Initializing,
    Running,
    ShutDown,
}

impl Default for LifecycleState {
    fn default() -> Self {
        LifecycleState::New
    }
}

impl Lifecycle {
    /// Moves to `Initializing`; a second call is an error.
    pub fn begin_initialize(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            LifecycleState::New => {
                *state = LifecycleState::Initializing;
                Ok(())
            }
            LifecycleState::ShutDown => Err(Error::Shutdown),
            _ => Err(Error::AlreadyInitialized),
        }
    }

    /// Ends `Initializing`. Returns whether the transport is now running, which is `false`
    /// when it failed or was shut down while initializing.
    pub fn finish_initialize(&self, success: bool) -> bool {
        let mut state = self.state.lock();
        if *state == LifecycleState::Initializing {
            *state = if success { LifecycleState::Running } else { LifecycleState::ShutDown };
        }
        *state == LifecycleState::Running
    }

    pub fn ensure_running(&self) -> Result<()> {
        match *self.state.lock() {
            LifecycleState::Running => Ok(()),
            LifecycleState::ShutDown => Err(Error::Shutdown),
            _ => Err(Error::NotInitialized),
        }
    }

    /// Returns whether this call performed the shutdown.
    pub fn begin_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        let was_active = *state != LifecycleState::ShutDown;
        *state = LifecycleState::ShutDown;
        was_active
    }
}
