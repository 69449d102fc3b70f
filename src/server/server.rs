use crate::colored::Colorize;
use crate::p2p::ConnectionManager;
use crate::transport::{self, Acceptor};

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Pause after a failed accept so that a broken listener does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(200);

/// Accepts inbound connections and hands them to the connection manager.
pub struct Server {
    manager: ConnectionManager,
    acceptor: Box<dyn Acceptor>,
}

impl Server {
    pub fn new(manager: ConnectionManager, acceptor: Box<dyn Acceptor>) -> Server {
        Server { manager, acceptor }
    }

    /// Runs until `shutdown` fires or the transport shuts down.
    pub async fn listen(mut self, shutdown: CancellationToken) {
        info!("[{}] accepting connections as {}", "server".blue(), self.manager.local());
        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.acceptor.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote)) => {
                    let manager = self.manager.clone();
                    tokio::spawn(async move {
                        match manager.accept_inbound(stream).await {
                            Ok(handle) => debug!("[{}] {} is {}", "server".blue(), remote, handle.peer()),
                            Err(err) => debug!("[{}] handshake with {} failed: {}", "server".blue(), remote, err),
                        }
                    });
                }
                Err(transport::Error::Shutdown) => break,
                Err(err) => {
                    error!("[{}] accept failed: {}", "server".blue(), err);
                    sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        info!("[{}] stopped accepting", "server".blue());
    }
}
