use super::config::{client_tls_config, server_tls_config, PEER_SERVER_NAME};

use crate::transport::ConnectionStream;

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tokio_rustls::{rustls, TlsAcceptor, TlsConnector};

use std::sync::Arc;

/// Turns a freshly connected or accepted TCP socket into a [ConnectionStream].
pub trait Upgrader: Sync + Send {
    // === async fn upgrade(..) -> io::Result<ConnectionStream>;
    fn upgrade(&self, conn: TcpStream) -> BoxFuture<'static, std::io::Result<ConnectionStream>>;

    fn is_tls(&self) -> bool;
}

pub struct TcpUpgrader;

pub struct TlsClientUpgrader {
    connector: TlsConnector,
}

pub struct TlsServerUpgrader {
    acceptor: TlsAcceptor,
}

impl Upgrader for TcpUpgrader {
    fn upgrade(&self, conn: TcpStream) -> BoxFuture<'static, std::io::Result<ConnectionStream>> {
        Box::pin(async { Ok(ConnectionStream::Tcp(conn)) })
    }

    fn is_tls(&self) -> bool {
        false
    }
}

impl TlsClientUpgrader {
    pub fn new(cert: &[u8], key: &[u8]) -> Result<TlsClientUpgrader, rustls::Error> {
        let config = client_tls_config(cert, key)?;
        Ok(TlsClientUpgrader { connector: TlsConnector::from(Arc::new(config)) })
    }
}

impl Upgrader for TlsClientUpgrader {
    fn upgrade(&self, c: TcpStream) -> BoxFuture<'static, std::io::Result<ConnectionStream>> {
        let connector = self.connector.clone();
        Box::pin(async move {
            let tls_stream = connector.connect(PEER_SERVER_NAME.clone(), c).await?;
            Ok(ConnectionStream::TlsClient(Box::new(tls_stream)))
        })
    }

    fn is_tls(&self) -> bool {
        true
    }
}

impl TlsServerUpgrader {
    pub fn new(cert: &[u8], key: &[u8]) -> Result<TlsServerUpgrader, rustls::Error> {
        let config = server_tls_config(cert, key)?;
        Ok(TlsServerUpgrader { acceptor: TlsAcceptor::from(Arc::new(config)) })
    }
}

impl Upgrader for TlsServerUpgrader {
    fn upgrade(&self, c: TcpStream) -> BoxFuture<'static, std::io::Result<ConnectionStream>> {
        let acceptor = self.acceptor.clone();
        Box::pin(async move {
            let tls_stream = acceptor.accept(c).await?;
            Ok(ConnectionStream::TlsServer(Box::new(tls_stream)))
        })
    }

    fn is_tls(&self) -> bool {
        true
    }
}

#[derive(Clone)]
pub struct Upgraders {
    pub client: Arc<dyn Upgrader>,
    pub server: Arc<dyn Upgrader>,
}

pub fn tls_upgraders(certificate: &[u8], private_key: &[u8]) -> Result<Upgraders, rustls::Error> {
    Ok(Upgraders {
        client: Arc::new(TlsClientUpgrader::new(certificate, private_key)?),
        server: Arc::new(TlsServerUpgrader::new(certificate, private_key)?),
    })
}

pub fn tcp_upgraders() -> Upgraders {
    Upgraders { client: Arc::new(TcpUpgrader), server: Arc::new(TcpUpgrader) }
}
