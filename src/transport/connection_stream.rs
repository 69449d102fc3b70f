use std::io;
use std::{net::SocketAddr, pin::Pin};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// A unified type for the streams produced by every transport.
///
/// Tor streams are TCP connections through the local SOCKS proxy and I2P streams are TCP
/// connections to the SAM bridge, so a plain TCP variant covers both. As it implements Tokio's
/// `AsyncWrite` and `AsyncRead` traits, it can be framed by [crate::channel].
#[derive(Debug)]
pub enum ConnectionStream {
    Tcp(TcpStream),
    TlsServer(Box<tokio_rustls::server::TlsStream<TcpStream>>),
    TlsClient(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ConnectionStream {
    /// The local end of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    /// The remote end of the underlying socket; for overlay transports this is the proxy or bridge.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Tcp(_))
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            Self::Tcp(s) => s,
            Self::TlsServer(s) => s.get_ref().0,
            Self::TlsClient(s) => s.get_ref().0,
        }
    }
}

impl From<TcpStream> for ConnectionStream {
    fn from(stream: TcpStream) -> Self {
        ConnectionStream::Tcp(stream)
    }
}

// Inspired by:
// https://github.com/tokio-rs/tls/blob/794659740dcc399f79058c4eba325ffd97474c7b/tokio-rustls/src/lib.rs#L245
//
impl AsyncWrite for ConnectionStream {
    #[inline]
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_write(cx, buf),
            ConnectionStream::TlsClient(x) => Pin::new(x.as_mut()).poll_write(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x.as_mut()).poll_write(cx, buf),
        }
    }

    #[inline]
    fn poll_flush(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_flush(cx),
            ConnectionStream::TlsClient(x) => Pin::new(x.as_mut()).poll_flush(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x.as_mut()).poll_flush(cx),
        }
    }

    #[inline]
    fn poll_shutdown(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_shutdown(cx),
            ConnectionStream::TlsClient(x) => Pin::new(x.as_mut()).poll_shutdown(cx),
            ConnectionStream::TlsServer(x) => Pin::new(x.as_mut()).poll_shutdown(cx),
        }
    }
}

impl AsyncRead for ConnectionStream {
    #[inline]
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            ConnectionStream::Tcp(x) => Pin::new(x).poll_read(cx, buf),
            ConnectionStream::TlsClient(x) => Pin::new(x.as_mut()).poll_read(cx, buf),
            ConnectionStream::TlsServer(x) => Pin::new(x.as_mut()).poll_read(cx, buf),
        }
    }
}
