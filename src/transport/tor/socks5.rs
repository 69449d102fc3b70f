//! Minimal SOCKS5 client (RFC 1928), no authentication, domain name addressing.

use crate::transport::{Error, Result};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use std::net::SocketAddr;

const VERSION: u8 = 0x05;
const NO_AUTH: u8 = 0x00;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Opens a stream to `host:port` through the proxy at `proxy`.
pub async fn connect(proxy: SocketAddr, host: &str, port: u16) -> Result<TcpStream> {
    if host.is_empty() || host.len() > 255 {
        return Err(Error::Socks(format!("invalid host length {}", host.len())));
    }
    let mut stream = TcpStream::connect(proxy).await?;

    stream.write_all(&[VERSION, 1, NO_AUTH]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice != [VERSION, NO_AUTH] {
        return Err(Error::Socks(format!("proxy refused no-auth method: {:?}", choice)));
    }

    let mut request = Vec::with_capacity(7 + host.len());
    request.extend_from_slice(&[VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN, host.len() as u8]);
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(Error::Socks(format!("unexpected version {}", head[0])));
    }
    if head[1] != 0x00 {
        return Err(Error::Socks(reply_message(head[1]).to_owned()));
    }
    // Skip the bound address, it is meaningless for onion targets.
    let skip = match head[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => return Err(Error::Socks(format!("unknown address type {}", other))),
    };
    let mut bound = vec![0u8; skip + 2];
    stream.read_exact(&mut bound).await?;
    Ok(stream)
}

fn reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "ttl expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts one client and answers the CONNECT with `reply`.
    async fn fake_proxy(reply: u8) -> (SocketAddr, tokio::task::JoinHandle<(String, u16)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut greeting = [0u8; 3];
            s.read_exact(&mut greeting).await.unwrap();
            s.write_all(&[VERSION, NO_AUTH]).await.unwrap();
            let mut head = [0u8; 5];
            s.read_exact(&mut head).await.unwrap();
            let mut host = vec![0u8; head[4] as usize];
            s.read_exact(&mut host).await.unwrap();
            let mut port = [0u8; 2];
            s.read_exact(&mut port).await.unwrap();
            s.write_all(&[VERSION, reply, 0, ATYP_IPV4, 0, 0, 0, 0, 0, 0]).await.unwrap();
            if reply == 0 {
                s.write_all(b"hi").await.unwrap();
            }
            (String::from_utf8(host).unwrap(), u16::from_be_bytes(port))
        });
        (addr, handle)
    }

    #[actix_rt::test]
    async fn connect_through_proxy() {
        let (proxy, handle) = fake_proxy(0).await;
        let mut stream = connect(proxy, "abcdef.onion", 9999).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert_eq!(handle.await.unwrap(), ("abcdef.onion".to_owned(), 9999));
    }

    #[actix_rt::test]
    async fn refused_connect_is_reported() {
        let (proxy, _handle) = fake_proxy(0x05).await;
        match connect(proxy, "abcdef.onion", 9999).await {
            Err(Error::Socks(message)) => assert_eq!(message, "connection refused"),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
