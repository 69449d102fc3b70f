//! SAM v3 bridge client: the line protocol the I2P router exposes for streaming sessions.

use crate::transport::{Error, Result};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use std::collections::HashMap;
use std::net::SocketAddr;

const MAX_LINE: usize = 64 * 1024;

/// A parsed reply such as `SESSION STATUS RESULT=OK DESTINATION=...`.
#[derive(Debug, Clone, PartialEq)]
pub struct SamReply {
    pub topic: String,
    pub kind: String,
    pub values: HashMap<String, String>,
}

impl SamReply {
    pub fn parse(line: &str) -> Result<SamReply> {
        let mut tokens = tokenize(line).into_iter();
        let topic = tokens.next().ok_or_else(|| Error::Sam("empty reply".to_owned()))?;
        let kind = tokens.next().unwrap_or_default();
        let values = tokens
            .filter_map(|token| {
                let (k, v) = token.split_once('=')?;
                Some((k.to_owned(), v.to_owned()))
            })
            .collect();
        Ok(SamReply { topic, kind, values })
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    /// Fails unless `RESULT=OK`.
    pub fn ok(self) -> Result<SamReply> {
        match self.value("RESULT") {
            Some("OK") => Ok(self),
            result => Err(Error::Sam(format!(
                "{} {} failed: {} {}",
                self.topic,
                self.kind,
                result.unwrap_or("no result"),
                self.value("MESSAGE").unwrap_or_default()
            ))),
        }
    }
}

// Splits on spaces, keeping double-quoted values (`MESSAGE="a b"`) together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = vec![];
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            ' ' if !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// One socket to the bridge.
///
/// Lines are read a byte at a time: once a stream is connected or accepted the same socket
/// carries peer data, which must not be swallowed by a read-ahead buffer.
pub struct SamConnection {
    stream: TcpStream,
}

impl SamConnection {
    /// Connects and performs the `HELLO` version negotiation.
    pub async fn open(bridge: SocketAddr) -> Result<SamConnection> {
        let stream = TcpStream::connect(bridge).await?;
        let mut connection = SamConnection { stream };
        connection.command("HELLO VERSION MIN=3.1 MAX=3.3").await?;
        Ok(connection)
    }

    pub async fn command(&mut self, line: &str) -> Result<SamReply> {
        self.stream.write_all(format!("{}\n", line).as_bytes()).await?;
        self.stream.flush().await?;
        let reply = self.read_line().await?;
        SamReply::parse(&reply)?.ok()
    }

    /// Creates a streaming session; returns the private destination (new or reused).
    pub async fn create_session(
        &mut self,
        session_id: &str,
        private_destination: Option<&str>,
        signature_type: u8,
    ) -> Result<String> {
        let destination = private_destination.unwrap_or("TRANSIENT");
        let reply = self
            .command(&format!(
                "SESSION CREATE STYLE=STREAM ID={} DESTINATION={} SIGNATURE_TYPE={}",
                session_id, destination, signature_type
            ))
            .await?;
        reply
            .value("DESTINATION")
            .map(|d| d.to_owned())
            .ok_or_else(|| Error::Sam("session reply without destination".to_owned()))
    }

    pub async fn lookup(&mut self, name: &str) -> Result<String> {
        let reply = self.command(&format!("NAMING LOOKUP NAME={}", name)).await?;
        reply
            .value("VALUE")
            .map(|v| v.to_owned())
            .ok_or_else(|| Error::Sam(format!("lookup of {} returned no value", name)))
    }

    /// Turns this connection into a stream to `destination`.
    pub async fn stream_connect(mut self, session_id: &str, destination: &str) -> Result<TcpStream> {
        self.command(&format!("STREAM CONNECT ID={} DESTINATION={} SILENT=false", session_id, destination))
            .await?;
        Ok(self.stream)
    }

    /// Waits for the next inbound stream of the session; returns it with the peer destination.
    pub async fn stream_accept(mut self, session_id: &str) -> Result<(TcpStream, String)> {
        self.command(&format!("STREAM ACCEPT ID={} SILENT=false", session_id)).await?;
        let peer = self.read_line().await?;
        let peer = peer.split_whitespace().next().unwrap_or_default().to_owned();
        Ok((self.stream, peer))
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        loop {
            let byte = self.stream.read_u8().await?;
            if byte == b'\n' {
                break;
            }
            if line.len() >= MAX_LINE {
                return Err(Error::Sam("reply line too long".to_owned()));
            }
            line.push(byte);
        }
        String::from_utf8(line).map_err(|_| Error::Sam("reply is not utf-8".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn reply_with_quoted_message() {
        let reply =
            SamReply::parse("SESSION STATUS RESULT=I2P_ERROR MESSAGE=\"router not ready\"").unwrap();
        assert_eq!(reply.topic, "SESSION");
        assert_eq!(reply.kind, "STATUS");
        assert_eq!(reply.value("MESSAGE"), Some("router not ready"));
        match reply.ok() {
            Err(Error::Sam(message)) => assert!(message.contains("router not ready")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[actix_rt::test]
    async fn connect_leaves_peer_data_on_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let bridge = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            let _ = s.read(&mut buf).await.unwrap();
            s.write_all(b"HELLO REPLY RESULT=OK VERSION=3.3\n").await.unwrap();
            let _ = s.read(&mut buf).await.unwrap();
            // Status and the first peer bytes arrive in one segment.
            s.write_all(b"STREAM STATUS RESULT=OK\npeer-data").await.unwrap();
        });
        let connection = SamConnection::open(bridge).await.unwrap();
        let mut stream = connection.stream_connect("s1", "destination").await.unwrap();
        let mut data = [0u8; 9];
        stream.read_exact(&mut data).await.unwrap();
        assert_eq!(&data, b"peer-data");
    }
}
