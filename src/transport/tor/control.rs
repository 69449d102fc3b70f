//! Client for the Tor control protocol (control-spec.txt), limited to what onion services need.

use crate::transport::{Error, Result};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub struct ControlConnection {
    stream: BufReader<TcpStream>,
}

/// A freshly created onion service.
#[derive(Debug, Clone, PartialEq)]
pub struct OnionService {
    pub service_id: String,
    /// Only present when tor generated a new key.
    pub private_key: Option<String>,
}

impl ControlConnection {
    pub async fn connect(address: SocketAddr) -> Result<ControlConnection> {
        let stream = TcpStream::connect(address).await?;
        Ok(ControlConnection { stream: BufReader::new(stream) })
    }

    /// Cookie authentication with the file tor wrote on start.
    pub async fn authenticate(&mut self, cookie_file: &Path) -> Result<()> {
        let cookie = tokio::fs::read(cookie_file).await?;
        self.command(&format!("AUTHENTICATE {}", hex::encode(cookie))).await?;
        Ok(())
    }

    /// Sends one command and returns the reply lines with their status prefix removed.
    pub async fn command(&mut self, line: &str) -> Result<Vec<String>> {
        let verb = line.split_whitespace().next().unwrap_or_default();
        debug!("tor control > {}", verb);
        self.stream.write_all(format!("{}\r\n", line).as_bytes()).await?;
        self.stream.flush().await?;
        self.read_reply().await
    }

    /// Creates an onion service forwarding `virtual_port` to `127.0.0.1:target_port`, reusing
    /// `private_key` (`ED25519-V3:...`) when given.
    pub async fn add_onion(
        &mut self,
        private_key: Option<&str>,
        virtual_port: u16,
        target_port: u16,
    ) -> Result<OnionService> {
        let key = private_key.unwrap_or("NEW:ED25519-V3");
        let reply = self
            .command(&format!(
                "ADD_ONION {} Flags=Detach Port={},127.0.0.1:{}",
                key, virtual_port, target_port
            ))
            .await?;
        parse_add_onion(&reply)
    }

    pub async fn del_onion(&mut self, service_id: &str) -> Result<()> {
        self.command(&format!("DEL_ONION {}", service_id)).await?;
        Ok(())
    }

    pub async fn subscribe_hs_desc(&mut self) -> Result<()> {
        self.command("SETEVENTS HS_DESC").await?;
        Ok(())
    }

    /// Waits until a descriptor for `service_id` has been uploaded to at least one directory.
    pub async fn wait_for_upload(&mut self, service_id: &str, within: Duration) -> Result<()> {
        let wait = async {
            loop {
                let line = self.read_line().await?;
                if is_descriptor_uploaded(&line, service_id) {
                    return Ok::<(), Error>(());
                }
            }
        };
        tokio::time::timeout(within, wait).await?
    }

    pub async fn signal_shutdown(&mut self) -> Result<()> {
        self.command("SIGNAL SHUTDOWN").await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(Error::Control("control connection closed".to_owned()));
        }
        Ok(line.trim_end().to_owned())
    }

    async fn read_reply(&mut self) -> Result<Vec<String>> {
        let mut lines = vec![];
        loop {
            let line = self.read_line().await?;
            if line.len() < 4 || !line.as_bytes()[..4].is_ascii() {
                return Err(Error::Control(format!("short reply {:?}", line)));
            }
            let (status, rest) = line.split_at(3);
            // Asynchronous events may interleave with replies.
            if status == "650" {
                continue;
            }
            if !status.starts_with('2') {
                return Err(Error::Control(line));
            }
            let separator = rest.as_bytes()[0];
            lines.push(rest[1..].to_owned());
            match separator {
                b' ' => return Ok(lines),
                b'+' => {
                    // Data reply, terminated by a single dot.
                    loop {
                        let data = self.read_line().await?;
                        if data == "." {
                            break;
                        }
                        lines.push(data);
                    }
                }
                _ => {}
            }
        }
    }
}

pub fn parse_add_onion(reply: &[String]) -> Result<OnionService> {
    let mut service_id = None;
    let mut private_key = None;
    for line in reply {
        if let Some(id) = line.strip_prefix("ServiceID=") {
            service_id = Some(id.to_owned());
        } else if let Some(key) = line.strip_prefix("PrivateKey=") {
            private_key = Some(key.to_owned());
        }
    }
    match service_id {
        Some(service_id) => Ok(OnionService { service_id, private_key }),
        None => Err(Error::Control(format!("ADD_ONION reply without ServiceID: {:?}", reply))),
    }
}

/// `650 HS_DESC UPLOADED <service id> <auth> <hs dir> ...`
pub fn is_descriptor_uploaded(line: &str, service_id: &str) -> bool {
    let mut fields = line.split_whitespace();
    fields.next() == Some("650")
        && fields.next() == Some("HS_DESC")
        && fields.next() == Some("UPLOADED")
        && fields.next() == Some(service_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn add_onion_reply_is_parsed() {
        let reply = vec![
            "ServiceID=abcdefgh".to_owned(),
            "PrivateKey=ED25519-V3:c2VjcmV0".to_owned(),
            "OK".to_owned(),
        ];
        let service = parse_add_onion(&reply).unwrap();
        assert_eq!(service.service_id, "abcdefgh");
        assert_eq!(service.private_key.as_deref(), Some("ED25519-V3:c2VjcmV0"));
        assert!(parse_add_onion(&["OK".to_owned()]).is_err());
    }

    #[test]
    fn upload_event_must_name_the_service() {
        assert!(is_descriptor_uploaded("650 HS_DESC UPLOADED abc UNKNOWN $AAAA", "abc"));
        assert!(!is_descriptor_uploaded("650 HS_DESC UPLOAD abc UNKNOWN $AAAA", "abc"));
        assert!(!is_descriptor_uploaded("650 HS_DESC UPLOADED xyz UNKNOWN $AAAA", "abc"));
    }

    #[actix_rt::test]
    async fn replies_and_errors_over_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = s.read(&mut buf).await.unwrap();
            s.write_all(b"650 HS_DESC REQUESTED x\r\n250-ServiceID=svc\r\n250 OK\r\n").await.unwrap();
            let _ = s.read(&mut buf).await.unwrap();
            s.write_all(b"552 Unrecognized command\r\n").await.unwrap();
        });
        let mut control = ControlConnection::connect(addr).await.unwrap();
        let service = control.add_onion(None, 9999, 40000).await.unwrap();
        assert_eq!(service.service_id, "svc");
        assert!(matches!(control.command("BOGUS").await, Err(Error::Control(_))));
    }
}
