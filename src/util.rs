use crate::network::{Address, NetworkId, PubKey, TransportKind};
use crate::{Error, Result};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch; zero if the clock is set before it.
pub fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Parses a peer description `PUBKEY@HOST:PORT`, the key given as 64 hex digits.
pub fn parse_peer(peer: &str, kind: TransportKind) -> Result<NetworkId> {
    let (key, address) = peer.split_once('@').ok_or(Error::PeerParseError)?;
    let key = hex::decode(key).map_err(|_| Error::PeerParseError)?;
    let pub_key = PubKey::from_bytes(&key).ok_or(Error::PeerParseError)?;
    let address = Address::parse(address, kind).ok_or(Error::PeerParseError)?;
    Ok(NetworkId::new(pub_key, address))
}
