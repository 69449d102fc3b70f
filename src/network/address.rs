use crate::codec::proto::{AddressProto, TransportKindProto};
use crate::codec::{self, Proto};

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

/// The network a peer is reachable on.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Onion routed, the host is a `.onion` name.
    Tor,
    /// Garlic routed through a SAM bridge, the host is a base64 destination.
    I2p,
    /// Plain TCP (optionally TLS), the host is an ip or dns name.
    Clear,
}

impl TransportKind {
    /// The port used when no explicit server address could be resolved.
    pub fn default_port(&self) -> u16 {
        match self {
            TransportKind::Tor => 9999,
            TransportKind::I2p => 5000,
            TransportKind::Clear => 8000,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportKind::Tor => write!(f, "tor"),
            TransportKind::I2p => write!(f, "i2p"),
            TransportKind::Clear => write!(f, "clear"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tor" => Ok(TransportKind::Tor),
            "i2p" => Ok(TransportKind::I2p),
            "clear" | "clearnet" => Ok(TransportKind::Clear),
            _ => Err(crate::Error::TryFromStringError),
        }
    }
}

/// A reachable endpoint: host and port on a specific transport.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Address {
    host: String,
    port: u16,
    kind: TransportKind,
}

impl Address {
    pub fn new<H: Into<String>>(host: H, port: u16, kind: TransportKind) -> Self {
        Address { host: host.into(), port, kind }
    }

    /// Parses `host:port`. The port is split off at the last colon so that bracket-free hosts
    /// containing colons are rejected rather than misread.
    pub fn parse(s: &str, kind: TransportKind) -> Option<Address> {
        let (host, port) = s.rsplit_once(':')?;
        if host.is_empty() || host.contains(':') {
            return None;
        }
        let port = port.parse().ok()?;
        Some(Address::new(host, port, kind))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Whether the host is something the given transport could possibly dial.
    pub fn is_plausible(&self) -> bool {
        match self.kind {
            TransportKind::Tor => {
                self.host.ends_with(".onion")
                    && self.host.len() > ".onion".len()
                    && self.host.trim_end_matches(".onion").chars().all(|c| c.is_ascii_alphanumeric())
            }
            TransportKind::I2p => !self.host.is_empty() && !self.host.contains(char::is_whitespace),
            TransportKind::Clear => !self.host.is_empty(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Proto for TransportKind {
    type Wire = TransportKindProto;

    fn to_wire(&self) -> TransportKindProto {
        match self {
            TransportKind::Tor => TransportKindProto::Tor,
            TransportKind::I2p => TransportKindProto::I2p,
            TransportKind::Clear => TransportKindProto::Clear,
        }
    }

    fn from_wire(wire: TransportKindProto) -> codec::Result<Self> {
        match wire {
            TransportKindProto::Tor => Ok(TransportKind::Tor),
            TransportKindProto::I2p => Ok(TransportKind::I2p),
            TransportKindProto::Clear => Ok(TransportKind::Clear),
            TransportKindProto::Unspecified => Err(codec::Error::UnresolvableMessage("TransportKind")),
        }
    }
}

impl Proto for Address {
    type Wire = AddressProto;

    fn to_wire(&self) -> AddressProto {
        AddressProto { host: self.host.clone(), port: u32::from(self.port), kind: self.kind.to_wire() }
    }

    fn from_wire(wire: AddressProto) -> codec::Result<Self> {
        if wire.host.is_empty() {
            return Err(codec::Error::MissingField("Address.host"));
        }
        let port = u16::try_from(wire.port)
            .map_err(|_| codec::Error::Malformed(format!("port {} out of range", wire.port)))?;
        Ok(Address { host: wire.host, port, kind: TransportKind::from_wire(wire.kind)? })
    }
}
