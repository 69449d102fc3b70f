//! Messages exchanged between peers.
//!
//! An [Envelope] is the unit written to a connection. Connection level cases (handshake and
//! liveness) are consumed by [crate::p2p]; everything else is a [Message] handed to the node.

mod gossip;
mod meta_data;

pub use gossip::{GossipMessage, GossipPayload};
pub use meta_data::MetaData;

use crate::codec::proto::{
    AuthenticatedDataProto, EnvelopeProto, HelloProofProto, HelloProto, PingProto, PongProto,
    TradeMessageProto,
};
use crate::codec::{self, Proto, PROTOCOL_VERSION};
use crate::network::NetworkId;
use crate::trade::TradeMessage;

use std::convert::TryInto;

pub const NONCE_LENGTH: usize = 32;

/// Capabilities advertised in the handshake.
pub const CAPABILITIES: &[u32] = &[1];

#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    pub network_id: NetworkId,
    pub capabilities: Vec<u32>,
    pub nonce: [u8; NONCE_LENGTH],
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelloProof {
    pub signature: Vec<u8>,
}

/// Application messages routed past the connection layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Trade(TradeMessage),
    Gossip(GossipMessage),
}

impl Message {
    pub fn meta_data(&self) -> &MetaData {
        match self {
            Message::Trade(message) => message.meta_data(),
            Message::Gossip(message) => message.meta_data(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Hello(Hello),
    HelloProof(HelloProof),
    Ping(u64),
    Pong(u64),
    Message(Message),
}

impl Envelope {
    pub fn message_case(&self) -> &'static str {
        match self {
            Envelope::Hello(_) => "hello",
            Envelope::HelloProof(_) => "hello_proof",
            Envelope::Ping(_) => "ping",
            Envelope::Pong(_) => "pong",
            Envelope::Message(Message::Trade(_)) => "trade_message",
            Envelope::Message(Message::Gossip(_)) => "gossip",
        }
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Envelope::Message(message)
    }
}

impl Proto for Hello {
    type Wire = HelloProto;

    fn to_wire(&self) -> HelloProto {
        HelloProto {
            network_id: Some(self.network_id.to_wire()),
            capabilities: self.capabilities.clone(),
            nonce: self.nonce.to_vec(),
        }
    }

    fn from_wire(wire: HelloProto) -> codec::Result<Self> {
        let network_id = NetworkId::from_wire(codec::required("Hello.network_id", wire.network_id)?)?;
        let nonce: [u8; NONCE_LENGTH] = wire.nonce.as_slice().try_into().map_err(|_| {
            codec::Error::Malformed(format!("nonce must be {} bytes", NONCE_LENGTH))
        })?;
        Ok(Hello { network_id, capabilities: wire.capabilities, nonce })
    }
}

// Decoded case of an envelope, before the inner message is converted.
enum EnvelopeCase {
    Hello(HelloProto),
    HelloProof(HelloProofProto),
    Ping(PingProto),
    Pong(PongProto),
    Trade(TradeMessageProto),
    Gossip(AuthenticatedDataProto),
}

impl Proto for Envelope {
    type Wire = EnvelopeProto;

    fn to_wire(&self) -> EnvelopeProto {
        let mut wire = EnvelopeProto::empty();
        match self {
            Envelope::Hello(hello) => wire.hello = Some(hello.to_wire()),
            Envelope::HelloProof(proof) => {
                wire.hello_proof = Some(HelloProofProto { signature: proof.signature.clone() })
            }
            Envelope::Ping(nonce) => wire.ping = Some(PingProto { nonce: *nonce }),
            Envelope::Pong(nonce) => wire.pong = Some(PongProto { nonce: *nonce }),
            Envelope::Message(Message::Trade(message)) => wire.trade_message = Some(message.to_wire()),
            Envelope::Message(Message::Gossip(message)) => wire.gossip = Some(message.to_wire()),
        }
        wire
    }

    fn from_wire(wire: EnvelopeProto) -> codec::Result<Self> {
        if wire.version != PROTOCOL_VERSION {
            return Err(codec::Error::UnsupportedVersion(wire.version));
        }
        let case = codec::one_of(
            "Envelope",
            vec![
                wire.hello.map(EnvelopeCase::Hello),
                wire.hello_proof.map(EnvelopeCase::HelloProof),
                wire.ping.map(EnvelopeCase::Ping),
                wire.pong.map(EnvelopeCase::Pong),
                wire.trade_message.map(EnvelopeCase::Trade),
                wire.gossip.map(EnvelopeCase::Gossip),
            ],
        )?;
        Ok(match case {
            EnvelopeCase::Hello(hello) => Envelope::Hello(Hello::from_wire(hello)?),
            EnvelopeCase::HelloProof(proof) => Envelope::HelloProof(HelloProof { signature: proof.signature }),
            EnvelopeCase::Ping(ping) => Envelope::Ping(ping.nonce),
            EnvelopeCase::Pong(pong) => Envelope::Pong(pong.nonce),
            EnvelopeCase::Trade(message) => Envelope::Message(Message::Trade(TradeMessage::from_wire(message)?)),
            EnvelopeCase::Gossip(message) => {
                Envelope::Message(Message::Gossip(GossipMessage::from_wire(message)?))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, PubKey, TransportKind};

    #[test]
    fn wrong_version_is_rejected() {
        let mut wire = Envelope::Ping(7).to_wire();
        wire.version = PROTOCOL_VERSION + 1;
        assert_eq!(Envelope::from_wire(wire), Err(codec::Error::UnsupportedVersion(PROTOCOL_VERSION + 1)));
    }

    #[test]
    fn empty_envelope_is_unresolvable() {
        assert_eq!(Envelope::from_wire(EnvelopeProto::empty()), Err(codec::Error::UnresolvableMessage("Envelope")));
    }

    #[test]
    fn two_cases_are_unresolvable() {
        let mut wire = Envelope::Ping(1).to_wire();
        wire.pong = Some(PongProto { nonce: 1 });
        assert_eq!(Envelope::from_wire(wire), Err(codec::Error::UnresolvableMessage("Envelope")));
    }

    #[test]
    fn hello_survives_the_wire() {
        let network_id = NetworkId::new(
            PubKey::from_bytes(&[3u8; 32]).unwrap(),
            Address::new("127.0.0.1", 8000, TransportKind::Clear),
        );
        let hello = Envelope::Hello(Hello { network_id, capabilities: CAPABILITIES.to_vec(), nonce: [9u8; 32] });
        let bytes = hello.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.message_case(), "hello");
        assert_eq!(decoded, hello);
    }

    #[test]
    fn short_nonce_is_malformed() {
        let network_id = NetworkId::new(
            PubKey::from_bytes(&[3u8; 32]).unwrap(),
            Address::new("127.0.0.1", 8000, TransportKind::Clear),
        );
        let mut wire = Hello { network_id, capabilities: vec![], nonce: [0u8; 32] }.to_wire();
        wire.nonce.truncate(4);
        assert!(matches!(Hello::from_wire(wire), Err(codec::Error::Malformed(_))));
    }
}
