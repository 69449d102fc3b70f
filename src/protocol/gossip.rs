use super::MetaData;

use crate::codec::proto::{AuthenticatedDataProto, GossipPayloadProto};
use crate::codec::{self, Proto};
use crate::network::PubKey;
use crate::offer::Offer;

use ed25519_dalek::{Keypair, Signer};

/// Content that is broadcast to every peer and kept in the message store until it expires.
#[derive(Debug, Clone, PartialEq)]
pub enum GossipPayload {
    Offer(Offer),
}

impl GossipPayload {
    pub fn meta_data(&self) -> MetaData {
        match self {
            GossipPayload::Offer(_) => Offer::meta_data(),
        }
    }

    /// The key that must have signed the payload.
    pub fn owner(&self) -> &PubKey {
        match self {
            GossipPayload::Offer(offer) => offer.maker().pub_key(),
        }
    }
}

impl Proto for GossipPayload {
    type Wire = GossipPayloadProto;

    fn to_wire(&self) -> GossipPayloadProto {
        match self {
            GossipPayload::Offer(offer) => GossipPayloadProto { offer: Some(offer.to_wire()) },
        }
    }

    fn from_wire(wire: GossipPayloadProto) -> codec::Result<Self> {
        let offer = codec::one_of("GossipPayload", vec![wire.offer])?;
        Ok(GossipPayload::Offer(Offer::from_wire(offer)?))
    }
}

/// A gossip payload signed by its owner.
///
/// The encoded payload is kept next to the decoded one so that the signature is always checked
/// against the exact bytes that were signed.
#[derive(Debug, Clone, PartialEq)]
pub struct GossipMessage {
    meta_data: MetaData,
    payload: GossipPayload,
    payload_bytes: Vec<u8>,
    signature: Vec<u8>,
}

impl GossipMessage {
    pub fn sign(keypair: &Keypair, payload: GossipPayload) -> codec::Result<Self> {
        let payload_bytes = payload.to_bytes()?;
        let signature = keypair.sign(&payload_bytes).to_bytes().to_vec();
        Ok(GossipMessage { meta_data: payload.meta_data(), payload, payload_bytes, signature })
    }

    pub fn verify(&self) -> bool {
        self.payload.owner().verify(&self.payload_bytes, &self.signature)
    }

    pub fn meta_data(&self) -> &MetaData {
        &self.meta_data
    }

    pub fn payload(&self) -> &GossipPayload {
        &self.payload
    }
}

impl Proto for GossipMessage {
    type Wire = AuthenticatedDataProto;

    fn to_wire(&self) -> AuthenticatedDataProto {
        AuthenticatedDataProto {
            meta_data: Some(self.meta_data.to_wire()),
            payload: self.payload_bytes.clone(),
            signature: self.signature.clone(),
        }
    }

    fn from_wire(wire: AuthenticatedDataProto) -> codec::Result<Self> {
        let meta_data = MetaData::from_wire(codec::required("AuthenticatedData.meta_data", wire.meta_data)?)?;
        let payload = GossipPayload::from_bytes(&wire.payload)?;
        // The signature does not cover the metadata, so it must be exactly what the payload implies.
        if payload.meta_data() != meta_data {
            return Err(codec::Error::Malformed(format!(
                "metadata {:?} does not match the payload",
                meta_data
            )));
        }
        Ok(GossipMessage { meta_data, payload, payload_bytes: wire.payload, signature: wire.signature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Address, NetworkId, TransportKind};
    use crate::offer::{Direction, Market, PriceSpec};
    use crate::store::{MessageStore, PutOutcome, StoredMessage};
    use rand::rngs::OsRng;

    fn signed_offer(keypair: &Keypair) -> GossipMessage {
        let maker = NetworkId::new(
            PubKey::from(&keypair.public),
            Address::new("127.0.0.1", 8000, TransportKind::Clear),
        );
        let offer = Offer::new(maker, Direction::Buy, Market::new("BTC", "USD"), 5, PriceSpec::MarketRelative);
        GossipMessage::sign(keypair, GossipPayload::Offer(offer)).unwrap()
    }

    #[test]
    fn signed_by_owner_verifies() {
        let keypair = Keypair::generate(&mut OsRng {});
        let message = signed_offer(&keypair);
        assert!(message.verify());
        let decoded = GossipMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
        assert!(decoded.verify());
        assert_eq!(decoded.meta_data().type_tag, "Offer");
    }

    #[test]
    fn signature_by_someone_else_fails() {
        let keypair = Keypair::generate(&mut OsRng {});
        let other = Keypair::generate(&mut OsRng {});
        let message = signed_offer(&keypair);
        let mut wire = message.to_wire();
        wire.signature = other.sign(&wire.payload).to_bytes().to_vec();
        assert!(!GossipMessage::from_wire(wire).unwrap().verify());
    }

    #[test]
    fn rewritten_metadata_is_rejected() {
        let keypair = Keypair::generate(&mut OsRng {});
        let mut wire = signed_offer(&keypair).to_wire();
        if let Some(meta_data) = wire.meta_data.as_mut() {
            meta_data.ttl_millis = u64::MAX;
        }
        assert!(matches!(GossipMessage::from_wire(wire), Err(codec::Error::Malformed(_))));

        let mut wire = signed_offer(&keypair).to_wire();
        if let Some(meta_data) = wire.meta_data.as_mut() {
            meta_data.max_size_bytes += 1;
        }
        assert!(matches!(GossipMessage::from_wire(wire), Err(codec::Error::Malformed(_))));
    }

    #[test]
    fn relayed_copy_is_a_duplicate() {
        let keypair = Keypair::generate(&mut OsRng {});
        let original = signed_offer(&keypair);
        let relayed = GossipMessage::from_bytes(&original.to_bytes().unwrap()).unwrap();

        let store = MessageStore::temporary().unwrap();
        let stored = |message: &GossipMessage| {
            StoredMessage::new(message.to_bytes().unwrap(), message.meta_data().clone(), 1)
        };
        assert_eq!(store.put(stored(&original)).unwrap(), PutOutcome::Accepted);
        assert_eq!(store.put(stored(&relayed)).unwrap(), PutOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_payload_is_unresolvable() {
        let keypair = Keypair::generate(&mut OsRng {});
        let mut wire = signed_offer(&keypair).to_wire();
        wire.payload = codec::encode(&GossipPayloadProto { offer: None }).unwrap();
        assert_eq!(GossipMessage::from_wire(wire), Err(codec::Error::UnresolvableMessage("GossipPayload")));
    }
}
