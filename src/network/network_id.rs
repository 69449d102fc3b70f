use super::address::{Address, TransportKind};

use crate::codec::proto::NetworkIdProto;
use crate::codec::{self, Proto};
use crate::id::Id;

use ed25519_dalek::{PublicKey, Signature, PUBLIC_KEY_LENGTH};

use std::convert::{TryFrom, TryInto};
use std::fmt;

/// An ed25519 public key in its compressed 32 byte form.
///
/// Kept as raw bytes so that it can be hashed, ordered and used as a map key; it is only
/// decompressed when a signature has to be checked.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PubKey([u8; PUBLIC_KEY_LENGTH]);

impl PubKey {
    pub fn from_bytes(bytes: &[u8]) -> Option<PubKey> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().ok()?;
        Some(PubKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The hash of the key, used as a compact peer id in logs and file names.
    pub fn id(&self) -> Id {
        Id::new(&self.0)
    }

    pub fn to_public_key(&self) -> Result<PublicKey, ed25519_dalek::SignatureError> {
        PublicKey::from_bytes(&self.0)
    }

    /// Checks `signature` over `message`; any malformed key or signature counts as invalid.
    /// Malleated signatures and weak keys are refused, so one message has one valid signature.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let key = match self.to_public_key() {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match Signature::try_from(signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        };
        key.verify_strict(message, &signature).is_ok()
    }
}

impl From<&PublicKey> for PubKey {
    fn from(key: &PublicKey) -> Self {
        PubKey(key.to_bytes())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A peer's addressable identity: its public key bound to an address on one transport.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NetworkId {
    pub_key: PubKey,
    address: Address,
}

impl NetworkId {
    pub fn new(pub_key: PubKey, address: Address) -> Self {
        NetworkId { pub_key, address }
    }

    pub fn pub_key(&self) -> &PubKey {
        &self.pub_key
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.address.kind()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}@{}/{}", self.pub_key, self.address, self.address.kind())
    }
}

impl Proto for NetworkId {
    type Wire = NetworkIdProto;

    fn to_wire(&self) -> NetworkIdProto {
        NetworkIdProto { pub_key: self.pub_key.as_bytes().to_vec(), address: Some(self.address.to_wire()) }
    }

    fn from_wire(wire: NetworkIdProto) -> codec::Result<Self> {
        let pub_key = PubKey::from_bytes(&wire.pub_key)
            .ok_or_else(|| codec::Error::Malformed("public key must be 32 bytes".to_owned()))?;
        let address = wire.address.ok_or(codec::Error::MissingField("NetworkId.address"))?;
        Ok(NetworkId { pub_key, address: Address::from_wire(address)? })
    }
}
