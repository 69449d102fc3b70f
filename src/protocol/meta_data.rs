use crate::codec::proto::MetaDataProto;
use crate::codec::{self, Proto};

/// Storage policy attached to every storable message.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    pub ttl_millis: u64,
    pub max_size_bytes: u64,
    pub type_tag: String,
}

impl MetaData {
    pub fn new<T: Into<String>>(ttl_millis: u64, max_size_bytes: u64, type_tag: T) -> Self {
        MetaData { ttl_millis, max_size_bytes, type_tag: type_tag.into() }
    }

    /// Whether a message received at `received_at` is past its ttl at `now`.
    pub fn is_expired(&self, received_at: u64, now: u64) -> bool {
        received_at.saturating_add(self.ttl_millis) < now
    }
}

impl Proto for MetaData {
    type Wire = MetaDataProto;

    fn to_wire(&self) -> MetaDataProto {
        MetaDataProto {
            ttl_millis: self.ttl_millis,
            max_size_bytes: self.max_size_bytes,
            type_tag: self.type_tag.clone(),
        }
    }

    fn from_wire(wire: MetaDataProto) -> codec::Result<Self> {
        if wire.type_tag.is_empty() {
            return Err(codec::Error::MissingField("MetaData.type_tag"));
        }
        Ok(MetaData::new(wire.ttl_millis, wire.max_size_bytes, wire.type_tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let meta = MetaData::new(1_000, 10, "Offer");
        assert!(!meta.is_expired(5_000, 6_000));
        assert!(meta.is_expired(5_000, 6_001));
        assert!(!MetaData::new(u64::MAX, 10, "Offer").is_expired(5, u64::MAX));
    }
}
