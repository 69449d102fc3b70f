use crate::id::Id;
use crate::protocol::MetaData;

/// A message as it sits in the store, keyed by the hash of its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub content_hash: Id,
    pub payload: Vec<u8>,
    pub meta_data: MetaData,
    pub received_at: u64,
}

impl StoredMessage {
    pub fn new(payload: Vec<u8>, meta_data: MetaData, received_at: u64) -> Self {
        StoredMessage { content_hash: Id::new(&payload), payload, meta_data, received_at }
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.meta_data.is_expired(self.received_at, now)
    }
}
