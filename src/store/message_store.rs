use super::{Error, Result, StoredMessage};

use crate::colored::Colorize;
use crate::id::Id;

use sled::IVec;
use tracing::{debug, info, warn};
use zerocopy::{AsBytes, FromBytes, Unaligned};

use std::ops::Bound;
use std::path::Path;

const MESSAGES_TREE: &str = "messages";

/// Number of entries examined by the garbage collector between yields.
const GC_BATCH: usize = 64;

#[derive(Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Key {
    hash: [u8; 32],
}

impl Key {
    pub fn new(id: &Id) -> Key {
        Key { hash: id.bytes() }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PutOutcome {
    /// The message was not known and is now stored.
    Accepted,
    /// A message with the same content hash is already stored; nothing changed.
    Duplicate,
}

/// Persistent store of broadcast and trade messages.
///
/// Every write is a compare-and-swap on a single key, so concurrent `put`s of the same
/// content store it once and a collection never removes an entry that was replaced
/// after it was read.
#[derive(Clone)]
pub struct MessageStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl MessageStore {
    pub fn open(path: &Path) -> Result<MessageStore> {
        let db = sled::open(path)?;
        MessageStore::from_db(db)
    }

    /// An in-memory store that is discarded on drop.
    pub fn temporary() -> Result<MessageStore> {
        let db = sled::Config::new().temporary(true).open()?;
        MessageStore::from_db(db)
    }

    pub fn from_db(db: sled::Db) -> Result<MessageStore> {
        let tree = db.open_tree(MESSAGES_TREE)?;
        Ok(MessageStore { db, tree })
    }

    pub fn put(&self, message: StoredMessage) -> Result<PutOutcome> {
        let size = message.size();
        if size > message.meta_data.max_size_bytes {
            return Err(Error::OversizedMessage { size, max: message.meta_data.max_size_bytes });
        }
        if Id::new(&message.payload) != message.content_hash {
            return Err(Error::HashMismatch);
        }
        let key = Key::new(&message.content_hash);
        let encoded = bincode::serialize(&message)?;
        match self.tree.compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(encoded))? {
            Ok(()) => {
                debug!("[{}] stored {} {}", "store".blue(), message.meta_data.type_tag, message.content_hash);
                Ok(PutOutcome::Accepted)
            }
            Err(_) => Ok(PutOutcome::Duplicate),
        }
    }

    pub fn get(&self, content_hash: &Id) -> Result<Option<StoredMessage>> {
        let key = Key::new(content_hash);
        match self.tree.get(key.as_bytes())? {
            Some(v) => Ok(Some(bincode::deserialize(&v)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, content_hash: &Id) -> Result<bool> {
        let key = Key::new(content_hash);
        Ok(self.tree.contains_key(key.as_bytes())?)
    }

    pub fn remove(&self, content_hash: &Id) -> Result<Option<StoredMessage>> {
        let key = Key::new(content_hash);
        match self.tree.remove(key.as_bytes())? {
            Some(v) => Ok(Some(bincode::deserialize(&v)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// All stored messages carrying `type_tag`, in key order. Unreadable entries are logged and
    /// skipped; the garbage collector removes them.
    pub fn messages_with_tag(&self, type_tag: &str) -> Result<Vec<StoredMessage>> {
        let mut messages = vec![];
        for entry in self.tree.iter() {
            let (k, v) = entry?;
            match bincode::deserialize::<StoredMessage>(&v) {
                Ok(message) if message.meta_data.type_tag == type_tag => messages.push(message),
                Ok(_) => {}
                Err(err) => warn!("[{}] skipping unreadable entry {}: {}", "store".blue(), hex::encode(&k), err),
            }
        }
        Ok(messages)
    }

    /// Removes every message with `received_at + ttl < now` and returns how many were removed.
    ///
    /// Works through the tree in batches and yields to the scheduler between them.
    pub async fn garbage_collect(&self, now: u64) -> Result<usize> {
        let mut removed = 0;
        let mut after: Option<IVec> = None;
        loop {
            let batch = self.next_batch(after.take())?;
            if batch.is_empty() {
                break;
            }
            for (k, v) in batch.iter() {
                let expired = match bincode::deserialize::<StoredMessage>(v) {
                    Ok(message) => message.is_expired(now),
                    Err(_) => true,
                };
                if expired {
                    // A failed swap means the entry changed since it was read; leave it alone.
                    if let Ok(()) = self.tree.compare_and_swap(k, Some(v), None as Option<&[u8]>)? {
                        removed += 1;
                    }
                }
            }
            after = batch.last().map(|(k, _)| k.clone());
            tokio::task::yield_now().await;
        }
        if removed > 0 {
            info!("[{}] collected {} expired messages", "store".blue(), removed);
        }
        Ok(removed)
    }

    pub async fn flush(&self) -> Result<()> {
        let _ = self.db.flush_async().await?;
        Ok(())
    }

    fn next_batch(&self, after: Option<IVec>) -> Result<Vec<(IVec, IVec)>> {
        let start = match after {
            Some(k) => Bound::Excluded(k),
            None => Bound::Unbounded,
        };
        let range = self.tree.range::<IVec, _>((start, Bound::Unbounded));
        let mut batch = Vec::with_capacity(GC_BATCH);
        for entry in range.take(GC_BATCH) {
            batch.push(entry?);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MetaData;

    fn message(payload: &[u8], ttl_millis: u64, received_at: u64) -> StoredMessage {
        StoredMessage::new(payload.to_vec(), MetaData::new(ttl_millis, 1_000, "Offer"), received_at)
    }

    #[test]
    fn put_then_get() {
        let store = MessageStore::temporary().unwrap();
        let m = message(b"offer-1", 1_000, 0);
        assert_eq!(store.put(m.clone()).unwrap(), PutOutcome::Accepted);
        assert_eq!(store.get(&m.content_hash).unwrap(), Some(m.clone()));
        assert_eq!(store.put(m).unwrap(), PutOutcome::Duplicate);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_keeps_first_received_at() {
        let store = MessageStore::temporary().unwrap();
        let first = message(b"offer-1", 1_000, 10);
        let second = message(b"offer-1", 1_000, 20);
        store.put(first.clone()).unwrap();
        assert_eq!(store.put(second).unwrap(), PutOutcome::Duplicate);
        assert_eq!(store.get(&first.content_hash).unwrap().unwrap().received_at, 10);
    }

    #[test]
    fn oversized_is_rejected() {
        let store = MessageStore::temporary().unwrap();
        let m = StoredMessage::new(vec![0u8; 11], MetaData::new(1_000, 10, "Offer"), 0);
        assert_eq!(store.put(m.clone()), Err(Error::OversizedMessage { size: 11, max: 10 }));
        assert_eq!(store.get(&m.content_hash).unwrap(), None);
        let exact = StoredMessage::new(vec![0u8; 10], MetaData::new(1_000, 10, "Offer"), 0);
        assert_eq!(store.put(exact).unwrap(), PutOutcome::Accepted);
    }

    #[test]
    fn forged_hash_is_rejected() {
        let store = MessageStore::temporary().unwrap();
        let mut m = message(b"offer-1", 1_000, 0);
        m.content_hash = Id::new(b"something else");
        assert_eq!(store.put(m), Err(Error::HashMismatch));
    }

    #[test]
    fn messages_by_tag() {
        let store = MessageStore::temporary().unwrap();
        store.put(message(b"a", 1_000, 0)).unwrap();
        let trade = StoredMessage::new(b"b".to_vec(), MetaData::new(1_000, 1_000, "TakeOfferRequest"), 0);
        store.put(trade.clone()).unwrap();
        assert_eq!(store.messages_with_tag("TakeOfferRequest").unwrap(), vec![trade]);
    }

    #[actix_rt::test]
    async fn unreadable_entries_are_skipped_then_collected() {
        let store = MessageStore::temporary().unwrap();
        let trade = StoredMessage::new(b"b".to_vec(), MetaData::new(1_000, 1_000, "TakeOfferRequest"), 0);
        store.put(trade.clone()).unwrap();
        store.tree.insert(Key::new(&Id::new(b"junk")).as_bytes(), b"not a message".to_vec()).unwrap();

        assert_eq!(store.messages_with_tag("TakeOfferRequest").unwrap(), vec![trade.clone()]);
        assert_eq!(store.garbage_collect(0).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&trade.content_hash).unwrap(), Some(trade));
    }

    #[actix_rt::test]
    async fn garbage_collect_removes_only_expired() {
        let store = MessageStore::temporary().unwrap();
        let old = message(b"old", 1_000, 0);
        let fresh = message(b"fresh", 1_000, 5_000);
        store.put(old.clone()).unwrap();
        store.put(fresh.clone()).unwrap();

        assert_eq!(store.garbage_collect(1_000).await.unwrap(), 0);
        assert_eq!(store.garbage_collect(1_001).await.unwrap(), 1);
        assert_eq!(store.get(&old.content_hash).unwrap(), None);
        assert_eq!(store.get(&fresh.content_hash).unwrap(), Some(fresh));
    }

    #[actix_rt::test]
    async fn garbage_collect_walks_every_batch() {
        let store = MessageStore::temporary().unwrap();
        for i in 0..(GC_BATCH * 3 + 5) {
            store.put(message(format!("m{}", i).as_bytes(), 10, 0)).unwrap();
        }
        let total = store.len();
        assert_eq!(store.garbage_collect(100).await.unwrap(), total);
        assert!(store.is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("tradenet-store-{}", Id::generate()));
        let m = message(b"persisted", 1_000, 0);
        {
            let store = MessageStore::open(&path).unwrap();
            store.put(m.clone()).unwrap();
            store.db.flush().unwrap();
        }
        let store = MessageStore::open(&path).unwrap();
        assert_eq!(store.get(&m.content_hash).unwrap(), Some(m));
        let _ = std::fs::remove_dir_all(&path);
    }
}
