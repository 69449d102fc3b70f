//! Hash-based ids used for content addressing, offers and trades
//!
//! See the documentation of [Id] for details.

use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use rand::{self, Rng};

/// Generic hash-based ID for use throughout the system
///
/// The `Id` wraps a 32-byte blake2b hash. It identifies stored messages (the hash of their
/// payload), offers and trades (the hash of the offer id and the taker key).
///
/// They are displayed using the Base58check format.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id([u8; 32]);

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for Id {
    type Err = crate::Error;

    /// Converts a base58check encoded string to bytes of an Id
    fn from_str(id_str: &str) -> Result<Self, crate::Error> {
        let (vsn, bytes) =
            id_str.from_base58check().map_err(|_| crate::Error::TryFromStringError)?;
        if vsn != 0 {
            return Err(crate::Error::TryFromStringError);
        }
        Id::from_slice(&bytes).ok_or(crate::Error::TryFromStringError)
    }
}

impl Id {
    /// By default a new id is created by hashing an input byte slice
    pub fn new(bytes: &[u8]) -> Id {
        Id(hash(bytes))
    }

    /// Hashes the concatenation of several byte slices.
    pub fn from_parts(parts: &[&[u8]]) -> Id {
        let mut hasher = blake2b();
        for part in parts {
            hasher.update(part);
        }
        Id(finalize(hasher))
    }

    /// Wraps an existing 32-byte hash, `None` if the slice has the wrong length.
    pub fn from_slice(bytes: &[u8]) -> Option<Id> {
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Id(bytes))
    }

    /// Generate a random `Id`
    pub fn generate() -> Id {
        let mut rng = rand::thread_rng();
        let v: [u8; 32] = rng.gen();
        Id(v)
    }

    /// All-zeroes `Id` (for testing)
    pub fn zero() -> Id {
        Id([0u8; 32])
    }

    /// Returns the wrapped byte array containing the hash
    pub fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Returns a slice to the contained byte array
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn blake2b() -> Blake2bVar {
    // 32 is a valid blake2b output size, construction cannot fail
    match Blake2bVar::new(32) {
        Ok(hasher) => hasher,
        Err(_) => unreachable!("blake2b supports 32 byte digests"),
    }
}

fn finalize(hasher: Blake2bVar) -> [u8; 32] {
    let mut buf = [0u8; 32];
    // the buffer length matches the configured output size
    let _ = hasher.finalize_variable(&mut buf);
    buf
}

pub fn hash(input: &[u8]) -> [u8; 32] {
    let mut hasher = blake2b();
    hasher.update(input);
    finalize(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trip() {
        let id = Id::new(b"offer");
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn from_parts_matches_concatenation() {
        let joined = Id::new(b"helloworld");
        let parts = Id::from_parts(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Id::from_slice(&[1u8; 31]).is_none());
        assert_eq!(Id::from_slice(&[0u8; 32]), Some(Id::zero()));
    }

    #[test]
    fn garbage_string_is_rejected() {
        assert!("not-an-id".parse::<Id>().is_err());
    }
}
