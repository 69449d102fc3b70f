//! Conversion between domain types and their wire representation.
//!
//! Wire types live in [proto]. Every sealed union is a struct with one `Option` field per
//! variant, mirroring a protobuf `oneof`: the message case is derived from which field is set,
//! and an unset (or ambiguous) case is a hard [Error::UnresolvableMessage]. Wire values are
//! encoded with `bincode`; framing is done by [crate::channel].

pub mod proto;

use serde::{de::DeserializeOwned, Serialize};

/// Version carried by every envelope; any other value is rejected.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The discriminant of a sealed union was unset or ambiguous.
    UnresolvableMessage(&'static str),
    /// A sub-message required by the message case is absent.
    MissingField(&'static str),
    /// Structurally invalid content (bad lengths, inconsistent ids, ...).
    Malformed(String),
    UnsupportedVersion(u32),
    Bincode(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::convert::From<Box<bincode::ErrorKind>> for Error {
    fn from(error: Box<bincode::ErrorKind>) -> Self {
        Error::Bincode(format!("{:?}", error))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bidirectional mapping between a domain type and its wire struct.
pub trait Proto: Sized {
    type Wire: Serialize + DeserializeOwned;

    fn to_wire(&self) -> Self::Wire;

    fn from_wire(wire: Self::Wire) -> Result<Self>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.to_wire())
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_wire(decode(bytes)?)
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

/// Resolves a `oneof` made of optional fields: exactly one must be set.
///
/// `name` is reported in the error when the case is unset or ambiguous.
pub fn one_of<T>(name: &'static str, cases: Vec<Option<T>>) -> Result<T> {
    let mut set = cases.into_iter().flatten();
    match (set.next(), set.next()) {
        (Some(case), None) => Ok(case),
        _ => Err(Error::UnresolvableMessage(name)),
    }
}

/// Unwraps a required sub-message.
pub fn required<T>(field: &'static str, value: Option<T>) -> Result<T> {
    value.ok_or(Error::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_of_requires_exactly_one_case() {
        assert_eq!(one_of("X", vec![None, Some(1), None]), Ok(1));
        assert_eq!(one_of::<u8>("X", vec![None, None]), Err(Error::UnresolvableMessage("X")));
        assert_eq!(one_of("X", vec![Some(1), Some(2)]), Err(Error::UnresolvableMessage("X")));
    }

    #[test]
    fn truncated_bytes_are_a_decode_error() {
        let bytes = encode(&(1u64, String::from("abc"))).unwrap();
        let res: Result<(u64, String)> = decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(res, Err(Error::Bincode(_))));
    }
}
