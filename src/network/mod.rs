//! Addressing and identity of peers on the network.
//!
//! An [Address] says where a peer can be reached and over which transport, a
//! [NetworkId] binds that address to the peer's public key.

mod address;
mod network_id;

pub use address::{Address, TransportKind};
pub use network_id::{NetworkId, PubKey};
