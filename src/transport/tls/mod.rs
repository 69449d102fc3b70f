//! Optional TLS for clearnet connections.
//!
//! Nodes use self-signed certificates that are persisted under the base directory. Peer identity
//! is proven by the signed handshake in [crate::p2p], so TLS here only provides confidentiality:
//! both sides present a certificate but no chain or name is checked.

pub mod certificate;
pub mod config;
pub mod upgrader;
