//! The agreement two peers sign when an offer is taken.

mod contract;
mod signature;

pub use contract::Contract;
pub use signature::ContractSignatureData;
