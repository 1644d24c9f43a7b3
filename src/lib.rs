pub mod algebra;
pub mod capsule;
pub mod chain;
pub mod config;
pub mod crypto_serde;
pub mod error;
pub mod hop;
pub mod identity;
pub mod level;
pub mod marketplace;
pub mod proofs;
pub mod snark;
pub mod store;

#[cfg(test)]
pub mod test_utils;

pub use algebra::{Bls12, GroupElement, ProtocolGroup};
pub use config::ProtocolConfig;
pub use error::{ErrorKind, ProtocolError, Result};
pub use hop::{HopCoordinator, HopState};
pub use marketplace::Marketplace;
