//! Fiat-Shamir proofs over registers and encryption levels.

pub mod binding;
pub mod schnorr;

pub use binding::{BindingProof, BindingStatement};
pub use schnorr::SchnorrProof;
