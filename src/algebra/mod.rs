//! Algebraic core: the group abstraction, its BLS12-381 instantiation, the
//! transcript hash, the circuit-friendly hop hash and byte encodings.

pub mod bls12;
pub mod constants;
pub mod encoding;
pub mod group;
pub mod hashing;
pub mod mimc;

use ark_ff::PrimeField;
use rand::Rng;

use crate::error::{ProtocolError, Result};

pub use bls12::Bls12;
pub use group::{public_input_len, GroupElement, ProtocolGroup};
pub use hashing::HashTranscript;

pub type Scalar<G> = <G as ProtocolGroup>::Scalar;
pub type G1<G> = <G as ProtocolGroup>::G1;
pub type G2<G> = <G as ProtocolGroup>::G2;
pub type Gt<G> = <G as ProtocolGroup>::Gt;

/// Uniform non-zero scalar.
pub fn random_nonzero_scalar<F: PrimeField, R: Rng + ?Sized>(rng: &mut R) -> F {
    loop {
        let candidate = F::rand(rng);
        if !candidate.is_zero() {
            return candidate;
        }
    }
}

/// Reject the zero exponent for any secret that must be invertible or hiding.
pub fn ensure_nonzero<F: PrimeField>(value: &F, what: &str) -> Result<()> {
    if value.is_zero() {
        return Err(ProtocolError::invalid_secret(format!("{what} must be non-zero")));
    }
    Ok(())
}

/// Hop key for a hop exponent: `hop_hash(e([a]G1, H0))`.
pub fn hop_key<G: ProtocolGroup>(a: &G::Scalar) -> G::Scalar {
    let kappa = G::pairing(&(G::g1_generator() * *a), &G::h0());
    G::hop_hash(&kappa)
}
