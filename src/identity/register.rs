use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algebra::group::{GroupElement, ProtocolGroup};
use crate::error::{ProtocolError, Result};
use crate::identity::SecretKey;
use crate::proofs::schnorr::SchnorrProof;

/// An actor's public identity: a generator and `public_value = [sk] * generator`.
///
/// The generator is carried explicitly rather than assumed to be the
/// canonical base point; every proof over a register binds to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Register<G: ProtocolGroup> {
    #[serde(with = "crate::crypto_serde::point")]
    pub generator: G::G1,
    #[serde(with = "crate::crypto_serde::point")]
    pub public_value: G::G1,
}

impl<G: ProtocolGroup> Register<G> {
    /// Public-only register, e.g. decoded from a datum.
    pub fn new(generator: G::G1, public_value: G::G1) -> Result<Self> {
        if generator.is_identity() {
            return Err(ProtocolError::bad_encoding("register generator is the identity"));
        }
        Ok(Self {
            generator,
            public_value,
        })
    }

    pub fn from_secret(sk: &SecretKey<G::Scalar>, generator: G::G1) -> Result<Self> {
        Self::new(generator, generator * *sk.expose())
    }

    /// Register over the canonical G1 base point.
    pub fn canonical(sk: &SecretKey<G::Scalar>) -> Result<Self> {
        Self::from_secret(sk, G::g1_generator())
    }

    pub fn verify(&self, proof: &SchnorrProof<G>) -> bool {
        proof.verify(self)
    }
}

/// Build a register for `sk` over `generator` together with a Schnorr proof
/// of knowledge of `sk`.
pub fn build_register<G: ProtocolGroup, R: Rng + ?Sized>(
    sk: &SecretKey<G::Scalar>,
    generator: G::G1,
    rng: &mut R,
) -> Result<(Register<G>, SchnorrProof<G>)> {
    let register = Register::from_secret(sk, generator)?;
    let proof = SchnorrProof::prove(sk.expose(), &register, rng)?;
    Ok((register, proof))
}
