use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algebra::constants::SCHNORR_DOMAIN_TAG;
use crate::algebra::group::ProtocolGroup;
use crate::algebra::hashing::HashTranscript;
use crate::algebra::{ensure_nonzero, random_nonzero_scalar};
use crate::error::Result;
use crate::identity::Register;

const LOG_TARGET: &str = "peace_protocol::proofs::schnorr";

/// Non-interactive proof of knowledge of the secret key behind a [`Register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SchnorrProof<G: ProtocolGroup> {
    /// Response: z = r + c·sk
    #[serde(with = "crate::crypto_serde::scalar")]
    pub z: G::Scalar,
    /// Commitment: g_r = [r]·generator
    #[serde(with = "crate::crypto_serde::point")]
    pub g_r: G::G1,
}

impl<G: ProtocolGroup> SchnorrProof<G> {
    pub fn prove<R: Rng + ?Sized>(
        sk: &G::Scalar,
        register: &Register<G>,
        rng: &mut R,
    ) -> Result<Self> {
        ensure_nonzero(sk, "secret key")?;

        let r: G::Scalar = random_nonzero_scalar(rng);
        let g_r = register.generator * r;
        let challenge = Self::challenge(register, &g_r);
        let z = r + challenge * sk;

        tracing::debug!(target: LOG_TARGET, "built schnorr proof");
        Ok(Self { z, g_r })
    }

    /// `[z]·generator == g_r + [c]·public_value`
    pub fn verify(&self, register: &Register<G>) -> bool {
        let challenge = Self::challenge(register, &self.g_r);
        let lhs = register.generator * self.z;
        let rhs = self.g_r + register.public_value * challenge;
        let ok = lhs == rhs;
        tracing::debug!(target: LOG_TARGET, ok, "verified schnorr proof");
        ok
    }

    fn challenge(register: &Register<G>, g_r: &G::G1) -> G::Scalar {
        HashTranscript::new(SCHNORR_DOMAIN_TAG)
            .append_point(&register.generator)
            .append_point(g_r)
            .append_point(&register.public_value)
            .challenge()
    }
}
