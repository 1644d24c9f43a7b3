use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algebra::constants::BINDING_DOMAIN_TAG;
use crate::algebra::group::ProtocolGroup;
use crate::algebra::hashing::HashTranscript;
use crate::algebra::random_nonzero_scalar;
use crate::chain::TokenId;
use crate::identity::Register;

const LOG_TARGET: &str = "peace_protocol::proofs::binding";

/// Proof that `r1 = [r]G` and `r2_g1 = [a]G + [r]V` were built from one
/// consistent pair of exponents `(a, r)` for a given register and token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BindingProof<G: ProtocolGroup> {
    #[serde(with = "crate::crypto_serde::scalar")]
    pub z_a: G::Scalar,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub z_r: G::Scalar,
    /// t1 = [ρ]G
    #[serde(with = "crate::crypto_serde::point")]
    pub t1: G::G1,
    /// t2 = [α]G + [ρ]V
    #[serde(with = "crate::crypto_serde::point")]
    pub t2: G::G1,
}

/// The public statement a binding proof is checked against.
#[derive(Clone, Copy, Debug)]
pub struct BindingStatement<'a, G: ProtocolGroup> {
    pub register: &'a Register<G>,
    pub r1: &'a G::G1,
    pub r2_g1: &'a G::G1,
    pub token: &'a TokenId,
}

impl<G: ProtocolGroup> BindingProof<G> {
    /// Secrets are assumed validated by the caller (the level builder).
    pub fn prove<R: Rng + ?Sized>(
        a: &G::Scalar,
        r: &G::Scalar,
        statement: &BindingStatement<'_, G>,
        rng: &mut R,
    ) -> Self {
        let rho: G::Scalar = random_nonzero_scalar(rng);
        let alpha: G::Scalar = random_nonzero_scalar(rng);
        let generator = statement.register.generator;

        let t1 = generator * rho;
        let t2 = generator * alpha + statement.register.public_value * rho;
        let c = Self::challenge(statement, &t1, &t2);

        tracing::debug!(
            target: LOG_TARGET,
            token = %statement.token,
            "built binding proof"
        );

        Self {
            z_a: alpha + c * a,
            z_r: rho + c * r,
            t1,
            t2,
        }
    }

    /// `[z_r]G == t1 + [c]r1` and `[z_a]G + [z_r]V == t2 + [c]r2_g1`.
    pub fn verify(&self, statement: &BindingStatement<'_, G>) -> bool {
        let c = Self::challenge(statement, &self.t1, &self.t2);
        let g = statement.register.generator;
        let v = statement.register.public_value;

        let check_r = g * self.z_r == self.t1 + *statement.r1 * c;
        let check_a = g * self.z_a + v * self.z_r == self.t2 + *statement.r2_g1 * c;

        tracing::debug!(
            target: LOG_TARGET,
            token = %statement.token,
            check_r,
            check_a,
            "verified binding proof"
        );
        check_r && check_a
    }

    fn challenge(statement: &BindingStatement<'_, G>, t1: &G::G1, t2: &G::G1) -> G::Scalar {
        HashTranscript::new(BINDING_DOMAIN_TAG)
            .append_point(&statement.register.generator)
            .append_point(&statement.register.public_value)
            .append_point(t1)
            .append_point(t2)
            .append_point(statement.r1)
            .append_point(statement.r2_g1)
            .append_bytes(statement.token.as_bytes())
            .challenge()
    }
}
