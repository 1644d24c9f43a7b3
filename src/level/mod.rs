//! Encryption levels: the public commitments one hop of key material
//! publishes, the builder that produces them with proof, and the key
//! recovery walk over a level chain.

pub mod builder;
pub mod decrypt;

use serde::{Deserialize, Serialize};

use crate::algebra::group::ProtocolGroup;

pub use builder::{build_level, level_commitment, verify_level, BuiltLevel, LevelSecrets};
pub use decrypt::{level_key, recover_capsule_key};

/// Whether a level opens a listing or re-encrypts it for a new owner. Only
/// genesis levels fold `H3` into the `r4` commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    Genesis,
    Hop,
}

/// One hop of key material, before the next owner's `r2_g2` is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HalfEncryptionLevel<G: ProtocolGroup> {
    #[serde(with = "crate::crypto_serde::point")]
    pub r1: G::G1,
    #[serde(with = "crate::crypto_serde::point")]
    pub r2_g1: G::G1,
    #[serde(with = "crate::crypto_serde::point")]
    pub r4: G::G2,
}

/// A completed hop: the outgoing owner's half level plus the `R5` component
/// that lets the next owner walk back through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct FullEncryptionLevel<G: ProtocolGroup> {
    #[serde(with = "crate::crypto_serde::point")]
    pub r1: G::G1,
    #[serde(with = "crate::crypto_serde::point")]
    pub r2_g1: G::G1,
    #[serde(with = "crate::crypto_serde::point")]
    pub r2_g2: G::G2,
    #[serde(with = "crate::crypto_serde::point")]
    pub r4: G::G2,
}

impl<G: ProtocolGroup> FullEncryptionLevel<G> {
    /// Complete an outgoing half level with `R5`.
    pub fn complete(outgoing: &HalfEncryptionLevel<G>, r5: G::G2) -> Self {
        Self {
            r1: outgoing.r1,
            r2_g1: outgoing.r2_g1,
            r2_g2: r5,
            r4: outgoing.r4,
        }
    }

    pub fn half(&self) -> HalfEncryptionLevel<G> {
        HalfEncryptionLevel {
            r1: self.r1,
            r2_g1: self.r2_g1,
            r4: self.r4,
        }
    }
}
