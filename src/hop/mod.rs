//! Re-encryption of a listing for a new owner.
//!
//! A hop spans two ledger transactions. The first carries a SNARK over the
//! hop key and moves the listing to `Pending`; the second publishes the new
//! levels and hands the listing to the bidder. The secrets of the second
//! half are persisted together with the phase they belong to in one
//! [`HopRecord`], so a restarted client resumes from the record alone.

pub mod coordinator;


use std::fmt;

use ark_ff::Zero;
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::algebra::group::ProtocolGroup;
use crate::algebra::{ensure_nonzero, hop_key};
use crate::chain::{Timestamp, TokenId, TxId};
use crate::error::{ProtocolError, Result};
use crate::identity::{Register, SecretKey, Vkh};
use crate::level::{
    build_level, FullEncryptionLevel, HalfEncryptionLevel, LevelKind, LevelSecrets,
};
use crate::proofs::BindingProof;
use crate::snark::HopWitness;
use crate::store::SecretRecord;

pub use coordinator::HopCoordinator;

const LOG_TARGET: &str = "peace_protocol::hop";

/// Where a hop stands, as observed from the local record and the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HopState {
    Idle,
    AwaitingProof,
    ProofReady,
    Completed,
    Abandoned,
}

impl fmt::Display for HopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::AwaitingProof => "awaiting_proof",
            Self::ProofReady => "proof_ready",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        };
        f.write_str(label)
    }
}

/// Persisted phase of an in-flight hop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "", tag = "phase", rename_all = "snake_case")]
pub enum HopPhase<G: ProtocolGroup> {
    AwaitingProof,
    /// Written before the proof transaction is submitted.
    ProofReady {
        #[serde(with = "crate::crypto_serde::scalar_vec")]
        public_inputs: Vec<G::Scalar>,
        ttl: Timestamp,
        #[serde(default)]
        proof_tx: Option<TxId>,
    },
}

/// Hop secrets plus phase, keyed by listing token.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct HopRecord<G: ProtocolGroup> {
    pub listing_token: TokenId,
    pub bid_token: TokenId,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub a0: G::Scalar,
    #[serde(with = "crate::crypto_serde::scalar")]
    pub r0: G::Scalar,
    /// Cached `hop_hash(e([a0]G1, H0))`. Absent in version 1 records.
    #[serde(default, with = "crate::crypto_serde::option_scalar")]
    pub hk: Option<G::Scalar>,
    pub phase: HopPhase<G>,
}

impl<G: ProtocolGroup> HopRecord<G> {
    /// Fresh record in `AwaitingProof` with newly sampled `(a0, r0)`.
    pub fn sample<R: Rng + ?Sized>(listing_token: TokenId, bid_token: TokenId, rng: &mut R) -> Self {
        let secrets = LevelSecrets::<G::Scalar>::random(rng);
        let a0 = secrets.a;
        Self {
            listing_token,
            bid_token,
            a0,
            r0: secrets.r,
            hk: Some(hop_key::<G>(&a0)),
            phase: HopPhase::AwaitingProof,
        }
    }

    /// The hop key, recomputed from `a0` when the cache is missing or zero.
    /// A cached value that disagrees with `a0` is refused.
    pub fn resolved_hop_key(&self) -> Result<G::Scalar> {
        ensure_nonzero(&self.a0, "hop exponent a0")?;
        ensure_nonzero(&self.r0, "hop exponent r0")?;
        let recomputed = hop_key::<G>(&self.a0);
        match self.hk {
            Some(hk) if !hk.is_zero() && hk != recomputed => {
                tracing::warn!(
                    target: LOG_TARGET,
                    token = %self.listing_token,
                    "cached hop key disagrees with a0"
                );
                Err(ProtocolError::mismatch(format!(
                    "cached hop key for {} does not match a0",
                    self.listing_token
                )))
            }
            Some(hk) if !hk.is_zero() => Ok(hk),
            _ => {
                tracing::debug!(
                    target: LOG_TARGET,
                    token = %self.listing_token,
                    "recomputing hop key from a0"
                );
                Ok(recomputed)
            }
        }
    }

    pub fn state(&self) -> HopState {
        match self.phase {
            HopPhase::AwaitingProof => HopState::AwaitingProof,
            HopPhase::ProofReady { .. } => HopState::ProofReady,
        }
    }
}

impl<G: ProtocolGroup> Drop for HopRecord<G> {
    fn drop(&mut self) {
        self.a0.zeroize();
        self.r0.zeroize();
        if let Some(hk) = self.hk.as_mut() {
            hk.zeroize();
        }
    }
}

impl<G: ProtocolGroup> fmt::Debug for HopRecord<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HopRecord")
            .field("listing_token", &self.listing_token)
            .field("bid_token", &self.bid_token)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<G: ProtocolGroup> SecretRecord for HopRecord<G> {
    const ROLE: &'static str = "hop";

    fn key(&self) -> TokenId {
        self.listing_token
    }

    fn index(&self) -> Option<TokenId> {
        Some(self.bid_token)
    }
}

/// Everything the second hop transaction carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HopArtifacts<G: ProtocolGroup> {
    pub witness: HopWitness<G>,
    /// `[hk]G2 - [sk]H0`
    pub r5: G::G2,
    pub buyer: Register<G>,
    pub buyer_vkh: Vkh,
    /// The buyer's level, built with `(a0, r0)`.
    pub half_level: HalfEncryptionLevel<G>,
    /// The outgoing owner's half level completed with `r5`.
    pub full_level: FullEncryptionLevel<G>,
    pub binding: BindingProof<G>,
}

/// Inputs of [`assemble_hop`] that come from the outgoing owner and the
/// accepted bid.
#[derive(Clone, Copy, Debug)]
pub struct HopContext<'a, G: ProtocolGroup> {
    pub token: &'a TokenId,
    pub outgoing: &'a HalfEncryptionLevel<G>,
    pub buyer: &'a Register<G>,
    pub buyer_vkh: Vkh,
}

/// Build the second-transaction artifacts. Pure apart from the proof
/// randomness drawn from `rng`.
pub fn assemble_hop<G: ProtocolGroup, R: Rng + ?Sized>(
    a0: &G::Scalar,
    r0: &G::Scalar,
    hk: G::Scalar,
    sk: &SecretKey<G::Scalar>,
    context: &HopContext<'_, G>,
    rng: &mut R,
) -> Result<HopArtifacts<G>> {
    let secrets = LevelSecrets::new(*a0, *r0)?;
    let witness = HopWitness::with_hop_key(hk, a0, r0, &context.buyer.public_value);
    let r5 = G::g2_generator() * hk + (-G::h0()) * *sk.expose();

    let built = build_level(&secrets, context.buyer, context.token, LevelKind::Hop, rng)?;
    let full_level = FullEncryptionLevel::complete(context.outgoing, r5);

    tracing::debug!(
        target: LOG_TARGET,
        token = %context.token,
        buyer = %context.buyer_vkh,
        "assembled hop artifacts"
    );
    Ok(HopArtifacts {
        witness,
        r5,
        buyer: *context.buyer,
        buyer_vkh: context.buyer_vkh,
        half_level: built.level,
        full_level,
        binding: built.binding,
    })
}
