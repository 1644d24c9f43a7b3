//! On-chain records the core reads and the transactions it submits, behind a
//! provider seam so the ledger itself stays an external collaborator.

pub mod datum;
pub mod in_memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::algebra::encoding::decode_hex;
use crate::algebra::group::ProtocolGroup;
use crate::capsule::Capsule;
use crate::error::{ProtocolError, Result};
use crate::hop::HopArtifacts;
use crate::identity::{Register, Vkh};
use crate::level::{FullEncryptionLevel, HalfEncryptionLevel};
use crate::proofs::{BindingProof, SchnorrProof};
use crate::snark::SnarkProof;

pub use in_memory::InMemoryChain;

/// POSIX time in milliseconds, the unit of transaction validity intervals.
pub type Timestamp = i64;

pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// 32-byte token name identifying a listing or a bid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.to_hex())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TokenId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = decode_hex(s)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::bad_encoding(format!("token id must be 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for TokenId {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.to_hex()
    }
}

/// Listing status. `Open -> Pending -> Open` is the only transition cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "", tag = "state", rename_all = "snake_case")]
pub enum ListingStatus<G: ProtocolGroup> {
    Open,
    Pending {
        #[serde(with = "crate::crypto_serde::scalar_vec")]
        public_inputs: Vec<G::Scalar>,
        ttl: Timestamp,
    },
}

impl<G: ProtocolGroup> ListingStatus<G> {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Anyone may revert a pending listing once `now` is strictly past `ttl`.
    pub fn is_abandonable(&self, now: Timestamp) -> bool {
        match self {
            Self::Open => false,
            Self::Pending { ttl, .. } => now > *ttl,
        }
    }
}

/// The listing datum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct EncryptionRecord<G: ProtocolGroup> {
    pub owner_vkh: Vkh,
    pub owner: Register<G>,
    pub token: TokenId,
    pub half_level: HalfEncryptionLevel<G>,
    pub full_level: Option<FullEncryptionLevel<G>>,
    pub capsule: Capsule,
    pub status: ListingStatus<G>,
}

/// The bid datum. `pointer` names the bid itself; `token` the listing it targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct BidRecord<G: ProtocolGroup> {
    pub owner_vkh: Vkh,
    pub owner: Register<G>,
    pub pointer: TokenId,
    pub token: TokenId,
    pub amount: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the core asks the ledger to do.
#[derive(Clone, Debug)]
pub enum Transaction<G: ProtocolGroup> {
    CreateListing {
        record: EncryptionRecord<G>,
        schnorr: SchnorrProof<G>,
        binding: BindingProof<G>,
    },
    RemoveListing {
        token: TokenId,
        owner_vkh: Vkh,
    },
    PlaceBid {
        record: BidRecord<G>,
        schnorr: SchnorrProof<G>,
    },
    RemoveBid {
        pointer: TokenId,
        owner_vkh: Vkh,
    },
    /// First hop transaction: moves the listing to `Pending`.
    UseSnark {
        token: TokenId,
        bid: TokenId,
        proof: SnarkProof,
        public_inputs: Vec<G::Scalar>,
        commitment_wires: Vec<G::Scalar>,
        ttl: Timestamp,
    },
    /// Second hop transaction: hands the listing to the bidder.
    UseEncryption {
        token: TokenId,
        bid: TokenId,
        artifacts: HopArtifacts<G>,
    },
    /// Reverts an expired `Pending` listing. Any party may submit it.
    CancelEncryption {
        token: TokenId,
    },
}

impl<G: ProtocolGroup> Transaction<G> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateListing { .. } => "create_listing",
            Self::RemoveListing { .. } => "remove_listing",
            Self::PlaceBid { .. } => "place_bid",
            Self::RemoveBid { .. } => "remove_bid",
            Self::UseSnark { .. } => "use_snark",
            Self::UseEncryption { .. } => "use_encryption",
            Self::CancelEncryption { .. } => "cancel_encryption",
        }
    }
}

/// Chain queries and submission. Every failure is `ExternalFailure` and may
/// be retried by the caller.
#[async_trait]
pub trait ChainProvider<G: ProtocolGroup>: Send + Sync {
    async fn fetch_encryption(&self, token: &TokenId) -> Result<Option<EncryptionRecord<G>>>;

    async fn fetch_bid(&self, pointer: &TokenId) -> Result<Option<BidRecord<G>>>;

    async fn fetch_bids_for(&self, token: &TokenId) -> Result<Vec<BidRecord<G>>>;

    /// Completed levels of a listing, newest first.
    async fn fetch_level_history(&self, token: &TokenId) -> Result<Vec<FullEncryptionLevel<G>>>;

    async fn submit(&self, tx: Transaction<G>) -> Result<TxId>;

    /// Reward balance of the protocol's withdrawal address.
    async fn reward_balance(&self) -> Result<u64>;

    /// Ledger time used to judge validity intervals.
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bls12;
    use crate::test_utils::test_rng;
    use ark_bls12_381::Fr;
    use proptest::prelude::*;

    #[test]
    fn token_id_parses_with_and_without_prefix() {
        let token = TokenId::random(&mut test_rng(5));
        assert_eq!(token.to_hex().parse::<TokenId>().unwrap(), token);
        assert_eq!(format!("0x{token}").parse::<TokenId>().unwrap(), token);
        assert!("abcd".parse::<TokenId>().is_err());
        crate::test_utils::serde::assert_round_trip_eq(&token);
    }

    proptest! {
        #[test]
        fn ttl_boundary(now in -1_000_000_000_000i64..4_000_000_000_000i64) {
            let expired = ListingStatus::<Bls12>::Pending { public_inputs: vec![Fr::from(1u64)], ttl: now - 1 };
            let live = ListingStatus::<Bls12>::Pending { public_inputs: vec![Fr::from(1u64)], ttl: now + 1 };
            prop_assert!(expired.is_abandonable(now));
            prop_assert!(!live.is_abandonable(now));
            prop_assert!(!ListingStatus::<Bls12>::Open.is_abandonable(now));
        }
    }
}
