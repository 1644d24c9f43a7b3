use super::{FullEncryptionLevel, HalfEncryptionLevel};
use crate::algebra::group::ProtocolGroup;
use crate::identity::SecretKey;

const LOG_TARGET: &str = "peace_protocol::level::decrypt";

/// Key carried by one level for the holder of `shared`:
/// `hop_hash(e(r2_g1, H0) + e(r1, r2_g2) - e(r1, shared))`, with the middle
/// term absent on a half level.
pub fn level_key<G: ProtocolGroup>(
    r1: &G::G1,
    r2_g1: &G::G1,
    r2_g2: Option<&G::G2>,
    shared: &G::G2,
) -> G::Scalar {
    let mut k = G::pairing(r2_g1, &G::h0());
    if let Some(r2_g2) = r2_g2 {
        k = k + G::pairing(r1, r2_g2);
    }
    k = k - G::pairing(r1, shared);
    G::hop_hash(&k)
}

/// Walk from the current owner's half level back through every completed
/// hop and return the genesis hop key that opens the capsule.
///
/// `history` is ordered newest first. The current owner starts with
/// `shared = [sk]·H0`; each full level then hands the next one
/// `shared = [k]·G2`.
pub fn recover_capsule_key<G: ProtocolGroup>(
    sk: &SecretKey<G::Scalar>,
    current: &HalfEncryptionLevel<G>,
    history: &[FullEncryptionLevel<G>],
) -> G::Scalar {
    let shared = G::h0() * *sk.expose();
    let mut k = level_key::<G>(&current.r1, &current.r2_g1, None, &shared);
    for level in history {
        let shared = G::g2_generator() * k;
        k = level_key::<G>(&level.r1, &level.r2_g1, Some(&level.r2_g2), &shared);
    }
    tracing::debug!(target: LOG_TARGET, hops = history.len(), "recovered capsule key");
    k
}
