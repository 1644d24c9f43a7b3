use std::fmt;

use ark_ff::PrimeField;
use rand::Rng;

use super::{HalfEncryptionLevel, LevelKind};
use crate::algebra::constants::{H2I_A_DOMAIN_TAG, H2I_DOMAIN_TAG};
use crate::algebra::group::ProtocolGroup;
use crate::algebra::hashing::HashTranscript;
use crate::algebra::{ensure_nonzero, random_nonzero_scalar};
use crate::chain::TokenId;
use crate::error::Result;
use crate::identity::Register;
use crate::proofs::{BindingProof, BindingStatement};

const LOG_TARGET: &str = "peace_protocol::level::builder";

/// The exponent pair `(a, r)` behind a level. Zeroized on drop.
#[derive(Clone)]
pub struct LevelSecrets<F: PrimeField> {
    pub a: F,
    pub r: F,
}

impl<F: PrimeField> LevelSecrets<F> {
    pub fn new(a: F, r: F) -> Result<Self> {
        ensure_nonzero(&a, "level exponent a")?;
        ensure_nonzero(&r, "level exponent r")?;
        Ok(Self { a, r })
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            a: random_nonzero_scalar(rng),
            r: random_nonzero_scalar(rng),
        }
    }
}

impl<F: PrimeField> Drop for LevelSecrets<F> {
    fn drop(&mut self) {
        self.a.zeroize();
        self.r.zeroize();
    }
}

impl<F: PrimeField> fmt::Debug for LevelSecrets<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LevelSecrets(..)")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuiltLevel<G: ProtocolGroup> {
    pub level: HalfEncryptionLevel<G>,
    pub binding: BindingProof<G>,
}

/// `c = [H2I_A(r1)]·H1 + [H2I(r1 ∥ r2_g1 ∥ token)]·H2`, plus `H3` for genesis.
pub fn level_commitment<G: ProtocolGroup>(
    r1: &G::G1,
    r2_g1: &G::G1,
    token: &TokenId,
    kind: LevelKind,
) -> G::G2 {
    let a_coeff: G::Scalar = HashTranscript::new(H2I_A_DOMAIN_TAG)
        .append_point(r1)
        .challenge();
    let b_coeff: G::Scalar = HashTranscript::new(H2I_DOMAIN_TAG)
        .append_point(r1)
        .append_point(r2_g1)
        .append_bytes(token.as_bytes())
        .challenge();

    let c = G::h1() * a_coeff + G::h2() * b_coeff;
    match kind {
        LevelKind::Genesis => c + G::h3(),
        LevelKind::Hop => c,
    }
}

/// Build a half level for `owner` from `(a, r)` together with the binding
/// proof tying it to `(owner, token)`.
pub fn build_level<G: ProtocolGroup, R: Rng + ?Sized>(
    secrets: &LevelSecrets<G::Scalar>,
    owner: &Register<G>,
    token: &TokenId,
    kind: LevelKind,
    rng: &mut R,
) -> Result<BuiltLevel<G>> {
    ensure_nonzero(&secrets.a, "level exponent a")?;
    ensure_nonzero(&secrets.r, "level exponent r")?;

    let g = owner.generator;
    let r1 = g * secrets.r;
    let r2_g1 = g * secrets.a + owner.public_value * secrets.r;
    let c = level_commitment::<G>(&r1, &r2_g1, token, kind);
    let r4 = c * secrets.r;

    let level = HalfEncryptionLevel { r1, r2_g1, r4 };
    let statement = BindingStatement {
        register: owner,
        r1: &level.r1,
        r2_g1: &level.r2_g1,
        token,
    };
    let binding = BindingProof::prove(&secrets.a, &secrets.r, &statement, rng);

    tracing::debug!(target: LOG_TARGET, %token, ?kind, "built encryption level");
    Ok(BuiltLevel { level, binding })
}

/// The checks a validator runs on a submitted level: the binding proof and
/// `e(r1, c) == e(G, r4)`.
pub fn verify_level<G: ProtocolGroup>(
    level: &HalfEncryptionLevel<G>,
    binding: &BindingProof<G>,
    owner: &Register<G>,
    token: &TokenId,
    kind: LevelKind,
) -> bool {
    let statement = BindingStatement {
        register: owner,
        r1: &level.r1,
        r2_g1: &level.r2_g1,
        token,
    };
    if !binding.verify(&statement) {
        return false;
    }
    let c = level_commitment::<G>(&level.r1, &level.r2_g1, token, kind);
    G::pairing(&level.r1, &c) == G::pairing(&owner.generator, &level.r4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bls12;
    use crate::identity::SecretKey;
    use crate::test_utils::test_rng;
    use crate::test_utils::toy::{f, point, ToyGroup};
    use ark_bls12_381::Fr;
    use ark_ff::{One, Zero};
    use proptest::prelude::*;

    fn owner(seed: u64) -> Register<Bls12> {
        let sk = SecretKey::new(Fr::from(seed.wrapping_mul(31).wrapping_add(7))).unwrap();
        Register::canonical(&sk).unwrap()
    }

    #[test]
    fn toy_level_matches_hand_computation() {
        // a = 3, r = 5, G = 1, V = 4: r1 = 5, r2_g1 = 3 + 5·4 = 23 = 1 (mod 11).
        let register = Register::<ToyGroup>::new(point(1), point(4)).unwrap();
        let secrets = LevelSecrets::new(f(3), f(5)).unwrap();
        let token = TokenId::new([0u8; 32]);
        let built =
            build_level(&secrets, &register, &token, LevelKind::Genesis, &mut test_rng(0)).unwrap();
        assert_eq!(built.level.r1, point(5));
        assert_eq!(built.level.r2_g1, point(1));
        assert!(verify_level(&built.level, &built.binding, &register, &token, LevelKind::Genesis));
    }

    #[test]
    fn zero_exponent_is_invalid_secret() {
        let err = LevelSecrets::new(Fr::zero(), Fr::one()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidSecret);
    }

    #[test]
    fn genesis_and_hop_levels_differ_only_in_r4() {
        let mut rng = test_rng(3);
        let secrets = LevelSecrets::<Fr>::random(&mut rng);
        let register = owner(3);
        let token = TokenId::random(&mut rng);

        let genesis = build_level(&secrets, &register, &token, LevelKind::Genesis, &mut rng).unwrap();
        let hop = build_level(&secrets, &register, &token, LevelKind::Hop, &mut rng).unwrap();
        assert_eq!(genesis.level.r1, hop.level.r1);
        assert_eq!(genesis.level.r2_g1, hop.level.r2_g1);
        assert_ne!(genesis.level.r4, hop.level.r4);

        // Each level only checks under its own kind.
        assert!(verify_level(&genesis.level, &genesis.binding, &register, &token, LevelKind::Genesis));
        assert!(!verify_level(&genesis.level, &genesis.binding, &register, &token, LevelKind::Hop));
        assert!(verify_level(&hop.level, &hop.binding, &register, &token, LevelKind::Hop));
    }

    #[test]
    fn binding_is_tied_to_token() {
        let mut rng = test_rng(4);
        let secrets = LevelSecrets::<Fr>::random(&mut rng);
        let register = owner(4);
        let token = TokenId::random(&mut rng);
        let other = TokenId::random(&mut rng);
        let built = build_level(&secrets, &register, &token, LevelKind::Hop, &mut rng).unwrap();
        assert!(!verify_level(&built.level, &built.binding, &register, &other, LevelKind::Hop));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(6))]

        #[test]
        fn perturbing_one_exponent_breaks_binding(seed in any::<u64>(), perturb_a in any::<bool>()) {
            let mut rng = test_rng(seed);
            let secrets = LevelSecrets::<Fr>::random(&mut rng);
            let register = owner(seed);
            let token = TokenId::random(&mut rng);

            let built = build_level(&secrets, &register, &token, LevelKind::Hop, &mut rng).unwrap();
            let statement = BindingStatement {
                register: &register,
                r1: &built.level.r1,
                r2_g1: &built.level.r2_g1,
                token: &token,
            };
            prop_assert!(built.binding.verify(&statement));

            let (a, r) = if perturb_a {
                (secrets.a + Fr::one(), secrets.r)
            } else {
                (secrets.a, secrets.r + Fr::one())
            };
            let forged = BindingProof::prove(&a, &r, &statement, &mut rng);
            prop_assert!(!forged.verify(&statement));
        }
    }
}
