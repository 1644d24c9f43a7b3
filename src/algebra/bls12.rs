use ark_bls12_381::{
    Bls12_381, Fq, Fq12, Fr, G1Affine, G1Projective, G2Affine, G2Projective,
};
use ark_ec::pairing::{Pairing, PairingOutput};
use ark_ec::short_weierstrass::Projective;
use ark_ec::{AffineRepr, CurveGroup, PrimeGroup};
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use once_cell::sync::Lazy;

use super::constants::{F12_DOMAIN_TAG, H0_HEX, H1_HEX, H2_HEX, H3_HEX};
use super::encoding::decode_hex;
use super::group::{GroupElement, ProtocolGroup};
use super::mimc::Mimc;
use crate::error::{ProtocolError, Result};

const G1_COMPRESSED_LEN: usize = 48;
const G2_COMPRESSED_LEN: usize = 96;

/// 64-bit limbs per base-field coordinate as the circuit's emulated field
/// exposes them.
const LIMBS_PER_COORDINATE: usize = 6;

// Concrete curve types; the `G1Projective`/`G2Projective` aliases resolve
// through an associated type, which trait coherence cannot see through.
type G1Point = Projective<ark_bls12_381::g1::Config>;
type G2Point = Projective<ark_bls12_381::g2::Config>;

static MIMC: Lazy<Mimc<Fr>> = Lazy::new(Mimc::gnark);
static F12_TAG: Lazy<Fr> = Lazy::new(|| Fr::from_be_bytes_mod_order(F12_DOMAIN_TAG));

fn fixed_g2(hex: &str) -> G2Projective {
    let bytes = decode_hex(hex).expect("fixed generator hex is well formed");
    G2Projective::from_bytes(&bytes).expect("fixed generator is a valid G2 point")
}

static H0: Lazy<G2Projective> = Lazy::new(|| fixed_g2(H0_HEX));
static H1: Lazy<G2Projective> = Lazy::new(|| fixed_g2(H1_HEX));
static H2: Lazy<G2Projective> = Lazy::new(|| fixed_g2(H2_HEX));
static H3: Lazy<G2Projective> = Lazy::new(|| fixed_g2(H3_HEX));

fn compressed<A: CanonicalSerialize>(affine: &A, len: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(len);
    affine
        .serialize_compressed(&mut buf)
        .expect("serializing a curve point into a Vec cannot fail");
    buf
}

fn decompress<A: CanonicalDeserialize>(bytes: &[u8], len: usize, group: &str) -> Result<A> {
    if bytes.len() != len {
        return Err(ProtocolError::bad_encoding(format!(
            "{group} point must be {len} bytes, got {}",
            bytes.len()
        )));
    }
    A::deserialize_compressed(bytes)
        .map_err(|err| ProtocolError::bad_encoding(format!("invalid {group} point: {err}")))
}

impl GroupElement for G1Point {
    type Scalar = Fr;
    const ENCODED_LEN: usize = G1_COMPRESSED_LEN;

    fn identity() -> Self {
        Self::zero()
    }

    fn to_bytes(&self) -> Vec<u8> {
        compressed(&self.into_affine(), G1_COMPRESSED_LEN)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decompress::<G1Affine>(bytes, G1_COMPRESSED_LEN, "G1").map(Into::into)
    }
}

impl GroupElement for G2Point {
    type Scalar = Fr;
    const ENCODED_LEN: usize = G2_COMPRESSED_LEN;

    fn identity() -> Self {
        Self::zero()
    }

    fn to_bytes(&self) -> Vec<u8> {
        compressed(&self.into_affine(), G2_COMPRESSED_LEN)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        decompress::<G2Affine>(bytes, G2_COMPRESSED_LEN, "G2").map(Into::into)
    }
}

/// Coefficients of an `Fq12` element in tower order
/// `c0.c0.c0, c0.c0.c1, c0.c1.c0, ..., c1.c2.c1`.
pub fn fq12_coefficients(k: &Fq12) -> [Fq; 12] {
    let mut out = [Fq::zero(); 12];
    for (half, fq6) in [&k.c0, &k.c1].into_iter().enumerate() {
        for (i, fq2) in [&fq6.c0, &fq6.c1, &fq6.c2].into_iter().enumerate() {
            out[half * 6 + i * 2] = fq2.c0;
            out[half * 6 + i * 2 + 1] = fq2.c1;
        }
    }
    out
}

/// Canonical 576-byte encoding of a pairing output: twelve 48-byte big-endian
/// coordinates in [`fq12_coefficients`] order.
pub fn gt_to_bytes(k: &PairingOutput<Bls12_381>) -> Vec<u8> {
    fq12_coefficients(&k.0)
        .iter()
        .flat_map(|fq| fq.into_bigint().to_bytes_be())
        .collect()
}

fn limbs(fq: &Fq) -> impl Iterator<Item = Fr> {
    fq.into_bigint().0.into_iter().map(Fr::from)
}

/// BLS12-381 instantiation of the protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bls12;

impl ProtocolGroup for Bls12 {
    type Scalar = Fr;
    type G1 = G1Point;
    type G2 = G2Point;
    type Gt = PairingOutput<Bls12_381>;

    const LIMBS_PER_POINT: usize = 2 * LIMBS_PER_COORDINATE;

    fn g1_generator() -> Self::G1 {
        G1Projective::generator()
    }

    fn g2_generator() -> Self::G2 {
        G2Projective::generator()
    }

    fn h0() -> Self::G2 {
        *H0
    }

    fn h1() -> Self::G2 {
        *H1
    }

    fn h2() -> Self::G2 {
        *H2
    }

    fn h3() -> Self::G2 {
        *H3
    }

    fn pairing(p: &Self::G1, q: &Self::G2) -> Self::Gt {
        Bls12_381::pairing(p.into_affine(), q.into_affine())
    }

    /// MiMC over the twelve `Fq12` coordinates, each reduced into `Fr`, then
    /// the `F12` domain tag as a trailing element.
    fn hop_hash(k: &Self::Gt) -> Self::Scalar {
        let mut inputs: Vec<Fr> = fq12_coefficients(&k.0)
            .iter()
            .map(|fq| Fr::from_be_bytes_mod_order(&fq.into_bigint().to_bytes_be()))
            .collect();
        inputs.push(*F12_TAG);
        MIMC.hash(&inputs)
    }

    /// Six little-endian 64-bit limbs of `x`, then six of `y`. The point at
    /// infinity maps to all-zero limbs.
    fn snark_limbs(p: &Self::G1) -> Vec<Self::Scalar> {
        let (x, y) = p.into_affine().xy().unwrap_or((Fq::zero(), Fq::zero()));
        limbs(&x).chain(limbs(&y)).collect()
    }
}
