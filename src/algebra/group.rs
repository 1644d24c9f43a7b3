use std::fmt::Debug;
use std::ops::{Add, Mul, Neg, Sub};

use ark_ff::PrimeField;

use crate::error::Result;

/// A point in one of the protocol's prime-order groups, written additively.
///
/// Scalar multiplication (`point * scalar`) is required where the group is
/// bound into a [`ProtocolGroup`]. The fixed-length byte encoding
/// is what travels on-chain and through the transcript hashes.
pub trait GroupElement:
    Copy
    + Eq
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
{
    type Scalar: PrimeField;

    /// Length in bytes of the fixed encoding.
    const ENCODED_LEN: usize;

    fn identity() -> Self;

    fn to_bytes(&self) -> Vec<u8>;

    /// Decode a fixed-length encoding. Any malformed input is `BadEncoding`.
    fn from_bytes(bytes: &[u8]) -> Result<Self>;

    fn is_identity(&self) -> bool {
        *self == Self::identity()
    }
}

/// The algebraic setting every protocol operation is generic over: a scalar
/// field, two source groups with a bilinear pairing into `Gt`, the fixed
/// public generators and the circuit-friendly hash that folds a `Gt`
/// element back into a scalar.
///
/// `Gt` is written additively as well, so `a + b` is the group operation
/// (multiplication in the underlying extension field).
pub trait ProtocolGroup:
    Clone + Copy + Debug + Default + PartialEq + Eq + Send + Sync + 'static
{
    type Scalar: PrimeField;
    type G1: GroupElement<Scalar = Self::Scalar> + Mul<Self::Scalar, Output = Self::G1>;
    type G2: GroupElement<Scalar = Self::Scalar> + Mul<Self::Scalar, Output = Self::G2>;
    type Gt: Copy
        + Eq
        + Debug
        + Send
        + Sync
        + Add<Output = Self::Gt>
        + Sub<Output = Self::Gt>;

    /// Number of SNARK public inputs one G1 point expands into.
    const LIMBS_PER_POINT: usize;

    fn g1_generator() -> Self::G1;

    fn g2_generator() -> Self::G2;

    /// Fixed public generator used for hop keys and key recovery.
    fn h0() -> Self::G2;

    /// Coefficient base for the `r4` commitment.
    fn h1() -> Self::G2;

    fn h2() -> Self::G2;

    /// Only folded into genesis levels.
    fn h3() -> Self::G2;

    fn pairing(p: &Self::G1, q: &Self::G2) -> Self::Gt;

    /// Collision-resistant compression of a `Gt` element that the proof
    /// circuit recomputes bit-for-bit.
    fn hop_hash(k: &Self::Gt) -> Self::Scalar;

    /// Native-field limbs of a G1 point's affine coordinates, in the order the
    /// proof circuit exposes them as public inputs.
    fn snark_limbs(p: &Self::G1) -> Vec<Self::Scalar>;
}

/// Number of public inputs the hop circuit exposes for `(V, W0, W1)`.
pub fn public_input_len<G: ProtocolGroup>() -> usize {
    3 * G::LIMBS_PER_POINT
}
