//! Common test utilities: serde round-trip assertions, a deterministic RNG
//! and a toy pairing group small enough to check protocol arithmetic by hand.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Helpers shared across test modules.
pub mod serde {
    use std::fmt::Debug;

    /// Assert that a value survives a serde_json round-trip using structural equality.
    pub fn assert_round_trip_eq<T>(value: &T)
    where
        T: ::serde::Serialize + ::serde::de::DeserializeOwned + PartialEq + Debug,
    {
        let json = serde_json::to_string(value)
            .expect("serialization should succeed during round-trip testing");
        let restored: T = serde_json::from_str(&json)
            .expect("deserialization should succeed during round-trip testing");
        assert_eq!(restored, *value, "serde_json round-trip altered the value");
    }
}

pub fn test_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Additive group of prime order 11 with `G = 1` and the "pairing"
/// `e(p, q) = p * q`. Bilinear, so every protocol identity holds, and small
/// enough that expected values can be written down directly.
pub mod toy {
    use std::ops::{Add, Mul, Neg, Sub};

    use ark_ff::fields::{Fp64, MontBackend, MontConfig};
    use ark_ff::{BigInteger, PrimeField};

    use crate::algebra::group::{GroupElement, ProtocolGroup};
    use crate::error::{ProtocolError, Result};

    #[derive(MontConfig)]
    #[modulus = "11"]
    #[generator = "2"]
    pub struct F11Config;
    pub type F11 = Fp64<MontBackend<F11Config, 1>>;

    pub fn f(value: u64) -> F11 {
        F11::from(value)
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ToyPoint(pub F11);

    impl Add for ToyPoint {
        type Output = Self;
        fn add(self, rhs: Self) -> Self {
            Self(self.0 + rhs.0)
        }
    }

    impl Sub for ToyPoint {
        type Output = Self;
        fn sub(self, rhs: Self) -> Self {
            Self(self.0 - rhs.0)
        }
    }

    impl Neg for ToyPoint {
        type Output = Self;
        fn neg(self) -> Self {
            Self(-self.0)
        }
    }

    impl Mul<F11> for ToyPoint {
        type Output = Self;
        fn mul(self, rhs: F11) -> Self {
            Self(self.0 * rhs)
        }
    }

    impl GroupElement for ToyPoint {
        type Scalar = F11;
        const ENCODED_LEN: usize = 1;

        fn identity() -> Self {
            Self(F11::from(0u64))
        }

        fn to_bytes(&self) -> Vec<u8> {
            vec![self.0.into_bigint().to_bytes_le()[0]]
        }

        fn from_bytes(bytes: &[u8]) -> Result<Self> {
            match bytes {
                [b] if *b < 11 => Ok(Self(F11::from(*b as u64))),
                _ => Err(ProtocolError::bad_encoding("toy point must be one byte below 11")),
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ToyGt(pub F11);

    impl Add for ToyGt {
        type Output = Self;
        fn add(self, rhs: Self) -> Self {
            Self(self.0 + rhs.0)
        }
    }

    impl Sub for ToyGt {
        type Output = Self;
        fn sub(self, rhs: Self) -> Self {
            Self(self.0 - rhs.0)
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ToyGroup;

    impl ProtocolGroup for ToyGroup {
        type Scalar = F11;
        type G1 = ToyPoint;
        type G2 = ToyPoint;
        type Gt = ToyGt;

        const LIMBS_PER_POINT: usize = 1;

        fn g1_generator() -> ToyPoint {
            ToyPoint(f(1))
        }

        fn g2_generator() -> ToyPoint {
            ToyPoint(f(1))
        }

        fn h0() -> ToyPoint {
            ToyPoint(f(2))
        }

        fn h1() -> ToyPoint {
            ToyPoint(f(3))
        }

        fn h2() -> ToyPoint {
            ToyPoint(f(4))
        }

        fn h3() -> ToyPoint {
            ToyPoint(f(5))
        }

        fn pairing(p: &ToyPoint, q: &ToyPoint) -> ToyGt {
            ToyGt(p.0 * q.0)
        }

        fn hop_hash(k: &ToyGt) -> F11 {
            k.0
        }

        fn snark_limbs(p: &ToyPoint) -> Vec<F11> {
            vec![p.0]
        }
    }

    pub fn point(value: u64) -> ToyPoint {
        ToyPoint(f(value))
    }
}
