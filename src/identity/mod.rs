//! Long-term actor keys, derived on demand from an external signing capability.

pub mod register;

use std::fmt;

use ark_ff::PrimeField;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::algebra::constants::{
    KEY_DERIVATION_MESSAGE, KEY_DOMAIN_TAG, STORE_DOMAIN_TAG, STORE_KEY_MESSAGE,
};
use crate::algebra::ensure_nonzero;
use crate::algebra::hashing::{blake2b_256, HashTranscript};
use crate::error::{ProtocolError, Result};

pub use register::{build_register, Register};

const LOG_TARGET: &str = "peace_protocol::identity";

/// Length of a verification-key hash.
pub const VKH_LEN: usize = 28;

/// A signer the core does not own. Signatures must be deterministic for a
/// given message so that derived keys are stable across sessions.
pub trait SigningCapability: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;

    /// Raw verification key bytes identifying the signer on-chain.
    fn verification_key(&self) -> Vec<u8>;
}

/// Ed25519 signing capability backed by an in-process key.
pub struct Ed25519Capability {
    key: SigningKey,
}

impl Ed25519Capability {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(seed),
        }
    }
}

impl fmt::Debug for Ed25519Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Capability")
            .field("verification_key", &hex::encode(self.verification_key()))
            .finish()
    }
}

impl SigningCapability for Ed25519Capability {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.key.sign(message).to_bytes().to_vec())
    }

    fn verification_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }
}

/// Verification-key hash: first 28 bytes of the key's BLAKE2b-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Vkh([u8; VKH_LEN]);

impl Vkh {
    pub fn of(capability: &dyn SigningCapability) -> Self {
        let digest = blake2b_256(&capability.verification_key());
        let mut out = [0u8; VKH_LEN];
        out.copy_from_slice(&digest[..VKH_LEN]);
        Self(out)
    }

    pub fn from_bytes(bytes: [u8; VKH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; VKH_LEN] {
        &self.0
    }
}

impl fmt::Debug for Vkh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vkh({})", hex::encode(self.0))
    }
}

impl fmt::Display for Vkh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<Vkh> for String {
    fn from(value: Vkh) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Vkh {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        let bytes = crate::algebra::encoding::decode_hex(&value)?;
        let bytes: [u8; VKH_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::bad_encoding(format!("vkh must be {VKH_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self(bytes))
    }
}

/// A long-term secret scalar. Zeroized on drop and never printed.
pub struct SecretKey<F: PrimeField>(F);

impl<F: PrimeField> SecretKey<F> {
    pub fn new(value: F) -> Result<Self> {
        ensure_nonzero(&value, "secret key")?;
        Ok(Self(value))
    }

    pub fn expose(&self) -> &F {
        &self.0
    }
}

impl<F: PrimeField> Drop for SecretKey<F> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<F: PrimeField> fmt::Debug for SecretKey<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Derive the actor's long-term scalar by hashing the capability's signature
/// over a fixed domain string.
pub fn derive_secret_key<F: PrimeField>(
    capability: &dyn SigningCapability,
) -> Result<SecretKey<F>> {
    let signature = Zeroizing::new(capability.sign(KEY_DERIVATION_MESSAGE)?);
    let value: F = HashTranscript::new(KEY_DOMAIN_TAG)
        .append_bytes(&signature)
        .challenge();
    tracing::debug!(target: LOG_TARGET, "derived long-term secret key");
    SecretKey::new(value)
}

/// 32-byte key-encryption key for secrets at rest.
pub fn derive_store_key(capability: &dyn SigningCapability) -> Result<Zeroizing<[u8; 32]>> {
    let signature = Zeroizing::new(capability.sign(STORE_KEY_MESSAGE)?);
    let key = HashTranscript::new(STORE_DOMAIN_TAG)
        .append_bytes(&signature)
        .digest();
    Ok(Zeroizing::new(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ark_bls12_381::Fr;
    use ark_ff::Zero;

    struct ConstantSigner(Vec<u8>);

    impl SigningCapability for ConstantSigner {
        fn sign(&self, _message: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }

        fn verification_key(&self) -> Vec<u8> {
            vec![7; 32]
        }
    }

    #[test]
    fn derivation_is_stable_per_identity() {
        let alice = Ed25519Capability::from_seed(&[1u8; 32]);
        let again = Ed25519Capability::from_seed(&[1u8; 32]);
        let bob = Ed25519Capability::from_seed(&[2u8; 32]);

        let a1 = derive_secret_key::<Fr>(&alice).unwrap();
        let a2 = derive_secret_key::<Fr>(&again).unwrap();
        let b = derive_secret_key::<Fr>(&bob).unwrap();
        assert_eq!(a1.expose(), a2.expose());
        assert_ne!(a1.expose(), b.expose());
    }

    #[test]
    fn secret_key_hashes_the_signature_under_the_ed25519_tag() {
        let signer = ConstantSigner(vec![5; 64]);
        let sk = derive_secret_key::<Fr>(&signer).unwrap();
        let expected: Fr = HashTranscript::new(b"ED25519|To|BLS12381|v1|")
            .append_bytes(&[5; 64])
            .challenge();
        assert_eq!(*sk.expose(), expected);
    }

    #[test]
    fn store_key_is_separated_from_secret_key() {
        let alice = Ed25519Capability::from_seed(&[1u8; 32]);
        let sk = derive_secret_key::<Fr>(&alice).unwrap();
        let kek = derive_store_key(&alice).unwrap();
        assert_ne!(crate::algebra::encoding::scalar_to_be_bytes(sk.expose()), kek.to_vec());
    }

    #[test]
    fn zero_scalar_is_rejected() {
        assert_eq!(
            SecretKey::new(Fr::zero()).unwrap_err().kind(),
            ErrorKind::InvalidSecret
        );
        assert!(derive_secret_key::<Fr>(&ConstantSigner(vec![9; 64])).is_ok());
    }

    #[test]
    fn secret_key_debug_hides_value() {
        let sk = SecretKey::new(Fr::from(42u64)).unwrap();
        assert_eq!(format!("{sk:?}"), "SecretKey(..)");
    }

    #[test]
    fn vkh_hex_round_trip() {
        let vkh = Vkh::of(&Ed25519Capability::from_seed(&[3u8; 32]));
        crate::test_utils::serde::assert_round_trip_eq(&vkh);
        assert_eq!(vkh.to_string().len(), 56);
    }
}
