//! ECIES-style AEAD envelope around the listed payload.
//!
//! The symmetric key is HKDF-SHA3-256 over the genesis hop key, salted and
//! bound to the genesis `r1`. Re-encryption never touches the capsule; only
//! the level chain that leads back to its key changes hands.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ark_ff::PrimeField;
use hkdf::Hkdf;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;
use zeroize::Zeroizing;

use crate::algebra::constants::{AAD_DOMAIN_TAG, KEM_DOMAIN_TAG, MSG_DOMAIN_TAG, SLT_DOMAIN_TAG};
use crate::algebra::encoding::scalar_to_be_bytes;
use crate::algebra::group::GroupElement;
use crate::algebra::hashing::HashTranscript;
use crate::error::{ProtocolError, Result};

const LOG_TARGET: &str = "peace_protocol::capsule";

pub const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capsule {
    #[serde(with = "crate::crypto_serde::bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::crypto_serde::bytes")]
    pub aad: Vec<u8>,
    /// Ciphertext with the GCM tag appended.
    #[serde(with = "crate::crypto_serde::bytes")]
    pub ciphertext: Vec<u8>,
}

fn context_aad(context: &[u8]) -> Vec<u8> {
    HashTranscript::new(AAD_DOMAIN_TAG)
        .append_bytes(context)
        .append_bytes(MSG_DOMAIN_TAG)
        .digest()
        .to_vec()
}

fn cipher<F: PrimeField>(kem: &F, context: &[u8]) -> Result<Aes256Gcm> {
    let salt = HashTranscript::new(SLT_DOMAIN_TAG)
        .append_bytes(context)
        .append_bytes(KEM_DOMAIN_TAG)
        .digest();
    let ikm = Zeroizing::new(scalar_to_be_bytes(kem));
    let hkdf = Hkdf::<Sha3_256>::new(Some(&salt[..]), &ikm);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(KEM_DOMAIN_TAG, &mut key[..])
        .map_err(|err| ProtocolError::bad_encoding(format!("hkdf expand failed: {err}")))?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..])))
}

impl Capsule {
    /// Encrypt `plaintext` under `kem`, binding it to `context` (the genesis
    /// `r1` point).
    pub fn seal<F, P, R>(kem: &F, context: &P, plaintext: &[u8], rng: &mut R) -> Result<Self>
    where
        F: PrimeField,
        P: GroupElement,
        R: Rng + ?Sized,
    {
        let context = context.to_bytes();
        let aad = context_aad(&context);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let ciphertext = cipher(kem, &context)?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| ProtocolError::bad_encoding("capsule encryption failed"))?;

        tracing::debug!(target: LOG_TARGET, len = plaintext.len(), "sealed capsule");
        Ok(Self {
            nonce: nonce.to_vec(),
            aad,
            ciphertext,
        })
    }

    /// Decrypt with the recovered key. A wrong key, context or tampered field
    /// fails authentication and surfaces as `BadEncoding`.
    pub fn open<F, P>(&self, kem: &F, context: &P) -> Result<Vec<u8>>
    where
        F: PrimeField,
        P: GroupElement,
    {
        if self.nonce.len() != NONCE_LEN {
            return Err(ProtocolError::bad_encoding(format!(
                "capsule nonce must be {NONCE_LEN} bytes, got {}",
                self.nonce.len()
            )));
        }
        let context = context.to_bytes();
        cipher(kem, &context)?
            .decrypt(
                Nonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: &self.aad,
                },
            )
            .map_err(|_| ProtocolError::bad_encoding("capsule authentication failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Bls12, ProtocolGroup};
    use crate::error::ErrorKind;
    use crate::test_utils::test_rng;
    use ark_bls12_381::Fr;

    #[test]
    fn seal_then_open() {
        let mut rng = test_rng(8);
        let kem = Fr::from(123_456u64);
        let context = Bls12::g1_generator() * Fr::from(5u64);
        let capsule = Capsule::seal(&kem, &context, b"a secret worth selling", &mut rng).unwrap();
        assert_eq!(capsule.nonce.len(), NONCE_LEN);
        assert_eq!(capsule.aad.len(), 32);
        assert_eq!(capsule.open(&kem, &context).unwrap(), b"a secret worth selling");
    }

    #[test]
    fn wrong_key_context_or_aad_fails() {
        let mut rng = test_rng(9);
        let kem = Fr::from(7u64);
        let context = Bls12::g1_generator();
        let capsule = Capsule::seal(&kem, &context, b"payload", &mut rng).unwrap();

        let err = capsule.open(&Fr::from(8u64), &context).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEncoding);
        assert!(capsule.open(&kem, &(context + context)).is_err());

        let mut tampered = capsule.clone();
        tampered.aad[0] ^= 1;
        assert!(tampered.open(&kem, &context).is_err());
    }
}
