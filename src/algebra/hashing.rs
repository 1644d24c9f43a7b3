use ark_ff::PrimeField;
use blake2b_simd::{Params, State};

use super::group::GroupElement;

/// Output length of every transcript digest.
pub const DIGEST_LEN: usize = 32;

/// BLAKE2b-256 over a single byte string.
pub fn blake2b_256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(Params::new().hash_length(DIGEST_LEN).hash(data).as_bytes());
    out
}

/// Interpret a digest as a big-endian integer reduced into the scalar field.
pub fn scalar_from_digest<F: PrimeField>(digest: &[u8]) -> F {
    F::from_be_bytes_mod_order(digest)
}

/// Incremental Fiat-Shamir transcript.
///
/// The transcript is the plain concatenation `tag || part_1 || ... || part_n`
/// with no length framing: every part is a fixed-length point encoding or a
/// 32-byte token id, so the layout is already unambiguous and matches what the
/// on-chain validator hashes.
#[derive(Clone)]
pub struct HashTranscript {
    state: State,
}

impl HashTranscript {
    pub fn new(tag: &[u8]) -> Self {
        let mut state = Params::new().hash_length(DIGEST_LEN).to_state();
        state.update(tag);
        Self { state }
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.state.update(bytes);
        self
    }

    pub fn append_point<P: GroupElement>(&mut self, point: &P) -> &mut Self {
        self.state.update(&point.to_bytes());
        self
    }

    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(self.state.finalize().as_bytes());
        out
    }

    /// Squeeze the transcript into a scalar challenge.
    pub fn challenge<F: PrimeField>(&self) -> F {
        scalar_from_digest(&self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_bls12_381::Fr;

    #[test]
    fn empty_input_matches_reference_digest() {
        assert_eq!(
            hex::encode(blake2b_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }

    #[test]
    fn transcript_is_plain_concatenation() {
        let mut transcript = HashTranscript::new(b"TAG|");
        transcript.append_bytes(b"left").append_bytes(b"right");
        assert_eq!(transcript.digest(), blake2b_256(b"TAG|leftright"));
    }

    #[test]
    fn challenge_reduces_digest_big_endian() {
        let transcript = HashTranscript::new(b"x");
        let digest = transcript.digest();
        let expected = Fr::from_be_bytes_mod_order(&digest);
        assert_eq!(transcript.challenge::<Fr>(), expected);
    }
}
