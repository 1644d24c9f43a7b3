//! The contract with the external hop prover: what it is asked, what it
//! returns, and the public-input layout both sides must agree on.

use std::fmt;

use ark_bls12_381::{Bls12_381, G1Affine, G2Affine};
use ark_ff::{One, PrimeField};
use ark_groth16::Proof;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::algebra::encoding::{decode_hex, scalar_from_decimal, scalar_to_decimal};
use crate::algebra::group::{public_input_len, GroupElement, ProtocolGroup};
use crate::algebra::hop_key;
use crate::error::{ProtocolError, Result};

const LOG_TARGET: &str = "peace_protocol::snark";

/// Witness points of a hop: `W0 = [hk]G1` and `W1 = [a0]G1 + [r0]V`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HopWitness<G: ProtocolGroup> {
    pub hk: G::Scalar,
    pub w0: G::G1,
    pub w1: G::G1,
}

impl<G: ProtocolGroup> HopWitness<G> {
    pub fn compute(a0: &G::Scalar, r0: &G::Scalar, v: &G::G1) -> Self {
        Self::with_hop_key(hop_key::<G>(a0), a0, r0, v)
    }

    /// Same as [`HopWitness::compute`] with `hk` already known.
    pub fn with_hop_key(hk: G::Scalar, a0: &G::Scalar, r0: &G::Scalar, v: &G::G1) -> Self {
        let g = G::g1_generator();
        Self {
            hk,
            w0: g * hk,
            w1: g * *a0 + *v * *r0,
        }
    }

    pub fn public_inputs(&self, v: &G::G1) -> Vec<G::Scalar> {
        public_inputs::<G>(v, &self.w0, &self.w1)
    }
}

/// Limbs of `V`, `W0`, `W1` in circuit order.
pub fn public_inputs<G: ProtocolGroup>(v: &G::G1, w0: &G::G1, w1: &G::G1) -> Vec<G::Scalar> {
    let mut out = Vec::with_capacity(public_input_len::<G>());
    for point in [v, w0, w1] {
        out.extend(G::snark_limbs(point));
    }
    out
}

/// Drop the constant `1` a prover places in front of its public inputs.
/// Anything but `[1, x_1..x_n]` with exactly `expected` trailing entries is a
/// `ProofInputMismatch`.
pub fn strip_leading_one<F: PrimeField>(raw: &[F], expected: usize) -> Result<Vec<F>> {
    match raw.split_first() {
        Some((first, rest)) if first.is_one() && rest.len() == expected => Ok(rest.to_vec()),
        Some((first, rest)) if first.is_one() => Err(ProtocolError::mismatch(format!(
            "prover returned {} public inputs, expected {expected}",
            rest.len()
        ))),
        _ => Err(ProtocolError::mismatch(
            "prover public inputs do not start with the constant 1",
        )),
    }
}

/// What the external prover consumes.
#[derive(Clone)]
pub struct ProverRequest<G: ProtocolGroup> {
    pub a0: G::Scalar,
    pub r0: G::Scalar,
    pub v: G::G1,
    pub w0: G::G1,
    pub w1: G::G1,
}

impl<G: ProtocolGroup> fmt::Debug for ProverRequest<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProverRequest")
            .field("v", &self.v)
            .field("w0", &self.w0)
            .field("w1", &self.w1)
            .finish_non_exhaustive()
    }
}

/// Proof points as compressed bytes, plus gnark's optional commitment
/// extension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkProof {
    #[serde(with = "crate::crypto_serde::bytes")]
    pub pi_a: Vec<u8>,
    #[serde(with = "crate::crypto_serde::bytes")]
    pub pi_b: Vec<u8>,
    #[serde(with = "crate::crypto_serde::bytes")]
    pub pi_c: Vec<u8>,
    #[serde(default)]
    pub commitments: Vec<HexBytes>,
    #[serde(default, with = "crate::crypto_serde::bytes")]
    pub commitment_pok: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HexBytes(#[serde(with = "crate::crypto_serde::bytes")] pub Vec<u8>);

impl SnarkProof {
    pub fn from_ark(proof: &Proof<Bls12_381>) -> Result<Self> {
        fn compressed<T: CanonicalSerialize>(value: &T) -> Result<Vec<u8>> {
            let mut buf = Vec::new();
            value
                .serialize_compressed(&mut buf)
                .map_err(|err| ProtocolError::bad_encoding(format!("proof point: {err}")))?;
            Ok(buf)
        }
        Ok(Self {
            pi_a: compressed(&proof.a)?,
            pi_b: compressed(&proof.b)?,
            pi_c: compressed(&proof.c)?,
            commitments: Vec::new(),
            commitment_pok: Vec::new(),
        })
    }

    /// Plain Groth16 view. Proofs carrying commitments have no such view.
    pub fn to_ark(&self) -> Result<Proof<Bls12_381>> {
        if !self.commitments.is_empty() || !self.commitment_pok.is_empty() {
            return Err(ProtocolError::bad_encoding(
                "proof carries commitments and is not a plain Groth16 proof",
            ));
        }
        let decode_err = |what: &str| {
            let what = what.to_string();
            move |err: ark_serialize::SerializationError| {
                ProtocolError::bad_encoding(format!("invalid {what}: {err}"))
            }
        };
        Ok(Proof {
            a: G1Affine::deserialize_compressed(&self.pi_a[..]).map_err(decode_err("piA"))?,
            b: G2Affine::deserialize_compressed(&self.pi_b[..]).map_err(decode_err("piB"))?,
            c: G1Affine::deserialize_compressed(&self.pi_c[..]).map_err(decode_err("piC"))?,
        })
    }
}

/// A prover's answer: the proof, its raw public inputs (leading `1`
/// included) and the commitment wires gnark appends when commitments are used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalProof<F: PrimeField> {
    pub proof: SnarkProof,
    pub raw_inputs: Vec<F>,
    pub commitment_wires: Vec<F>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GnarkProofJson {
    pi_a: String,
    pi_b: String,
    pi_c: String,
    #[serde(default)]
    commitments: Vec<String>,
    #[serde(default)]
    commitment_pok: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GnarkPublicJson {
    inputs: Vec<String>,
    #[serde(default)]
    commitment_wire: Option<String>,
}

impl<F: PrimeField> ExternalProof<F> {
    /// Parse gnark's `proof.json` and `public.json` exports.
    pub fn from_gnark_json(proof_json: &str, public_json: &str) -> Result<Self> {
        let proof: GnarkProofJson = serde_json::from_str(proof_json)
            .map_err(|err| ProtocolError::bad_encoding(format!("proof json: {err}")))?;
        let public: GnarkPublicJson = serde_json::from_str(public_json)
            .map_err(|err| ProtocolError::bad_encoding(format!("public json: {err}")))?;

        let commitment_pok = if proof.commitment_pok.is_empty() {
            Vec::new()
        } else {
            decode_hex(&proof.commitment_pok)?
        };
        let proof = SnarkProof {
            pi_a: decode_hex(&proof.pi_a)?,
            pi_b: decode_hex(&proof.pi_b)?,
            pi_c: decode_hex(&proof.pi_c)?,
            commitments: proof
                .commitments
                .iter()
                .map(|c| decode_hex(c).map(HexBytes))
                .collect::<Result<_>>()?,
            commitment_pok,
        };
        let raw_inputs = public
            .inputs
            .iter()
            .map(|s| scalar_from_decimal(s))
            .collect::<Result<Vec<F>>>()?;
        let commitment_wires = public
            .commitment_wire
            .iter()
            .map(|s| scalar_from_decimal(s))
            .collect::<Result<Vec<F>>>()?;

        Ok(Self {
            proof,
            raw_inputs,
            commitment_wires,
        })
    }

    /// gnark's `public.json` rendering of the raw inputs.
    pub fn public_json(&self) -> serde_json::Value {
        let inputs: Vec<String> = self.raw_inputs.iter().map(scalar_to_decimal).collect();
        match self.commitment_wires.first() {
            Some(wire) => serde_json::json!({
                "inputs": inputs,
                "commitmentWire": scalar_to_decimal(wire),
            }),
            None => serde_json::json!({ "inputs": inputs }),
        }
    }
}

/// Progress reports from a long-running proof.
pub trait ProgressSink: Send + Sync {
    /// `fraction` is in `[0, 1]`.
    fn report(&self, fraction: f32, stage: &str);
}

/// Discards progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _fraction: f32, _stage: &str) {}
}

/// Forwards progress into the tracing stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, fraction: f32, stage: &str) {
        tracing::info!(target: LOG_TARGET, fraction, stage, "proof progress");
    }
}

/// The external prover. Proof generation is one opaque asynchronous step
/// with no partial results.
#[async_trait]
pub trait SnarkProver<G: ProtocolGroup>: Send + Sync {
    async fn prove(
        &self,
        request: &ProverRequest<G>,
        progress: &dyn ProgressSink,
    ) -> Result<ExternalProof<G::Scalar>>;
}

/// Prover stand-in that echoes the public inputs of the request behind a
/// placeholder proof. The ledger stand-in does not verify Groth16.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoProver {
    /// Corrupt the last public input, to exercise mismatch handling.
    pub tamper: bool,
}

#[async_trait]
impl<G: ProtocolGroup> SnarkProver<G> for EchoProver {
    async fn prove(
        &self,
        request: &ProverRequest<G>,
        progress: &dyn ProgressSink,
    ) -> Result<ExternalProof<G::Scalar>> {
        progress.report(0.0, "witness");
        let mut raw_inputs = vec![G::Scalar::one()];
        raw_inputs.extend(public_inputs::<G>(&request.v, &request.w0, &request.w1));
        if self.tamper {
            if let Some(last) = raw_inputs.last_mut() {
                *last += G::Scalar::one();
            }
        }
        progress.report(1.0, "done");

        Ok(ExternalProof {
            proof: SnarkProof {
                pi_a: G::g1_generator().to_bytes(),
                pi_b: G::g2_generator().to_bytes(),
                pi_c: G::g1_generator().to_bytes(),
                commitments: Vec::new(),
                commitment_pok: Vec::new(),
            },
            raw_inputs,
            commitment_wires: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bls12;
    use crate::error::ErrorKind;
    use ark_bls12_381::Fr;
    use ark_ec::CurveGroup;
    use ark_ff::Zero;

    fn witness() -> (Fr, Fr, <Bls12 as ProtocolGroup>::G1, HopWitness<Bls12>) {
        let a0 = Fr::from(17u64);
        let r0 = Fr::from(29u64);
        let v = Bls12::g1_generator() * Fr::from(41u64);
        (a0, r0, v, HopWitness::compute(&a0, &r0, &v))
    }

    #[test]
    fn witness_recomputes_bit_identically() {
        let (a0, r0, v, first) = witness();
        let again = HopWitness::<Bls12>::compute(&a0, &r0, &v);
        assert_eq!(first.w0.to_bytes(), again.w0.to_bytes());
        assert_eq!(first.w1.to_bytes(), again.w1.to_bytes());
        assert_eq!(first.public_inputs(&v), again.public_inputs(&v));
        assert_eq!(first.w0, Bls12::g1_generator() * hop_key::<Bls12>(&a0));
    }

    #[test]
    fn public_input_order_is_v_w0_w1() {
        let (_, _, v, w) = witness();
        let inputs = w.public_inputs(&v);
        assert_eq!(inputs.len(), 36);
        assert_eq!(&inputs[..12], Bls12::snark_limbs(&v).as_slice());
        assert_eq!(&inputs[12..24], Bls12::snark_limbs(&w.w0).as_slice());
        assert_eq!(&inputs[24..], Bls12::snark_limbs(&w.w1).as_slice());
        let x = v.into_affine().x;
        assert_eq!(inputs[0], Fr::from(x.into_bigint().0[0]));
    }

    #[tokio::test]
    async fn echoed_inputs_strip_to_computed_vector() {
        let (a0, r0, v, w) = witness();
        let request = ProverRequest::<Bls12> { a0, r0, v, w0: w.w0, w1: w.w1 };
        let external = EchoProver::default().prove(&request, &NoProgress).await.unwrap();
        assert_eq!(external.raw_inputs.len(), 37);
        let stripped = strip_leading_one(&external.raw_inputs, 36).unwrap();
        assert_eq!(stripped, w.public_inputs(&v));
    }

    #[test]
    fn strip_rejects_missing_one_and_wrong_length() {
        let inputs: Vec<Fr> = (0..36).map(|i| Fr::from(i as u64 + 2)).collect();
        let err = strip_leading_one(&inputs, 36).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProofInputMismatch);

        let mut short = vec![Fr::one()];
        short.extend_from_slice(&inputs[..35]);
        assert!(strip_leading_one(&short, 36).is_err());
        assert!(strip_leading_one::<Fr>(&[], 36).is_err());
        assert!(strip_leading_one(&[Fr::zero()], 0).is_err());
    }

    #[test]
    fn parses_gnark_exports() {
        let g1 = hex::encode(Bls12::g1_generator().to_bytes());
        let g2 = hex::encode(Bls12::g2_generator().to_bytes());
        let proof_json = format!(r#"{{"piA":"{g1}","piB":"{g2}","piC":"{g1}"}}"#);
        let public_json = r#"{"inputs":["1","2","3"]}"#;

        let external = ExternalProof::<Fr>::from_gnark_json(&proof_json, public_json).unwrap();
        assert_eq!(external.raw_inputs, vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)]);
        assert!(external.commitment_wires.is_empty());
        let ark = external.proof.to_ark().unwrap();
        assert_eq!(SnarkProof::from_ark(&ark).unwrap(), external.proof);
        assert_eq!(external.public_json()["inputs"][1], "2");
    }

    #[test]
    fn commitment_proofs_have_no_plain_groth16_view() {
        let g1 = hex::encode(Bls12::g1_generator().to_bytes());
        let g2 = hex::encode(Bls12::g2_generator().to_bytes());
        let proof_json = format!(
            r#"{{"piA":"{g1}","piB":"{g2}","piC":"{g1}","commitments":["{g1}"],"commitmentPok":"{g1}"}}"#
        );
        let public_json = r#"{"inputs":["1"],"commitmentWire":"99"}"#;
        let external = ExternalProof::<Fr>::from_gnark_json(&proof_json, public_json).unwrap();
        assert_eq!(external.commitment_wires, vec![Fr::from(99u64)]);
        assert_eq!(external.proof.commitments.len(), 1);
        assert!(external.proof.to_ark().is_err());
    }
}
