//! Datum and redeemer encoding in the ledger's tagged-union data format.
//!
//! Constructor tags and field order are the wire contract with the on-chain
//! validators. Nothing here is type-checked against them, so the tests pin
//! the exact shapes.

use std::fmt::Write as _;

use ark_ff::PrimeField;

use super::{BidRecord, EncryptionRecord, ListingStatus, Timestamp, TokenId, Transaction};
use crate::algebra::encoding::{scalar_to_decimal, scalar_to_minimal_be};
use crate::algebra::group::{GroupElement, ProtocolGroup};
use crate::capsule::Capsule;
use crate::identity::{Register, Vkh};
use crate::level::{FullEncryptionLevel, HalfEncryptionLevel};
use crate::proofs::{BindingProof, SchnorrProof};
use crate::snark::SnarkProof;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlutusData {
    Constr {
        constructor: u64,
        fields: Vec<PlutusData>,
    },
    Bytes(Vec<u8>),
    /// Arbitrary-precision integer kept as its decimal digits.
    Int(String),
    List(Vec<PlutusData>),
}

impl PlutusData {
    pub fn constr(constructor: u64, fields: Vec<PlutusData>) -> Self {
        Self::Constr {
            constructor,
            fields,
        }
    }

    pub fn unit(constructor: u64) -> Self {
        Self::constr(constructor, Vec::new())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn point<P: GroupElement>(point: &P) -> Self {
        Self::Bytes(point.to_bytes())
    }

    /// Scalars inside proofs travel as minimal big-endian bytes.
    pub fn scalar_bytes<F: PrimeField>(value: &F) -> Self {
        Self::Bytes(scalar_to_minimal_be(value))
    }

    pub fn scalar_int<F: PrimeField>(value: &F) -> Self {
        Self::Int(scalar_to_decimal(value))
    }

    pub fn int(value: i64) -> Self {
        Self::Int(value.to_string())
    }

    pub fn token(token: &TokenId) -> Self {
        Self::bytes(token.as_bytes().to_vec())
    }

    pub fn vkh(vkh: &Vkh) -> Self {
        Self::bytes(vkh.as_bytes().to_vec())
    }

    /// `0[value]` for `Some`, `1[]` for `None`.
    pub fn option(value: Option<PlutusData>) -> Self {
        match value {
            Some(value) => Self::constr(0, vec![value]),
            None => Self::unit(1),
        }
    }

    /// Detailed JSON schema, e.g. `{"constructor":0,"fields":[{"int":1}]}`.
    ///
    /// Integers are emitted as bare JSON numbers of any length.
    pub fn to_json_string(&self) -> String {
        let mut out = String::new();
        self.write_json(&mut out);
        out
    }

    fn write_json(&self, out: &mut String) {
        match self {
            Self::Constr {
                constructor,
                fields,
            } => {
                let _ = write!(out, r#"{{"constructor":{constructor},"fields":"#);
                write_list(fields, out);
                out.push('}');
            }
            Self::Bytes(bytes) => {
                let _ = write!(out, r#"{{"bytes":"{}"}}"#, hex::encode(bytes));
            }
            Self::Int(digits) => {
                let _ = write!(out, r#"{{"int":{digits}}}"#);
            }
            Self::List(items) => {
                out.push_str(r#"{"list":"#);
                write_list(items, out);
                out.push('}');
            }
        }
    }

    /// Parsed view, for inspection and tests. Integers wider than `u64`
    /// become floats in `serde_json::Value`, so compare those as strings.
    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.to_json_string())
    }
}

fn write_list(items: &[PlutusData], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        item.write_json(out);
    }
    out.push(']');
}

/// Conversion into the ledger data format.
pub trait ToPlutusData {
    fn to_plutus_data(&self) -> PlutusData;
}

impl<G: ProtocolGroup> ToPlutusData for Register<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::point(&self.generator),
                PlutusData::point(&self.public_value),
            ],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for SchnorrProof<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![PlutusData::scalar_bytes(&self.z), PlutusData::point(&self.g_r)],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for BindingProof<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::scalar_bytes(&self.z_a),
                PlutusData::scalar_bytes(&self.z_r),
                PlutusData::point(&self.t1),
                PlutusData::point(&self.t2),
            ],
        )
    }
}

impl ToPlutusData for Capsule {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(self.nonce.clone()),
                PlutusData::bytes(self.aad.clone()),
                PlutusData::bytes(self.ciphertext.clone()),
            ],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for HalfEncryptionLevel<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::point(&self.r1),
                PlutusData::constr(0, vec![PlutusData::point(&self.r2_g1), PlutusData::unit(1)]),
                PlutusData::point(&self.r4),
            ],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for FullEncryptionLevel<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::point(&self.r1),
                PlutusData::constr(
                    0,
                    vec![
                        PlutusData::point(&self.r2_g1),
                        PlutusData::constr(0, vec![PlutusData::point(&self.r2_g2)]),
                    ],
                ),
                PlutusData::point(&self.r4),
            ],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for ListingStatus<G> {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Self::Open => PlutusData::unit(0),
            Self::Pending { public_inputs, ttl } => PlutusData::constr(
                1,
                vec![
                    PlutusData::List(public_inputs.iter().map(PlutusData::scalar_int).collect()),
                    PlutusData::int(*ttl),
                ],
            ),
        }
    }
}

impl<G: ProtocolGroup> ToPlutusData for EncryptionRecord<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::vkh(&self.owner_vkh),
                self.owner.to_plutus_data(),
                PlutusData::token(&self.token),
                self.half_level.to_plutus_data(),
                PlutusData::option(self.full_level.as_ref().map(ToPlutusData::to_plutus_data)),
                self.capsule.to_plutus_data(),
                self.status.to_plutus_data(),
            ],
        )
    }
}

impl<G: ProtocolGroup> ToPlutusData for BidRecord<G> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::vkh(&self.owner_vkh),
                self.owner.to_plutus_data(),
                PlutusData::token(&self.pointer),
                PlutusData::token(&self.token),
            ],
        )
    }
}

impl ToPlutusData for SnarkProof {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::bytes(self.pi_a.clone()),
                PlutusData::bytes(self.pi_b.clone()),
                PlutusData::bytes(self.pi_c.clone()),
                PlutusData::List(
                    self.commitments
                        .iter()
                        .map(|c| PlutusData::bytes(c.0.clone()))
                        .collect(),
                ),
                PlutusData::bytes(self.commitment_pok.clone()),
            ],
        )
    }
}

/// Spend redeemer of the encryption contract.
#[derive(Clone, Debug)]
pub enum EncryptionRedeemer<G: ProtocolGroup> {
    RemoveEncryption,
    UseSnark,
    UseEncryption {
        /// `[hk]G1`
        witness: G::G1,
        r5: G::G2,
        binding: BindingProof<G>,
        bid_token: TokenId,
    },
    CancelEncryption,
}

impl<G: ProtocolGroup> ToPlutusData for EncryptionRedeemer<G> {
    fn to_plutus_data(&self) -> PlutusData {
        match self {
            Self::RemoveEncryption => PlutusData::unit(0),
            Self::UseSnark => PlutusData::unit(1),
            Self::UseEncryption {
                witness,
                r5,
                binding,
                bid_token,
            } => PlutusData::constr(
                2,
                vec![
                    PlutusData::point(witness),
                    PlutusData::point(r5),
                    binding.to_plutus_data(),
                    PlutusData::token(bid_token),
                ],
            ),
            Self::CancelEncryption => PlutusData::unit(3),
        }
    }
}

/// Withdraw redeemer carrying the proof that moves a listing to `Pending`.
#[derive(Clone, Debug)]
pub struct WithdrawRedeemer<'a, F: PrimeField> {
    pub proof: &'a SnarkProof,
    pub public_inputs: &'a [F],
    pub commitment_wires: &'a [F],
    pub ttl: Timestamp,
}

impl<F: PrimeField> ToPlutusData for WithdrawRedeemer<'_, F> {
    fn to_plutus_data(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                self.proof.to_plutus_data(),
                PlutusData::List(self.public_inputs.iter().map(PlutusData::scalar_int).collect()),
                PlutusData::List(
                    self.commitment_wires
                        .iter()
                        .map(PlutusData::scalar_int)
                        .collect(),
                ),
                PlutusData::int(self.ttl),
            ],
        )
    }
}

/// Script a redeemer is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedeemerPurpose {
    /// Spend of the listing's encryption output.
    Spend,
    /// Zero-amount withdrawal that runs the proof check.
    Withdraw,
}

impl RedeemerPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spend => "spend",
            Self::Withdraw => "withdraw",
        }
    }
}

/// Redeemers the encryption validator and the proof-checking withdrawal see
/// for `tx`. Listing creation and bids only mint, so they carry none here.
pub fn redeemers<G: ProtocolGroup>(tx: &Transaction<G>) -> Vec<(RedeemerPurpose, PlutusData)> {
    match tx {
        Transaction::CreateListing { .. }
        | Transaction::PlaceBid { .. }
        | Transaction::RemoveBid { .. } => Vec::new(),
        Transaction::RemoveListing { .. } => vec![(
            RedeemerPurpose::Spend,
            EncryptionRedeemer::<G>::RemoveEncryption.to_plutus_data(),
        )],
        Transaction::UseSnark {
            proof,
            public_inputs,
            commitment_wires,
            ttl,
            ..
        } => vec![
            (
                RedeemerPurpose::Spend,
                EncryptionRedeemer::<G>::UseSnark.to_plutus_data(),
            ),
            (
                RedeemerPurpose::Withdraw,
                WithdrawRedeemer {
                    proof,
                    public_inputs,
                    commitment_wires,
                    ttl: *ttl,
                }
                .to_plutus_data(),
            ),
        ],
        Transaction::UseEncryption { bid, artifacts, .. } => vec![(
            RedeemerPurpose::Spend,
            EncryptionRedeemer::<G>::UseEncryption {
                witness: artifacts.witness.w0,
                r5: artifacts.r5,
                binding: artifacts.binding,
                bid_token: *bid,
            }
            .to_plutus_data(),
        )],
        Transaction::CancelEncryption { .. } => vec![(
            RedeemerPurpose::Spend,
            EncryptionRedeemer::<G>::CancelEncryption.to_plutus_data(),
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bls12;
    use crate::identity::SecretKey;
    use crate::level::{build_level, LevelKind, LevelSecrets};
    use crate::test_utils::test_rng;
    use ark_bls12_381::Fr;
    use serde_json::json;

    fn fields(data: &PlutusData) -> &[PlutusData] {
        match data {
            PlutusData::Constr { fields, .. } => fields,
            other => panic!("expected constructor, got {other:?}"),
        }
    }

    fn tag(data: &PlutusData) -> u64 {
        match data {
            PlutusData::Constr { constructor, .. } => *constructor,
            other => panic!("expected constructor, got {other:?}"),
        }
    }

    #[test]
    fn detailed_json_shape() {
        let data = PlutusData::constr(
            1,
            vec![
                PlutusData::bytes(vec![0xab, 0x01]),
                PlutusData::List(vec![PlutusData::int(-3)]),
                PlutusData::scalar_int(&(-Fr::from(1u64))),
            ],
        );
        let text = data.to_json_string();
        assert_eq!(text, r#"{"constructor":1,"fields":[{"bytes":"ab01"},{"list":[{"int":-3}]},{"int":52435875175126190479447740508185965837690552500527637822603658699938581184512}]}"#);
        let value = PlutusData::unit(3).to_json_value().unwrap();
        assert_eq!(value, json!({"constructor": 3, "fields": []}));
        assert_eq!(PlutusData::scalar_bytes(&Fr::from(0u64)).to_json_string(), r#"{"bytes":"00"}"#);
    }

    #[test]
    fn level_field_order() {
        let mut rng = test_rng(30);
        let sk = SecretKey::new(Fr::from(77u64)).unwrap();
        let register = Register::<Bls12>::canonical(&sk).unwrap();
        let token = TokenId::new([3u8; 32]);
        let built = build_level(
            &LevelSecrets::random(&mut rng),
            &register,
            &token,
            LevelKind::Genesis,
            &mut rng,
        )
        .unwrap();

        let half = built.level.to_plutus_data();
        let half_fields = fields(&half);
        assert_eq!(half_fields[0], PlutusData::point(&built.level.r1));
        assert_eq!(
            half_fields[1],
            PlutusData::constr(0, vec![PlutusData::point(&built.level.r2_g1), PlutusData::unit(1)])
        );
        assert_eq!(half_fields[2], PlutusData::point(&built.level.r4));

        let r5 = Bls12::g2_generator();
        let full = FullEncryptionLevel::complete(&built.level, r5).to_plutus_data();
        let inner = fields(&fields(&full)[1])[1].clone();
        assert_eq!(inner, PlutusData::constr(0, vec![PlutusData::point(&r5)]));

        let binding = built.binding.to_plutus_data();
        assert_eq!(fields(&binding)[0], PlutusData::scalar_bytes(&built.binding.z_a));
        assert_eq!(fields(&binding)[3], PlutusData::point(&built.binding.t2));
    }

    #[test]
    fn status_and_redeemer_tags() {
        let pending = ListingStatus::<Bls12>::Pending {
            public_inputs: vec![Fr::from(5u64), Fr::from(6u64)],
            ttl: 1_700_000_000_000,
        };
        assert_eq!(
            pending.to_plutus_data().to_json_value().unwrap(),
            json!({"constructor": 1, "fields": [
                {"list": [{"int": 5}, {"int": 6}]},
                {"int": 1_700_000_000_000i64}
            ]})
        );
        assert_eq!(tag(&ListingStatus::<Bls12>::Open.to_plutus_data()), 0);

        assert_eq!(tag(&EncryptionRedeemer::<Bls12>::RemoveEncryption.to_plutus_data()), 0);
        assert_eq!(tag(&EncryptionRedeemer::<Bls12>::UseSnark.to_plutus_data()), 1);
        assert_eq!(tag(&EncryptionRedeemer::<Bls12>::CancelEncryption.to_plutus_data()), 3);
    }

    #[test]
    fn withdraw_redeemer_carries_inputs_and_ttl() {
        let g1 = Bls12::g1_generator().to_bytes();
        let proof = SnarkProof {
            pi_a: g1.clone(),
            pi_b: Bls12::g2_generator().to_bytes(),
            pi_c: g1,
            commitments: Vec::new(),
            commitment_pok: Vec::new(),
        };
        let inputs: Vec<Fr> = (1..=36u64).map(Fr::from).collect();
        let redeemer = WithdrawRedeemer {
            proof: &proof,
            public_inputs: &inputs,
            commitment_wires: &[],
            ttl: 42,
        }
        .to_plutus_data();

        let top = fields(&redeemer);
        assert_eq!(top.len(), 4);
        assert_eq!(fields(&top[0]).len(), 5);
        assert_eq!(fields(&top[0])[3], PlutusData::List(Vec::new()));
        match &top[1] {
            PlutusData::List(items) => {
                assert_eq!(items.len(), 36);
                assert_eq!(items[0], PlutusData::Int("1".into()));
            }
            other => panic!("expected list, got {other:?}"),
        }
        assert_eq!(top[3], PlutusData::int(42));
    }

    #[test]
    fn proof_transaction_carries_spend_and_withdraw_redeemers() {
        let g1 = Bls12::g1_generator().to_bytes();
        let proof = SnarkProof {
            pi_a: g1.clone(),
            pi_b: Bls12::g2_generator().to_bytes(),
            pi_c: g1,
            commitments: Vec::new(),
            commitment_pok: Vec::new(),
        };
        let inputs: Vec<Fr> = (1..=36u64).map(Fr::from).collect();
        let tx = Transaction::<Bls12>::UseSnark {
            token: TokenId::new([1u8; 32]),
            bid: TokenId::new([2u8; 32]),
            proof: proof.clone(),
            public_inputs: inputs.clone(),
            commitment_wires: Vec::new(),
            ttl: 99,
        };

        let attached = redeemers(&tx);
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0], (RedeemerPurpose::Spend, PlutusData::unit(1)));
        let withdraw = WithdrawRedeemer {
            proof: &proof,
            public_inputs: &inputs,
            commitment_wires: &[],
            ttl: 99,
        }
        .to_plutus_data();
        assert_eq!(attached[1], (RedeemerPurpose::Withdraw, withdraw));

        let cancel = Transaction::<Bls12>::CancelEncryption {
            token: TokenId::new([1u8; 32]),
        };
        assert_eq!(redeemers(&cancel), vec![(RedeemerPurpose::Spend, PlutusData::unit(3))]);
        assert_eq!(RedeemerPurpose::Withdraw.as_str(), "withdraw");
    }
}
