use ark_ff::PrimeField;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

use crate::algebra::encoding::{point_from_hex, point_to_hex, scalar_from_hex, scalar_to_hex};
use crate::algebra::group::GroupElement;

/// Serde helpers for encoding group elements as compressed lowercase hex.
pub mod point {
    use super::*;

    pub fn serialize<P, S>(value: &P, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: GroupElement,
        S: Serializer,
    {
        serializer.serialize_str(&point_to_hex(value))
    }

    pub fn deserialize<'de, P, D>(deserializer: D) -> Result<P, D::Error>
    where
        P: GroupElement,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        point_from_hex(&s).map_err(DeError::custom)
    }
}

/// Serde helpers for scalars as fixed-width big-endian hex.
pub mod scalar {
    use super::*;

    pub fn serialize<F, S>(value: &F, serializer: S) -> Result<S::Ok, S::Error>
    where
        F: PrimeField,
        S: Serializer,
    {
        serializer.serialize_str(&scalar_to_hex(value))
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> Result<F, D::Error>
    where
        F: PrimeField,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        scalar_from_hex(&s).map_err(DeError::custom)
    }
}

/// Optional scalar; a missing field deserializes to `None` when combined with
/// `#[serde(default)]`.
pub mod option_scalar {
    use super::*;

    pub fn serialize<F, S>(value: &Option<F>, serializer: S) -> Result<S::Ok, S::Error>
    where
        F: PrimeField,
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&scalar_to_hex(v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> Result<Option<F>, D::Error>
    where
        F: PrimeField,
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| scalar_from_hex(&s).map_err(DeError::custom))
            .transpose()
    }
}

pub mod scalar_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<F, S>(values: &[F], serializer: S) -> Result<S::Ok, S::Error>
    where
        F: PrimeField,
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&scalar_to_hex(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, F, D>(deserializer: D) -> Result<Vec<F>, D::Error>
    where
        F: PrimeField,
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| scalar_from_hex(s).map_err(DeError::custom))
            .collect()
    }
}

/// Raw byte strings as lowercase hex.
pub mod bytes {
    use super::*;

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        crate::algebra::encoding::decode_hex(&s).map_err(DeError::custom)
    }
}
