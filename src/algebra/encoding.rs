use ark_ff::{BigInteger, PrimeField};

use super::group::GroupElement;
use crate::error::{ProtocolError, Result};

/// Decode a hex string, accepting an optional `0x` prefix.
pub fn decode_hex(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|err| ProtocolError::bad_encoding(format!("invalid hex: {err}")))
}

/// Byte width of a canonical scalar encoding.
pub fn scalar_len<F: PrimeField>() -> usize {
    F::MODULUS_BIT_SIZE.div_ceil(8) as usize
}

/// Fixed-width big-endian scalar encoding.
pub fn scalar_to_be_bytes<F: PrimeField>(value: &F) -> Vec<u8> {
    let bytes = value.into_bigint().to_bytes_be();
    let width = scalar_len::<F>();
    bytes[bytes.len().saturating_sub(width)..].to_vec()
}

/// Big-endian encoding with leading zero bytes stripped. Zero is the single
/// byte `00`, never an empty string.
pub fn scalar_to_minimal_be<F: PrimeField>(value: &F) -> Vec<u8> {
    let bytes = value.into_bigint().to_bytes_be();
    match bytes.iter().position(|b| *b != 0) {
        Some(start) => bytes[start..].to_vec(),
        None => vec![0],
    }
}

/// Strict big-endian scalar decoding.
///
/// Inputs longer than the canonical width are `BadEncoding`; values at or
/// above the modulus are `InvalidSecret` rather than silently reduced.
pub fn scalar_from_be_bytes<F: PrimeField>(bytes: &[u8]) -> Result<F> {
    let width = scalar_len::<F>();
    if bytes.len() > width {
        return Err(ProtocolError::bad_encoding(format!(
            "scalar is {} bytes, at most {width} allowed",
            bytes.len()
        )));
    }
    let value = F::from_be_bytes_mod_order(bytes);
    let mut padded = vec![0u8; width - bytes.len()];
    padded.extend_from_slice(bytes);
    if scalar_to_be_bytes(&value) != padded {
        return Err(ProtocolError::invalid_secret(
            "scalar is not reduced modulo the group order",
        ));
    }
    Ok(value)
}

pub fn scalar_to_hex<F: PrimeField>(value: &F) -> String {
    hex::encode(scalar_to_be_bytes(value))
}

pub fn scalar_from_hex<F: PrimeField>(value: &str) -> Result<F> {
    scalar_from_be_bytes(&decode_hex(value)?)
}

pub fn point_to_hex<P: GroupElement>(point: &P) -> String {
    hex::encode(point.to_bytes())
}

pub fn point_from_hex<P: GroupElement>(value: &str) -> Result<P> {
    P::from_bytes(&decode_hex(value)?)
}

/// Decimal rendering used by prover transports.
pub fn scalar_to_decimal<F: PrimeField>(value: &F) -> String {
    value.into_bigint().to_string()
}

pub fn scalar_from_decimal<F: PrimeField>(value: &str) -> Result<F> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::bad_encoding(format!(
            "not a decimal integer: {value:?}"
        )));
    }
    F::from_str(trimmed).map_err(|_| {
        ProtocolError::bad_encoding(format!("invalid decimal integer: {value}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ark_bls12_381::Fr;
    use ark_ff::{One, Zero};

    #[test]
    fn scalar_hex_is_fixed_width() {
        let hex = scalar_to_hex(&Fr::from(255u64));
        assert_eq!(hex.len(), 64);
        assert!(hex.ends_with("ff"));
        assert_eq!(scalar_from_hex::<Fr>(&format!("0x{hex}")).unwrap(), Fr::from(255u64));
    }

    #[test]
    fn minimal_encoding_strips_leading_zeros() {
        assert_eq!(scalar_to_minimal_be(&Fr::zero()), vec![0x00]);
        assert_eq!(scalar_to_minimal_be(&Fr::from(1u64)), vec![0x01]);
        assert_eq!(scalar_to_minimal_be(&Fr::from(0x0102u64)), vec![0x01, 0x02]);
    }

    #[test]
    fn rejects_unreduced_and_overlong_scalars() {
        let modulus = Fr::MODULUS.to_bytes_be();
        let err = scalar_from_be_bytes::<Fr>(&modulus).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSecret);

        let err = scalar_from_be_bytes::<Fr>(&[1u8; 33]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEncoding);
    }

    #[test]
    fn decimal_round_trip_and_rejection() {
        let minus_one = -Fr::one();
        let text = scalar_to_decimal(&minus_one);
        assert_eq!(scalar_from_decimal::<Fr>(&text).unwrap(), minus_one);
        assert!(scalar_from_decimal::<Fr>("12a").is_err());
        assert!(scalar_from_decimal::<Fr>("").is_err());
    }

    #[test]
    fn bad_hex_is_bad_encoding() {
        let err = decode_hex("zz").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEncoding);
    }
}
