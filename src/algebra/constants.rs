//! Domain-separation tags and fixed public generators.
//!
//! Every hash-to-scalar call site owns a distinct tag. Two call sites that
//! hash the same bytes for different purposes must never share one.

/// Secret-key derivation from an external signature.
pub const KEY_DOMAIN_TAG: &[u8] = b"ED25519|To|BLS12381|v1|";
/// Message the signing capability signs to seed the secret key.
pub const KEY_DERIVATION_MESSAGE: &[u8] = b"PEACE|KEY|v1";
/// Schnorr proof-of-knowledge challenge.
pub const SCHNORR_DOMAIN_TAG: &[u8] = b"SCHNORR|PROOF|v1|";
/// Binding proof challenge.
pub const BINDING_DOMAIN_TAG: &[u8] = b"BINDING|PROOF|v1|";
/// Level coefficient derived from `r1` alone.
pub const H2I_A_DOMAIN_TAG: &[u8] = b"HASH|To|Int|A|v1|";
/// Level coefficient derived from `r1 || r2_g1 || token_id`.
pub const H2I_DOMAIN_TAG: &[u8] = b"HASH|To|Int|v1|";
/// Folded into the hop hash as a trailing field element.
pub const F12_DOMAIN_TAG: &[u8] = b"F12|To|Hex|v1|";

pub const SLT_DOMAIN_TAG: &[u8] = b"SLT|ECIES|AES-GCM|v1|";
pub const KEM_DOMAIN_TAG: &[u8] = b"KEM|ECIES|AES-GCM|v1|";
pub const AAD_DOMAIN_TAG: &[u8] = b"AAD|ECIES|AES-GCM|v1|";
pub const MSG_DOMAIN_TAG: &[u8] = b"MSG|ECIES|AES-GCM|v1|";

/// Key-encryption key for secrets at rest.
pub const STORE_DOMAIN_TAG: &[u8] = b"STORE|SECRETS|AES-GCM|v1|";
pub const STORE_KEY_MESSAGE: &[u8] = b"PEACE|SECRETS|v1";

// Compressed BLS12-381 G2 points.
pub const H0_HEX: &str = "a5acbe8bdb762cf7b4bfa9171b9ffa23b6ed710b290280b271a0258e285354aac338bb9e5a9ee41b4454e4c410f40eea16c82b493986bfc754aa789e1408b2b526f8b92e9ddcd4eee1a6c4daa84d561a6ceb452afc4559fe81a1c7f3f26715db";
pub const H1_HEX: &str = "a1dcce801cd2950dcad45faa854382bbe39f5f84d1855ed4ad2d5d2a8e94b67b2d126fbafbcd1a4f15b82f793f5c8cc80d5638f2260b3e3d0c3bcf1b45f7cc0f72f5a8d7a6d6e6615f7d72ab7e70dcbb56d1fefdb72c65f7bc5f073373cc99a7";
pub const H2_HEX: &str = "a8a54abec2b6379d1aa238de61a783f704255e14cd02c8385e9bb2e648e33ea9fc271a62ff5669defdc59cfee7414102180a831c7be88ea85bc81e0ec3a929bf63766ede414ee0aac2b66a3e7e20c631453aa11aa20eb7945349e4df933dc7dd";
pub const H3_HEX: &str = "872fd1490d93c0895b3dd1cef1874eca2457b1615e0a5a9cee4ddf14da09a0d51987ce3806d2e87f33139b261ee26ce00e71c41a7c75c158896db6a477e8b4b10b40bda60f8a0a7e0aa7e2a3b3652c9000508a15a24c9f5b3c4cfb84ef72c9a6";
