use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::identity::{derive_store_key, SigningCapability};
use crate::store::{FileSecretStore, SecretRecord};

pub const DEFAULT_SECRETS_DIR: &str = ".peace/secrets";

/// Twenty minutes, in milliseconds.
pub const DEFAULT_PROOF_TTL_MS: i64 = 20 * 60 * 1000;

/// Local settings of a protocol client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Root of the per-role secret directories.
    pub secrets_dir: PathBuf,
    /// Validity window granted to a submitted hop proof.
    pub proof_ttl_ms: i64,
    /// Seal stored secrets under a key derived from the signing capability.
    pub encrypt_store: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            secrets_dir: PathBuf::from(DEFAULT_SECRETS_DIR),
            proof_ttl_ms: DEFAULT_PROOF_TTL_MS,
            encrypt_store: true,
        }
    }
}

impl ProtocolConfig {
    /// Open the file store for one secret family under `secrets_dir`.
    pub fn open_store<R: SecretRecord>(
        &self,
        signer: &dyn SigningCapability,
    ) -> Result<Arc<FileSecretStore<R>>> {
        let store = if self.encrypt_store {
            FileSecretStore::open_encrypted(&self.secrets_dir, derive_store_key(signer)?)?
        } else {
            FileSecretStore::open(&self.secrets_dir)?
        };
        Ok(Arc::new(store))
    }

    pub fn validate(&self) -> Result<()> {
        if self.proof_ttl_ms <= 0 {
            return Err(ProtocolError::bad_encoding(format!(
                "proof ttl must be positive, got {}",
                self.proof_ttl_ms
            )));
        }
        Ok(())
    }
}
