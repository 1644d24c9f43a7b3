//! Durable per-role secret storage.
//!
//! One generic keyed store serves every secret family; each family picks its
//! own key space through [`SecretRecord::ROLE`]. `put` returns only once the
//! record is durable, which is what lets callers persist secrets before they
//! submit the transaction that depends on them.

pub mod file;
pub mod in_memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chain::{Timestamp, TokenId};
use crate::error::{ProtocolError, Result};

pub use file::FileSecretStore;
pub use in_memory::InMemorySecretStore;

/// Envelope version written by this build. Version 1 hop records predate the
/// cached hop key.
pub const CURRENT_VERSION: u32 = 2;

/// A secret family held by the store.
pub trait SecretRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Key-space name; also the directory name on disk.
    const ROLE: &'static str;

    fn key(&self) -> TokenId;

    /// Secondary key for [`SecretStore::list_for_index`].
    fn index(&self) -> Option<TokenId> {
        None
    }

    /// Decode a record written under `version`. Fields added since then must
    /// be optional so older records still load.
    fn from_versioned(version: u32, record: serde_json::Value) -> Result<Self> {
        if version == 0 || version > CURRENT_VERSION {
            return Err(ProtocolError::bad_encoding(format!(
                "{} record has unsupported version {version}",
                Self::ROLE
            )));
        }
        serde_json::from_value(record).map_err(|err| {
            ProtocolError::bad_encoding(format!("{} record: {err}", Self::ROLE))
        })
    }
}

/// What is persisted per key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope<R> {
    pub version: u32,
    pub created_at: Timestamp,
    pub record: R,
}

impl<R: SecretRecord> Envelope<R> {
    pub fn new(record: R) -> Self {
        Self {
            version: CURRENT_VERSION,
            created_at: crate::chain::now_millis(),
            record,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|err| ProtocolError::bad_encoding(format!("{} envelope: {err}", R::ROLE)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: Envelope<serde_json::Value> = serde_json::from_slice(bytes)
            .map_err(|err| ProtocolError::bad_encoding(format!("{} envelope: {err}", R::ROLE)))?;
        Ok(Self {
            version: raw.version,
            created_at: raw.created_at,
            record: R::from_versioned(raw.version, raw.record)?,
        })
    }
}

#[async_trait]
pub trait SecretStore<R: SecretRecord>: Send + Sync {
    /// Insert or replace. Durable when this returns.
    async fn put(&self, record: R) -> Result<()>;

    async fn get(&self, key: &TokenId) -> Result<Option<R>>;

    /// Returns whether a record was removed.
    async fn delete(&self, key: &TokenId) -> Result<bool>;

    async fn list_for_index(&self, index: &TokenId) -> Result<Vec<R>>;
}
