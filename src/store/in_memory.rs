use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Envelope, SecretRecord, SecretStore};
use crate::chain::TokenId;
use crate::error::Result;

const LOG_TARGET: &str = "peace_protocol::store::in_memory";

/// Process-local store. Clones share state, so a clone handed to a fresh
/// coordinator behaves like a restart over the same backing store.
pub struct InMemorySecretStore<R: SecretRecord> {
    inner: Arc<RwLock<HashMap<TokenId, Envelope<R>>>>,
}

impl<R: SecretRecord> InMemorySecretStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Raw envelope access, for inspecting versions and timestamps.
    pub fn envelope(&self, key: &TokenId) -> Option<Envelope<R>> {
        self.inner.read().get(key).cloned()
    }

    /// Insert an envelope as-is, e.g. one written by an older client.
    pub fn insert_envelope(&self, envelope: Envelope<R>) {
        let key = envelope.record.key();
        self.inner.write().insert(key, envelope);
    }
}

impl<R: SecretRecord> Default for InMemorySecretStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: SecretRecord> Clone for InMemorySecretStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<R: SecretRecord> SecretStore<R> for InMemorySecretStore<R> {
    async fn put(&self, record: R) -> Result<()> {
        let key = record.key();
        self.inner.write().insert(key, Envelope::new(record));
        tracing::debug!(target: LOG_TARGET, role = R::ROLE, %key, "stored secret");
        Ok(())
    }

    async fn get(&self, key: &TokenId) -> Result<Option<R>> {
        Ok(self.inner.read().get(key).map(|env| env.record.clone()))
    }

    async fn delete(&self, key: &TokenId) -> Result<bool> {
        let removed = self.inner.write().remove(key).is_some();
        tracing::debug!(target: LOG_TARGET, role = R::ROLE, %key, removed, "deleted secret");
        Ok(removed)
    }

    async fn list_for_index(&self, index: &TokenId) -> Result<Vec<R>> {
        Ok(self
            .inner
            .read()
            .values()
            .filter(|env| env.record.index().as_ref() == Some(index))
            .map(|env| env.record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Bid {
        pointer: TokenId,
        listing: TokenId,
    }

    impl SecretRecord for Bid {
        const ROLE: &'static str = "bid";

        fn key(&self) -> TokenId {
            self.pointer
        }

        fn index(&self) -> Option<TokenId> {
            Some(self.listing)
        }
    }

    #[tokio::test]
    async fn put_get_delete_and_index() {
        let store = InMemorySecretStore::<Bid>::new();
        let listing = TokenId::new([1u8; 32]);
        let a = Bid { pointer: TokenId::new([2u8; 32]), listing };
        let b = Bid { pointer: TokenId::new([3u8; 32]), listing };
        let c = Bid { pointer: TokenId::new([4u8; 32]), listing: TokenId::new([9u8; 32]) };
        for bid in [&a, &b, &c] {
            store.put(bid.clone()).await.unwrap();
        }

        assert_eq!(store.get(&a.pointer).await.unwrap(), Some(a.clone()));
        let mut for_listing = store.list_for_index(&listing).await.unwrap();
        for_listing.sort_by_key(|bid| bid.pointer);
        assert_eq!(for_listing, vec![a.clone(), b]);

        assert!(store.delete(&a.pointer).await.unwrap());
        assert!(!store.delete(&a.pointer).await.unwrap());
        assert_eq!(store.get(&a.pointer).await.unwrap(), None);
        assert_eq!(store.envelope(&c.pointer).unwrap().version, super::super::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = InMemorySecretStore::<Bid>::new();
        let restarted = store.clone();
        let bid = Bid { pointer: TokenId::new([5u8; 32]), listing: TokenId::new([6u8; 32]) };
        store.put(bid.clone()).await.unwrap();
        assert_eq!(restarted.get(&bid.pointer).await.unwrap(), Some(bid));
    }
}
