use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{Envelope, SecretRecord, SecretStore};
use crate::chain::TokenId;
use crate::error::{ErrorKind, ProtocolError, Result};

const LOG_TARGET: &str = "peace_protocol::store::file";

const NONCE_LEN: usize = 12;

/// On-disk wrapper around an envelope.
#[derive(Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
enum StoredFile {
    Plain {
        envelope: serde_json::Value,
    },
    Sealed {
        #[serde(with = "crate::crypto_serde::bytes")]
        nonce: Vec<u8>,
        #[serde(with = "crate::crypto_serde::bytes")]
        ciphertext: Vec<u8>,
    },
}

/// One JSON file per key under `<root>/<role>/<token>.json`.
///
/// With a key the envelope is sealed with AES-256-GCM, authenticated against
/// its role and token so files cannot be swapped between keys. Writes go
/// through a synced temp file and a rename; deletes overwrite with zeros and
/// sync before unlinking.
pub struct FileSecretStore<R: SecretRecord> {
    dir: PathBuf,
    key: Option<Arc<Zeroizing<[u8; 32]>>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: SecretRecord> Clone for FileSecretStore<R> {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            key: self.key.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: SecretRecord> FileSecretStore<R> {
    /// Plaintext store; suitable for tests and throwaway demos.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::build(root.as_ref(), None)
    }

    pub fn open_encrypted(root: impl AsRef<Path>, key: Zeroizing<[u8; 32]>) -> Result<Self> {
        Self::build(root.as_ref(), Some(Arc::new(key)))
    }

    fn build(root: &Path, key: Option<Arc<Zeroizing<[u8; 32]>>>) -> Result<Self> {
        let dir = root.join(R::ROLE);
        fs::create_dir_all(&dir)?;
        tracing::debug!(target: LOG_TARGET, role = R::ROLE, dir = %dir.display(), "opened secret store");
        Ok(Self {
            dir,
            key,
            _record: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &TokenId) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_hex()))
    }

    fn aad(token: &TokenId) -> Vec<u8> {
        let mut aad = R::ROLE.as_bytes().to_vec();
        aad.push(b'|');
        aad.extend_from_slice(token.as_bytes());
        aad
    }

    fn cipher(key: &[u8; 32]) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))
    }

    fn encode(&self, token: &TokenId, envelope: &Envelope<R>) -> Result<Vec<u8>> {
        let plain = Zeroizing::new(envelope.to_json()?);
        let stored = match &self.key {
            None => StoredFile::Plain {
                envelope: serde_json::from_slice(&plain)
                    .map_err(|err| ProtocolError::bad_encoding(err.to_string()))?,
            },
            Some(key) => {
                let mut nonce = [0u8; NONCE_LEN];
                rand::thread_rng().fill_bytes(&mut nonce);
                let aad = Self::aad(token);
                let ciphertext = Self::cipher(key)
                    .encrypt(
                        Nonce::from_slice(&nonce),
                        Payload {
                            msg: &plain,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| ProtocolError::bad_encoding("sealing secret record failed"))?;
                StoredFile::Sealed {
                    nonce: nonce.to_vec(),
                    ciphertext,
                }
            }
        };
        serde_json::to_vec_pretty(&stored).map_err(|err| ProtocolError::bad_encoding(err.to_string()))
    }

    fn decode(&self, token: &TokenId, bytes: &[u8]) -> Result<Envelope<R>> {
        let stored: StoredFile = serde_json::from_slice(bytes).map_err(|err| {
            ProtocolError::bad_encoding(format!("{} file for {token}: {err}", R::ROLE))
        })?;
        match (stored, &self.key) {
            (StoredFile::Plain { envelope }, _) => {
                let bytes = serde_json::to_vec(&envelope)
                    .map_err(|err| ProtocolError::bad_encoding(err.to_string()))?;
                Envelope::from_json(&bytes)
            }
            (StoredFile::Sealed { nonce, ciphertext }, Some(key)) => {
                if nonce.len() != NONCE_LEN {
                    return Err(ProtocolError::bad_encoding("sealed record nonce length"));
                }
                let aad = Self::aad(token);
                let plain = Zeroizing::new(
                    Self::cipher(key)
                        .decrypt(
                            Nonce::from_slice(&nonce),
                            Payload {
                                msg: &ciphertext,
                                aad: &aad,
                            },
                        )
                        .map_err(|_| {
                            ProtocolError::bad_encoding(format!(
                                "{} record for {token} failed authentication",
                                R::ROLE
                            ))
                        })?,
                );
                Envelope::from_json(&plain)
            }
            (StoredFile::Sealed { .. }, None) => Err(ProtocolError::bad_encoding(format!(
                "{} record for {token} is sealed and the store has no key",
                R::ROLE
            ))),
        }
    }

    fn read_blocking(&self, token: &TokenId) -> Result<Option<R>> {
        let path = self.path_for(token);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(self.decode(token, &bytes)?.record)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_blocking(&self, record: R) -> Result<()> {
        let token = record.key();
        let bytes = self.encode(&token, &Envelope::new(record))?;
        let path = self.path_for(&token);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        sync_dir(&self.dir)?;
        Ok(())
    }

    fn delete_blocking(&self, token: &TokenId) -> Result<bool> {
        let path = self.path_for(token);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len() as usize,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        {
            let mut file = OpenOptions::new().write(true).open(&path)?;
            file.write_all(&vec![0u8; len])?;
            file.sync_all()?;
        }
        fs::remove_file(&path)?;
        sync_dir(&self.dir)?;
        Ok(true)
    }

    fn list_blocking(&self, index: &TokenId) -> Result<Vec<R>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(token) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<TokenId>().ok())
            else {
                continue;
            };
            // Records sealed under another key share the directory; they are
            // not ours to list.
            let record = match self.read_blocking(&token) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) if err.kind() == ErrorKind::BadEncoding => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        role = R::ROLE,
                        %token,
                        error = %err,
                        "skipping unreadable secret record"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            if record.index().as_ref() == Some(index) {
                out.push(record);
            }
        }
        Ok(out)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|err| ProtocolError::external(format!("secret store task failed: {err}")))?
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl<R: SecretRecord> SecretStore<R> for FileSecretStore<R> {
    async fn put(&self, record: R) -> Result<()> {
        let key = record.key();
        self.blocking(move |store| store.write_blocking(record)).await?;
        tracing::debug!(target: LOG_TARGET, role = R::ROLE, %key, "stored secret");
        Ok(())
    }

    async fn get(&self, key: &TokenId) -> Result<Option<R>> {
        let key = *key;
        self.blocking(move |store| store.read_blocking(&key)).await
    }

    async fn delete(&self, key: &TokenId) -> Result<bool> {
        let key = *key;
        let removed = self.blocking(move |store| store.delete_blocking(&key)).await?;
        tracing::debug!(target: LOG_TARGET, role = R::ROLE, %key, removed, "deleted secret");
        Ok(removed)
    }

    async fn list_for_index(&self, index: &TokenId) -> Result<Vec<R>> {
        let index = *index;
        self.blocking(move |store| store.list_blocking(&index)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Secret {
        token: TokenId,
        listing: TokenId,
        value: String,
    }

    impl SecretRecord for Secret {
        const ROLE: &'static str = "seller";

        fn key(&self) -> TokenId {
            self.token
        }

        fn index(&self) -> Option<TokenId> {
            Some(self.listing)
        }
    }

    fn secret(byte: u8, listing: u8) -> Secret {
        Secret {
            token: TokenId::new([byte; 32]),
            listing: TokenId::new([listing; 32]),
            value: format!("secret-{byte}"),
        }
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::<Secret>::open(dir.path()).unwrap();
        store.put(secret(1, 9)).await.unwrap();
        drop(store);

        let reopened = FileSecretStore::<Secret>::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&TokenId::new([1; 32])).await.unwrap(), Some(secret(1, 9)));
        assert!(reopened.dir().join(format!("{}.json", TokenId::new([1; 32]))).exists());
    }

    #[tokio::test]
    async fn sealed_records_need_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let sealed =
            FileSecretStore::<Secret>::open_encrypted(dir.path(), Zeroizing::new([7u8; 32])).unwrap();
        sealed.put(secret(2, 9)).await.unwrap();

        let raw = fs::read_to_string(sealed.dir().join(format!("{}.json", TokenId::new([2; 32]))))
            .unwrap();
        assert!(!raw.contains("secret-2"));
        assert_eq!(sealed.get(&TokenId::new([2; 32])).await.unwrap(), Some(secret(2, 9)));

        let wrong =
            FileSecretStore::<Secret>::open_encrypted(dir.path(), Zeroizing::new([8u8; 32])).unwrap();
        let err = wrong.get(&TokenId::new([2; 32])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEncoding);

        let keyless = FileSecretStore::<Secret>::open(dir.path()).unwrap();
        assert!(keyless.get(&TokenId::new([2; 32])).await.is_err());
    }

    #[tokio::test]
    async fn swapped_files_fail_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileSecretStore::<Secret>::open_encrypted(dir.path(), Zeroizing::new([7u8; 32])).unwrap();
        store.put(secret(3, 9)).await.unwrap();
        let from = store.dir().join(format!("{}.json", TokenId::new([3; 32])));
        let to = store.dir().join(format!("{}.json", TokenId::new([4; 32])));
        fs::copy(&from, &to).unwrap();
        assert!(store.get(&TokenId::new([4; 32])).await.is_err());
    }

    #[tokio::test]
    async fn delete_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::<Secret>::open(dir.path()).unwrap();
        store.put(secret(5, 1)).await.unwrap();
        store.put(secret(6, 1)).await.unwrap();
        store.put(secret(7, 2)).await.unwrap();

        let mut listed = store.list_for_index(&TokenId::new([1; 32])).await.unwrap();
        listed.sort_by_key(|s| s.token);
        assert_eq!(listed, vec![secret(5, 1), secret(6, 1)]);

        assert!(store.delete(&TokenId::new([5; 32])).await.unwrap());
        assert!(!store.delete(&TokenId::new([5; 32])).await.unwrap());
        assert_eq!(store.get(&TokenId::new([5; 32])).await.unwrap(), None);
        assert_eq!(store.list_for_index(&TokenId::new([1; 32])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_skips_records_sealed_under_another_key() {
        let dir = tempfile::tempdir().unwrap();
        let mine =
            FileSecretStore::<Secret>::open_encrypted(dir.path(), Zeroizing::new([7u8; 32])).unwrap();
        let theirs =
            FileSecretStore::<Secret>::open_encrypted(dir.path(), Zeroizing::new([8u8; 32])).unwrap();
        mine.put(secret(1, 9)).await.unwrap();
        theirs.put(secret(3, 9)).await.unwrap();
        theirs.put(secret(4, 5)).await.unwrap();

        assert_eq!(mine.list_for_index(&TokenId::new([9; 32])).await.unwrap(), vec![secret(1, 9)]);
        assert!(mine.list_for_index(&TokenId::new([5; 32])).await.unwrap().is_empty());
        assert_eq!(theirs.list_for_index(&TokenId::new([9; 32])).await.unwrap(), vec![secret(3, 9)]);

        let err = mine.get(&TokenId::new([3; 32])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadEncoding);
    }
}
