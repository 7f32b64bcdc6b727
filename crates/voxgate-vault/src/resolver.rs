//! Turns a user id into a usable endpoint and API key.

use crate::codec::{CredentialCodec, DecryptError};
use crate::store::{CredentialStore, StoreError, UserCredential};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Which encrypted field of a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    Endpoint,
    ApiKey,
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Endpoint => "endpoint",
            Self::ApiKey => "api key",
        })
    }
}

/// Resolution failures. Each variant needs a different operator response,
/// so they are never folded into one another here.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The user has no stored record.
    #[error("no credential configured")]
    NotConfigured,

    /// The store could not be read.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A stored record exists but does not decrypt under the current key.
    #[error("failed to decrypt {field} for user {user_id}: {source}")]
    Decryption {
        user_id: String,
        field: CredentialField,
        #[source]
        source: DecryptError,
    },
}

/// Decrypted credential. `Debug` hides the API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub endpoint: String,
    pub api_key: String,
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Composes a [`CredentialStore`] with a [`CredentialCodec`].
///
/// Cheap to clone; all clones share the same store and codec. The async
/// methods run store access on tokio's blocking pool.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    codec: Arc<CredentialCodec>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<CredentialCodec>) -> Self {
        Self { store, codec }
    }

    /// Name of the underlying store backend.
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Looks up and decrypts the credential for `user_id`.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NotConfigured`] when no record exists,
    /// [`ResolveError::Storage`] when the store fails and
    /// [`ResolveError::Decryption`] when the record does not decrypt.
    pub async fn resolve(&self, user_id: &str) -> Result<ResolvedCredential, ResolveError> {
        let resolver = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || resolver.resolve_blocking(&user_id))
            .await
            .map_err(|e| StoreError::Unavailable(format!("task join error: {e}")))?
    }

    /// Blocking form of [`resolve`](Self::resolve).
    pub fn resolve_blocking(&self, user_id: &str) -> Result<ResolvedCredential, ResolveError> {
        let record = self
            .store
            .get(user_id)?
            .ok_or(ResolveError::NotConfigured)?;

        let decrypt = |field: CredentialField, token: &str| {
            self.codec
                .decrypt(token)
                .map_err(|source| ResolveError::Decryption {
                    user_id: user_id.to_string(),
                    field,
                    source,
                })
        };

        Ok(ResolvedCredential {
            endpoint: decrypt(CredentialField::Endpoint, &record.encrypted_endpoint)?,
            api_key: decrypt(CredentialField::ApiKey, &record.encrypted_api_key)?,
        })
    }

    /// Encrypts `endpoint` and `api_key` and stores them as one record,
    /// replacing any previous record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the write fails.
    pub async fn provision(
        &self,
        user_id: &str,
        endpoint: &str,
        api_key: &str,
    ) -> Result<(), StoreError> {
        let record = UserCredential {
            user_id: user_id.to_string(),
            encrypted_endpoint: self.codec.encrypt(endpoint),
            encrypted_api_key: self.codec.encrypt(api_key),
            updated_at: Utc::now(),
        };
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.put(&record))
            .await
            .map_err(|e| StoreError::Unavailable(format!("task join error: {e}")))??;

        tracing::info!(
            user_id,
            backend = self.store.backend(),
            "stored credential"
        );
        Ok(())
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("backend", &self.store.backend())
            .field("codec", &self.codec)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::MasterKey;
    use crate::store::FileCredentialStore;

    struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn put(&self, _: &UserCredential) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn get(&self, _: &str) -> Result<Option<UserCredential>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn backend(&self) -> &'static str {
            "broken"
        }
    }

    fn codec(seed: u8) -> Arc<CredentialCodec> {
        Arc::new(CredentialCodec::new(&MasterKey::from_bytes([seed; 32])))
    }

    fn file_store(dir: &tempfile::TempDir) -> Arc<dyn CredentialStore> {
        Arc::new(FileCredentialStore::new(dir.path(), "user_config.json").unwrap())
    }

    #[tokio::test]
    async fn provision_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CredentialResolver::new(file_store(&dir), codec(1));

        resolver
            .provision("u1", "https://llm.example/v1/chat/completions", "sk-1")
            .await
            .unwrap();

        let resolved = resolver.resolve("u1").await.unwrap();
        assert_eq!(resolved.endpoint, "https://llm.example/v1/chat/completions");
        assert_eq!(resolved.api_key, "sk-1");
    }

    #[tokio::test]
    async fn stored_fields_are_ciphertext() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        let resolver = CredentialResolver::new(store.clone(), codec(1));
        resolver
            .provision("u1", "https://llm.example", "sk-plain")
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("user_config.json")).unwrap();
        assert!(!raw.contains("sk-plain"));
        assert!(!raw.contains("llm.example"));

        let record = store.get("u1").unwrap().unwrap();
        assert_ne!(record.encrypted_api_key, "sk-plain");
    }

    #[tokio::test]
    async fn unknown_user_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CredentialResolver::new(file_store(&dir), codec(1));
        assert!(matches!(
            resolver.resolve("nobody").await,
            Err(ResolveError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn key_change_is_a_decryption_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        CredentialResolver::new(store.clone(), codec(1))
            .provision("u1", "https://llm.example", "sk-1")
            .await
            .unwrap();

        let rotated = CredentialResolver::new(store, codec(2));
        match rotated.resolve("u1").await {
            Err(ResolveError::Decryption {
                user_id,
                field,
                source,
            }) => {
                assert_eq!(user_id, "u1");
                assert_eq!(field, CredentialField::Endpoint);
                assert_eq!(source, DecryptError::Authentication);
            }
            other => panic!("expected decryption error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn corrupted_api_key_names_the_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir);
        let codec = codec(1);
        store
            .put(&UserCredential {
                user_id: "u1".to_string(),
                encrypted_endpoint: codec.encrypt("https://llm.example"),
                encrypted_api_key: "garbage!".to_string(),
                updated_at: Utc::now(),
            })
            .unwrap();

        let resolver = CredentialResolver::new(store, codec);
        assert!(matches!(
            resolver.resolve("u1").await,
            Err(ResolveError::Decryption {
                field: CredentialField::ApiKey,
                source: DecryptError::Encoding,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn store_failure_is_not_reported_as_unconfigured() {
        let resolver = CredentialResolver::new(Arc::new(BrokenStore), codec(1));
        assert!(matches!(
            resolver.resolve("u1").await,
            Err(ResolveError::Storage(StoreError::Unavailable(_)))
        ));
        assert!(resolver.provision("u1", "e", "k").await.is_err());
    }

    #[test]
    fn resolved_credential_debug_hides_key() {
        let resolved = ResolvedCredential {
            endpoint: "https://llm.example".to_string(),
            api_key: "sk-secret".to_string(),
        };
        let debug = format!("{resolved:?}");
        assert!(debug.contains("llm.example"));
        assert!(!debug.contains("sk-secret"));
    }
}
