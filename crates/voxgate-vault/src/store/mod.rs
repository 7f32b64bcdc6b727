//! Persistent credential collections.
//!
//! A store maps a user id to one [`UserCredential`] holding both encrypted
//! fields. Stores never see plaintext; encryption happens in the resolver.
//!
//! Two backends exist: [`SqliteCredentialStore`] for the pooled SQLite
//! database and [`FileCredentialStore`] for a single JSON document.

mod file;
mod sqlite;

pub use file::FileCredentialStore;
pub use sqlite::SqliteCredentialStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One user's encrypted endpoint and API key.
///
/// Both fields are always written together as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredential {
    pub user_id: String,
    pub encrypted_endpoint: String,
    pub encrypted_api_key: String,
    pub updated_at: DateTime<Utc>,
}

/// Store failures. Distinct from "no record", which is `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing collection could not be reached or written.
    #[error("credential storage unavailable: {0}")]
    Unavailable(String),

    /// The backing collection was read but its content is unusable.
    #[error("credential storage corrupt: {0}")]
    Corrupt(String),
}

/// Key-value access to encrypted credentials.
///
/// Implementations are blocking and must be safe to share between threads;
/// async callers run them on the blocking pool.
pub trait CredentialStore: Send + Sync {
    /// Inserts or replaces the record for `credential.user_id`.
    fn put(&self, credential: &UserCredential) -> Result<(), StoreError>;

    /// Looks up the record for `user_id`. Returns `Ok(None)` when the user
    /// has no record, including when the collection is still empty.
    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
