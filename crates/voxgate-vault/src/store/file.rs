use super::{CredentialStore, StoreError, UserCredential};
use crate::paths::{sanitize_file_name, FileNameError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// On-disk shape of one entry, keyed by user id in the surrounding map.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileRecord {
    url: String,
    key: String,
    updated_at: DateTime<Utc>,
}

type Collection = BTreeMap<String, FileRecord>;

/// Credential store kept as one JSON object in a file.
///
/// Writes rewrite the whole document under an in-process mutex and publish
/// it with write-to-temp + rename, so concurrent writers never lose each
/// other's records and readers never see a half-written file. The store
/// assumes it is the only process writing the file.
#[derive(Debug)]
pub struct FileCredentialStore {
    dir: PathBuf,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Prepares a store at `dir/file_name`. No I/O happens here; the file
    /// is created by the first `put`.
    ///
    /// # Errors
    ///
    /// Returns [`FileNameError`] if `file_name` is not a safe base name.
    pub fn new(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, FileNameError> {
        let name = sanitize_file_name(file_name)?;
        let dir = dir.as_ref().to_path_buf();
        Ok(Self {
            path: dir.join(name),
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_collection(&self) -> Result<Collection, StoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::Corrupt(format!("{}: {e}", self.path.display()))
            }),
            // A missing file in an existing directory is an empty collection.
            // A missing directory means the collection cannot be reached.
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.dir.is_dir() => {
                Ok(Collection::new())
            }
            Err(e) => Err(StoreError::Unavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write_collection(&self, collection: &Collection) -> Result<(), StoreError> {
        let payload = serde_json::to_vec_pretty(collection)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode credentials: {e}")))?;

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&temp_path, payload).map_err(|e| {
            StoreError::Unavailable(format!("failed to write {}: {e}", temp_path.display()))
        })?;

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Unavailable(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn put(&self, credential: &UserCredential) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|poisoned| {
            tracing::error!("credential file lock poisoned, continuing");
            poisoned.into_inner()
        });

        let mut collection = self.read_collection()?;
        collection.insert(
            credential.user_id.clone(),
            FileRecord {
                url: credential.encrypted_endpoint.clone(),
                key: credential.encrypted_api_key.clone(),
                updated_at: credential.updated_at,
            },
        );
        self.write_collection(&collection)
    }

    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError> {
        let mut collection = self.read_collection()?;
        Ok(collection.remove(user_id).map(|record| UserCredential {
            user_id: user_id.to_string(),
            encrypted_endpoint: record.url,
            encrypted_api_key: record.key,
            updated_at: record.updated_at,
        }))
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
