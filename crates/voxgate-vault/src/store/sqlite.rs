use super::{CredentialStore, StoreError, UserCredential};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use voxgate_db::DbPool;

/// Credential store backed by the `user_credentials` table.
///
/// Each `put` is a single `INSERT .. ON CONFLICT DO UPDATE`, so both
/// encrypted fields change atomically.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    /// Wraps a pool whose database has had migrations applied.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn put(&self, credential: &UserCredential) -> Result<(), StoreError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Unavailable(format!("db connection failed: {e}")))?;

        conn.execute(
            "INSERT INTO user_credentials (user_id, encrypted_endpoint, encrypted_api_key, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                encrypted_endpoint = excluded.encrypted_endpoint,
                encrypted_api_key = excluded.encrypted_api_key,
                updated_at = excluded.updated_at",
            rusqlite::params![
                credential.user_id,
                credential.encrypted_endpoint,
                credential.encrypted_api_key,
                credential
                    .updated_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )
        .map_err(|e| StoreError::Unavailable(format!("failed to upsert credential: {e}")))?;

        Ok(())
    }

    fn get(&self, user_id: &str) -> Result<Option<UserCredential>, StoreError> {
        let conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Unavailable(format!("db connection failed: {e}")))?;

        let row = conn
            .query_row(
                "SELECT encrypted_endpoint, encrypted_api_key, updated_at
                 FROM user_credentials WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(format!("failed to query credential: {e}")))?;

        let Some((encrypted_endpoint, encrypted_api_key, updated_at)) = row else {
            return Ok(None);
        };

        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| StoreError::Corrupt(format!("bad updated_at for {user_id}: {e}")))?
            .with_timezone(&Utc);

        Ok(Some(UserCredential {
            user_id: user_id.to_string(),
            encrypted_endpoint,
            encrypted_api_key,
            updated_at,
        }))
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
