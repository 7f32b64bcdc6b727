//! Master key provisioning.
//!
//! One 256-bit key encrypts every stored credential. It lives in a single
//! file inside the data directory as URL-safe base64 text. The first start
//! generates it from the OS CSPRNG; later starts load it verbatim.

use crate::paths::{sanitize_file_name, FileNameError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Master key length in bytes.
pub const KEY_LEN: usize = 32;

/// Errors raised while loading or creating the key file. All of them are
/// fatal at startup.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key file name: {0}")]
    InvalidFileName(#[from] FileNameError),

    #[error("key file {path:?} is not accessible: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key file {path:?} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// The process-wide encryption key.
///
/// Owned by the service instance and handed to the codec explicitly.
/// `Debug` never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Generates a fresh key from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short SHA-256 fingerprint identifying the key in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }

    /// Encodes the key in its on-disk text form.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parses the on-disk text form. Surrounding whitespace is ignored.
    pub fn decode(text: &str) -> Result<Self, String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| format!("not base64: {e}"))?;
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("expected {KEY_LEN} bytes, found {}", b.len()))?;
        Ok(Self(bytes))
    }

    /// Loads the key from `dir/file_name`, creating it first if absent.
    ///
    /// The file name is validated before any path is built. The directory
    /// must already exist; it is never created here. A new key file is
    /// created exclusively (mode `0600` on unix), so two processes racing
    /// on first start end up sharing whichever key was written first.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidFileName`] for an unsafe name,
    /// [`KeyError::Io`] if the file cannot be read or written and
    /// [`KeyError::Malformed`] if an existing file does not hold a key.
    pub fn load_or_generate(dir: &Path, file_name: &str) -> Result<Self, KeyError> {
        let name = sanitize_file_name(file_name)?;
        let path = dir.join(name);

        match fs::read_to_string(&path) {
            Ok(text) => return Self::load_text(&path, &text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(KeyError::Io { path, source }),
        }

        let key = Self::generate();
        match create_key_file(&path, &key) {
            Ok(()) => {
                tracing::info!(
                    path = %path.display(),
                    fingerprint = %key.fingerprint(),
                    "generated new master key"
                );
                Ok(key)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let text = fs::read_to_string(&path).map_err(|source| KeyError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::load_text(&path, &text)
            }
            Err(source) => Err(KeyError::Io { path, source }),
        }
    }

    fn load_text(path: &Path, text: &str) -> Result<Self, KeyError> {
        let key = Self::decode(text).map_err(|reason| KeyError::Malformed {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::info!(
            path = %path.display(),
            fingerprint = %key.fingerprint(),
            "loaded master key"
        );
        Ok(key)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

fn create_key_file(path: &Path, key: &MasterKey) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(key.encode().as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_generates_and_second_start_reloads() {
        let dir = tempfile::tempdir().unwrap();

        let first = MasterKey::load_or_generate(dir.path(), "secret.key").unwrap();
        assert!(dir.path().join("secret.key").exists());

        let second = MasterKey::load_or_generate(dir.path(), "secret.key").unwrap();
        assert_eq!(first, second, "existing key must be loaded verbatim");
    }

    #[test]
    fn existing_key_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let known = MasterKey::from_bytes([7u8; KEY_LEN]);
        fs::write(dir.path().join("secret.key"), known.encode()).unwrap();

        let loaded = MasterKey::load_or_generate(dir.path(), "secret.key").unwrap();
        assert_eq!(loaded, known);
    }

    #[cfg(unix)]
    #[test]
    fn generated_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        MasterKey::load_or_generate(dir.path(), "secret.key").unwrap();
        let mode = fs::metadata(dir.path().join("secret.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn unsafe_file_names_are_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../secret", ".secret.key", "nested/secret.key", ""] {
            let err = MasterKey::load_or_generate(dir.path(), name).unwrap_err();
            assert!(matches!(err, KeyError::InvalidFileName(_)), "{name}");
        }
        assert_eq!(
            fs::read_dir(dir.path()).unwrap().count(),
            0,
            "no file may be created for a rejected name"
        );
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-there");
        let err = MasterKey::load_or_generate(&missing, "secret.key").unwrap_err();
        assert!(matches!(err, KeyError::Io { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn malformed_key_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("secret.key"), "too-short").unwrap();
        let err = MasterKey::load_or_generate(dir.path(), "secret.key").unwrap_err();
        assert!(matches!(err, KeyError::Malformed { .. }));

        fs::write(dir.path().join("secret.key"), "!!! not base64 !!!").unwrap();
        let err = MasterKey::load_or_generate(dir.path(), "secret.key").unwrap_err();
        assert!(matches!(err, KeyError::Malformed { .. }));
    }

    #[test]
    fn encode_decode_tolerates_trailing_newline() {
        let key = MasterKey::generate();
        let text = format!("{}\n", key.encode());
        assert_eq!(MasterKey::decode(&text).unwrap(), key);
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = MasterKey::from_bytes([0xAB; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(!debug.contains(&key.encode()));
        assert!(debug.contains(&key.fingerprint()));
    }
}
