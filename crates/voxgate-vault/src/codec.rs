//! Authenticated encryption of credential fields.
//!
//! Uses ChaCha20-Poly1305 with a random 96-bit nonce per call. Token layout
//! before base64 (URL-safe, unpadded):
//!
//! ```text
//! version(1) || nonce(12) || ciphertext || tag(16)
//! ```
//!
//! The version byte is also bound as associated data, so it cannot be
//! altered without failing authentication.

use crate::key::MasterKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use std::fmt;
use thiserror::Error;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Smallest valid token: version + nonce + tag (empty plaintext).
const MIN_TOKEN_LEN: usize = 1 + NONCE_LEN + TAG_LEN;

/// Why a token could not be decrypted. Decryption never yields partial
/// plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("ciphertext is truncated ({0} bytes)")]
    Truncated(usize),

    #[error("unsupported ciphertext version {0}")]
    UnsupportedVersion(u8),

    /// Wrong key or tampered ciphertext.
    #[error("ciphertext failed authentication")]
    Authentication,

    #[error("decrypted value is not UTF-8")]
    Utf8,
}

/// Encrypts and decrypts credential fields with the master key.
pub struct CredentialCodec {
    cipher: ChaCha20Poly1305,
    fingerprint: String,
}

impl CredentialCodec {
    pub fn new(key: &MasterKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            fingerprint: key.fingerprint(),
        }
    }

    /// Fingerprint of the key this codec was built with.
    pub fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Encrypts `plaintext` into a text token. The same input encrypts to a
    /// different token on every call.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &[FORMAT_VERSION],
                },
            )
            .expect("ChaCha20Poly1305 encryption cannot fail for valid inputs");

        let mut token = Vec::with_capacity(1 + NONCE_LEN + sealed.len());
        token.push(FORMAT_VERSION);
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&sealed);
        URL_SAFE_NO_PAD.encode(token)
    }

    /// Decrypts a token produced by [`encrypt`](Self::encrypt).
    ///
    /// # Errors
    ///
    /// Returns a [`DecryptError`] describing why the token was rejected.
    pub fn decrypt(&self, token: &str) -> Result<String, DecryptError> {
        let data = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| DecryptError::Encoding)?;
        if data.len() < MIN_TOKEN_LEN {
            return Err(DecryptError::Truncated(data.len()));
        }

        let (version, rest) = (data[0], &data[1..]);
        if version != FORMAT_VERSION {
            return Err(DecryptError::UnsupportedVersion(version));
        }

        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &[FORMAT_VERSION],
                },
            )
            .map_err(|_| DecryptError::Authentication)?;

        String::from_utf8(plaintext).map_err(|_| DecryptError::Utf8)
    }
}

impl fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialCodec")
            .field("key_fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(seed: u8) -> CredentialCodec {
        CredentialCodec::new(&MasterKey::from_bytes([seed; 32]))
    }

    #[test]
    fn round_trips_typical_values() {
        let codec = codec(1);
        for value in [
            "https://api.openai.com/v1/chat/completions/model_name=gpt-4o",
            "sk-test-1234567890",
            "",
            "a < b & c > d",
            "<speak>&amp;</speak>",
            "ünïcödé ✓",
        ] {
            let token = codec.encrypt(value);
            assert_eq!(codec.decrypt(&token).unwrap(), value);
        }
    }

    #[test]
    fn encryption_is_non_deterministic() {
        let codec = codec(2);
        let a = codec.encrypt("same");
        let b = codec.encrypt("same");
        assert_ne!(a, b, "random nonce must change the token");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = codec(3).encrypt("sk-secret");
        assert_eq!(
            codec(4).decrypt(&token),
            Err(DecryptError::Authentication)
        );
    }

    #[test]
    fn tampered_token_fails_authentication() {
        let codec = codec(5);
        let token = codec.encrypt("https://example.com");
        let mut raw = URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(codec.decrypt(&tampered), Err(DecryptError::Authentication));
    }

    #[test]
    fn version_byte_is_checked() {
        let codec = codec(6);
        let mut raw = URL_SAFE_NO_PAD.decode(codec.encrypt("x")).unwrap();
        raw[0] = 9;
        let token = URL_SAFE_NO_PAD.encode(raw);
        assert_eq!(
            codec.decrypt(&token),
            Err(DecryptError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn malformed_tokens_are_typed_errors() {
        let codec = codec(7);
        assert_eq!(codec.decrypt("***"), Err(DecryptError::Encoding));
        assert_eq!(codec.decrypt(""), Err(DecryptError::Truncated(0)));
        let short = URL_SAFE_NO_PAD.encode([FORMAT_VERSION; 10]);
        assert_eq!(codec.decrypt(&short), Err(DecryptError::Truncated(10)));
    }

    #[test]
    fn debug_shows_only_fingerprint() {
        let key = MasterKey::from_bytes([8; 32]);
        let debug = format!("{:?}", CredentialCodec::new(&key));
        assert!(debug.contains(&key.fingerprint()));
        assert!(!debug.contains(&key.encode()));
    }
}
