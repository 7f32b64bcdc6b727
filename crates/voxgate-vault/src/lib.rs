//! Per-user LLM credential storage for voxgate.
//!
//! Every user's endpoint URL and API key are encrypted at rest with one
//! process-wide master key. This crate owns that key, the codec that uses
//! it, the persistent credential collections and the resolver that turns a
//! user id back into a usable endpoint and key.
//!
//! # Fail-closed key handling
//!
//! The master key file is generated once and loaded verbatim afterwards.
//! If it is lost or replaced, previously stored credentials cannot be
//! decrypted and the resolver reports a [`ResolveError::Decryption`] for
//! them. Nothing attempts to recover or re-key silently.

pub mod codec;
pub mod key;
pub mod paths;
pub mod resolver;
pub mod store;

pub use codec::{CredentialCodec, DecryptError};
pub use key::{KeyError, MasterKey};
pub use paths::{sanitize_file_name, FileNameError};
pub use resolver::{CredentialField, CredentialResolver, ResolveError, ResolvedCredential};
pub use store::{
    CredentialStore, FileCredentialStore, SqliteCredentialStore, StoreError, UserCredential,
};
