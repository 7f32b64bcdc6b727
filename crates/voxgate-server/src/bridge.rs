//! The voice webhook: request in, spoken reply out.
//!
//! Every failure along the way is a [`BridgeError`]. [`VoiceBridge::handle`]
//! is the only place those errors become user-facing text, and the only
//! place they are logged. Upstream error details never reach the speaker.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Extension},
    Json,
};
use std::sync::Arc;
use thiserror::Error;
use voxgate_forward::{ForwardError, Forwarder};
use voxgate_types::{InboundRequest, ReplyMessage, RequestError, VoiceReply};
use voxgate_vault::{
    CredentialField, CredentialResolver, DecryptError, ResolveError, StoreError,
};

/// Why a voice turn could not be answered.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("user {user_id} has no credential configured")]
    NotConfigured { user_id: String },

    #[error("credential store failed for user {user_id}: {source}")]
    Storage {
        user_id: String,
        #[source]
        source: StoreError,
    },

    #[error("stored {field} for user {user_id} does not decrypt: {source}")]
    Decryption {
        user_id: String,
        field: CredentialField,
        #[source]
        source: DecryptError,
    },

    #[error("upstream call failed for user {user_id}: {source}")]
    Upstream {
        user_id: String,
        #[source]
        source: ForwardError,
    },

    #[error("upstream reply unusable for user {user_id}: {source}")]
    UnexpectedBody {
        user_id: String,
        #[source]
        source: ForwardError,
    },
}

impl BridgeError {
    fn from_resolve(user_id: &str, err: ResolveError) -> Self {
        let user_id = user_id.to_string();
        match err {
            ResolveError::NotConfigured => Self::NotConfigured { user_id },
            ResolveError::Storage(source) => Self::Storage { user_id, source },
            ResolveError::Decryption { field, source, .. } => Self::Decryption {
                user_id,
                field,
                source,
            },
        }
    }

    fn from_forward(user_id: &str, source: ForwardError) -> Self {
        let user_id = user_id.to_string();
        if source.is_body_error() {
            Self::UnexpectedBody { user_id, source }
        } else {
            Self::Upstream { user_id, source }
        }
    }

    /// The fixed reply spoken for this failure.
    ///
    /// A credential that no longer decrypts is presented to the user as
    /// unconfigured: from their side, reconfiguring is the fix.
    pub fn reply_message(&self) -> ReplyMessage {
        match self {
            Self::InvalidRequest(_) => ReplyMessage::InvalidRequest,
            Self::NotConfigured { .. } | Self::Decryption { .. } => ReplyMessage::NotConfigured,
            Self::Storage { .. } => ReplyMessage::InternalError,
            Self::Upstream { .. } | Self::UnexpectedBody { .. } => {
                ReplyMessage::UpstreamUnreachable
            }
        }
    }

    fn log(&self) {
        match self {
            Self::InvalidRequest(e) => {
                tracing::debug!(error = %e, "rejected malformed voice request");
            }
            Self::NotConfigured { user_id } => {
                tracing::info!(user_id = %user_id, "voice request from unconfigured user");
            }
            Self::Storage { user_id, source } => {
                tracing::error!(user_id = %user_id, error = %source, "credential store unavailable");
            }
            Self::Decryption {
                user_id,
                field,
                source,
            } => {
                tracing::error!(
                    user_id = %user_id,
                    field = %field,
                    error = %source,
                    "stored credential does not decrypt with the current master key"
                );
            }
            Self::Upstream { user_id, source } => {
                tracing::warn!(user_id = %user_id, error = %source, "upstream model unreachable");
            }
            Self::UnexpectedBody { user_id, source } => {
                tracing::warn!(user_id = %user_id, error = %source, "upstream model reply unusable");
            }
        }
    }
}

/// Resolves a caller's credential and forwards their query.
#[derive(Debug, Clone)]
pub struct VoiceBridge {
    resolver: CredentialResolver,
    forwarder: Forwarder,
}

impl VoiceBridge {
    pub fn new(resolver: CredentialResolver, forwarder: Forwarder) -> Self {
        Self {
            resolver,
            forwarder,
        }
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    /// Answers one raw webhook body. Never fails: every error becomes one
    /// of the fixed [`ReplyMessage`]s.
    pub async fn handle(&self, body: &[u8]) -> VoiceReply {
        match self.answer(body).await {
            Ok(text) => VoiceReply::speak(text),
            Err(err) => {
                err.log();
                err.reply_message().reply()
            }
        }
    }

    /// Produces the model's reply text for a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns the [`BridgeError`] for the first step that fails.
    pub async fn answer(&self, body: &[u8]) -> Result<String, BridgeError> {
        let request = InboundRequest::from_slice(body)?;
        let user_id = request.user_id.as_str();

        let credential = self
            .resolver
            .resolve(user_id)
            .await
            .map_err(|e| BridgeError::from_resolve(user_id, e))?;

        let text = self
            .forwarder
            .send(&credential.endpoint, &credential.api_key, &request.query_text)
            .await
            .map_err(|e| BridgeError::from_forward(user_id, e))?;

        tracing::debug!(user_id = %user_id, chars = text.chars().count(), "answered voice request");
        Ok(text)
    }
}

/// Handler for `POST /query`.
///
/// Reads the body as raw bytes so that any content type, and any body the
/// body-limit layer refuses, still gets a spoken reply with HTTP 200.
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Json<VoiceReply> {
    let reply = match body {
        Ok(bytes) => state.bridge.handle(&bytes).await,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "could not read voice request body");
            ReplyMessage::InvalidRequest.reply()
        }
    };
    Json(reply)
}
