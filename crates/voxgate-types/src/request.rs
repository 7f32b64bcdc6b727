//! Inbound voice-platform request envelope.
//!
//! The platform posts a deeply nested JSON document. Only two values matter
//! to the bridge: the platform user id at `session.user.userId` and the
//! spoken query at `request.intent.slots.query.value`. Every level of the
//! envelope is optional so that a missing branch decodes to `None` instead
//! of failing the whole document.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors produced while decoding an inbound request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The body is not a JSON document of the expected shape.
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope carries no usable `session.user.userId`.
    #[error("request has no user id")]
    MissingUserId,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    request: Option<RequestBody>,
}

#[derive(Debug, Default, Deserialize)]
struct Session {
    #[serde(default)]
    user: Option<SessionUser>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionUser {
    #[serde(default, rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestBody {
    #[serde(default)]
    intent: Option<Intent>,
}

#[derive(Debug, Default, Deserialize)]
struct Intent {
    #[serde(default)]
    slots: Option<Slots>,
}

#[derive(Debug, Default, Deserialize)]
struct Slots {
    #[serde(default)]
    query: Option<Slot>,
}

#[derive(Debug, Default, Deserialize)]
struct Slot {
    #[serde(default)]
    value: Option<Value>,
}

/// The two values the bridge extracts from a webhook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Platform user id. Never empty.
    pub user_id: String,
    /// Spoken query text. Empty when the slot is missing.
    pub query_text: String,
}

impl InboundRequest {
    /// Decodes a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Malformed`] if the body is not JSON or a
    /// branch of the envelope has the wrong type, and
    /// [`RequestError::MissingUserId`] if the user id is absent or empty.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        let envelope: Envelope = serde_json::from_slice(body)?;

        let user_id = envelope
            .session
            .and_then(|s| s.user)
            .and_then(|u| u.user_id)
            .filter(|id| !id.is_empty())
            .ok_or(RequestError::MissingUserId)?;

        let query_text = envelope
            .request
            .and_then(|r| r.intent)
            .and_then(|i| i.slots)
            .and_then(|s| s.query)
            .and_then(|q| q.value)
            .map(slot_text)
            .unwrap_or_default();

        Ok(Self {
            user_id,
            query_text,
        })
    }
}

/// Coerces a slot value to text. Strings pass through, `null` is empty and
/// any other JSON value uses its compact serialization.
fn slot_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
