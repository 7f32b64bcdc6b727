//! Credential provisioning API.
//!
//! - `PUT /api/credentials/{userId}` stores (or replaces) a user's endpoint
//!   and API key.
//! - `POST /api/credentials/test` checks an endpoint/key pair without
//!   storing it.
//!
//! Both routes sit behind [`admin_auth_middleware`](crate::middleware::admin_auth_middleware).

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use voxgate_forward::EndpointTarget;

/// Longest accepted platform user id, in characters.
pub const MAX_USER_ID_CHARS: usize = 512;

/// Longest accepted endpoint string, in characters.
pub const MAX_ENDPOINT_CHARS: usize = 2048;

/// Request body for both provisioning routes.
#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub endpoint: String,
    #[serde(rename = "apiKey", default)]
    pub api_key: Option<String>,
}

/// Response body for `POST /api/credentials/test`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "provisioning request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to store credential".to_string(),
                )
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

fn validate_user_id(user_id: &str) -> Result<(), ApiError> {
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("userId must not be empty".to_string()));
    }
    if user_id.chars().count() > MAX_USER_ID_CHARS {
        return Err(ApiError::BadRequest(format!(
            "userId longer than {MAX_USER_ID_CHARS} characters"
        )));
    }
    Ok(())
}

/// Checks an endpoint string and returns it trimmed.
fn validate_endpoint(endpoint: &str, allow_insecure: bool) -> Result<&str, ApiError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ApiError::BadRequest("endpoint must not be empty".to_string()));
    }
    if endpoint.chars().count() > MAX_ENDPOINT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "endpoint longer than {MAX_ENDPOINT_CHARS} characters"
        )));
    }

    let target =
        EndpointTarget::parse(endpoint).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !target.is_https() && !allow_insecure {
        return Err(ApiError::BadRequest("endpoint must use https".to_string()));
    }
    Ok(endpoint)
}

fn payload(body: Result<Json<CredentialRequest>, JsonRejection>) -> Result<CredentialRequest, ApiError> {
    body.map(|Json(p)| p)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Handler for `PUT /api/credentials/{userId}`.
pub async fn put_credential_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
    body: Result<Json<CredentialRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let request = payload(body)?;
    validate_user_id(&user_id)?;
    let endpoint = validate_endpoint(&request.endpoint, state.admin.allow_insecure_endpoints)?;
    let api_key = request.api_key.as_deref().unwrap_or_default().trim();

    state
        .bridge
        .resolver()
        .provision(&user_id, endpoint, api_key)
        .await
        .map_err(|e| ApiError::InternalServerError(format!("user {user_id}: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/credentials/test`.
pub async fn test_credential_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CredentialRequest>, JsonRejection>,
) -> Result<Json<ProbeResponse>, ApiError> {
    let request = payload(body)?;
    let endpoint = validate_endpoint(&request.endpoint, state.admin.allow_insecure_endpoints)?;
    let api_key = request.api_key.as_deref().unwrap_or_default().trim();

    let response = match state.bridge.forwarder().probe(endpoint, api_key).await {
        Ok(reply) => ProbeResponse {
            ok: true,
            reply: Some(reply),
            message: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "credential probe failed");
            ProbeResponse {
                ok: false,
                reply: None,
                message: Some("Could not get a reply from the model with these settings.".to_string()),
            }
        }
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_bounds() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("amzn1.ask.account.X").is_ok());
        assert!(validate_user_id(&"u".repeat(MAX_USER_ID_CHARS)).is_ok());
        assert!(validate_user_id(&"u".repeat(MAX_USER_ID_CHARS + 1)).is_err());
    }

    #[test]
    fn endpoint_requires_https_unless_allowed() {
        assert!(validate_endpoint("http://localhost:11434/api/chat", false).is_err());
        assert_eq!(
            validate_endpoint(" http://localhost:11434/api/chat ", true).unwrap(),
            "http://localhost:11434/api/chat"
        );
        assert!(validate_endpoint(
            "https://api.example.com/v1/chat/completions/model_name=gpt-4o",
            false
        )
        .is_ok());
    }

    #[test]
    fn endpoint_rejects_garbage_and_oversize() {
        assert!(validate_endpoint("", true).is_err());
        assert!(validate_endpoint("   ", true).is_err());
        assert!(validate_endpoint("ftp://example.com", true).is_err());
        let long = format!("https://example.com/{}", "a".repeat(MAX_ENDPOINT_CHARS));
        assert!(validate_endpoint(&long, false).is_err());
    }
}
