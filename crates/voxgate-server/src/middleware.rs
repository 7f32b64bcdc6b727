use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;

/// Middleware guarding the provisioning API with the configured admin
/// bearer token.
///
/// Both tokens are hashed before comparison so the comparison always runs
/// over 32 bytes regardless of what the caller sent.
pub async fn admin_auth_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let state = req
        .extensions()
        .get::<Arc<AppState>>()
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?
        .clone();

    let Some(expected) = state.admin.token.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .is_some_and(|token| !token.is_empty() && token_matches(token, expected));

    if !authorized {
        tracing::warn!(path = %req.uri().path(), "rejected provisioning request with missing or invalid admin token");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

fn token_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}
