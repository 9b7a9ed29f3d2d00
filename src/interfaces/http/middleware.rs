//! Bearer API key authentication for the tool endpoints

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::common::ApiResponse;

/// Authentication state: the digest of the configured API key.
#[derive(Clone)]
pub struct AuthState {
    key_digest: Arc<[u8; 32]>,
}

impl AuthState {
    pub fn new(api_key: &str) -> Self {
        Self {
            key_digest: Arc::new(digest(api_key)),
        }
    }

    /// Digests are compared instead of raw strings so the comparison time
    /// does not depend on how much of the key matched.
    fn accepts(&self, presented: &str) -> bool {
        let presented = digest(presented);
        presented
            .iter()
            .zip(self.key_digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

fn extract_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ApiResponse::<()>::error(message)),
    )
        .into_response()
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(auth_header) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    else {
        debug!("Tool request without Authorization header");
        return unauthorized("Missing bearer token");
    };
    let Some(token) = extract_token(auth_header) else {
        return unauthorized("Authorization must use the Bearer scheme");
    };
    if !auth.accepts(token) {
        debug!("Tool request with wrong API key");
        return unauthorized("Invalid API key");
    }
    next.run(request).await
}
