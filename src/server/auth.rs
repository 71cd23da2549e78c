//! Bearer-token guard for the sweep trigger.
//!
//! The sweep writes to every billable account, so its trigger is the only
//! privileged entry point. When a trigger token is configured, requests must
//! carry `Authorization: Bearer <token>`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::errors::LapseError;
use crate::server::handlers::AppState;

/// Extract the token from a `Bearer` authorization header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

/// Compare tokens without leaking where they differ.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Middleware rejecting requests without the configured trigger token.
pub async fn require_trigger_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.trigger_token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    let rejection = match provided {
        None => Some("missing bearer token"),
        Some(token) if tokens_match(token, expected) => None,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected sweep trigger with invalid token");
            Some("invalid trigger token")
        }
    };

    match rejection {
        None => next.run(request).await,
        Some(reason) => LapseError::Unauthorized(reason.to_string()).into_response(),
    }
}
