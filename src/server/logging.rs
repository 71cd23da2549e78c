//! Request logging middleware for the Lapse server.
//!
//! Every request gets a unique id and a tracing span, and the id is echoed
//! back in the `X-Request-Id` response header. The span carries the response
//! status and latency; the sweep handler adds its counts to the same span, so
//! one completed-request line reports what a triggered sweep did.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use lapse::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{field::Empty, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        status = Empty,
        duration_ms = Empty,
        sweep.processed = Empty,
        sweep.blocked = Empty,
        sweep.alerted = Empty,
        sweep.failed = Empty,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    span.record("status", response.status().as_u16());
    span.record("duration_ms", start.elapsed().as_millis() as u64);
    span.in_scope(|| info!("Request completed"));

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Attach a sweep's counts to the current request span.
///
/// Outside the request middleware this is a no-op.
pub fn record_sweep_outcome(processed: u32, blocked: u32, alerted: u32, failed: u32) {
    let span = Span::current();
    span.record("sweep.processed", processed);
    span.record("sweep.blocked", blocked);
    span.record("sweep.alerted", alerted);
    span.record("sweep.failed", failed);
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub service: String,
    pub version: String,
    /// Present when the account store is a SQL database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
}

/// Database health status.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    /// sqlite or postgres
    pub db_type: String,
}

impl HealthResponse {
    pub fn healthy(db_connected: bool, db_type: Option<&str>) -> Self {
        Self {
            status: if db_connected { "healthy" } else { "degraded" }.to_string(),
            service: "lapse".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: db_type.map(|db_type| DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn recording_sweep_outcome_outside_a_request_is_harmless() {
        record_sweep_outcome(2, 1, 1, 0);
    }

    #[test]
    fn health_response_healthy() {
        let health = HealthResponse::healthy(true, Some("sqlite"));
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "lapse");
        assert!(health.database.unwrap().connected);
    }

    #[test]
    fn health_response_degraded() {
        let health = HealthResponse::healthy(false, Some("postgres"));
        assert_eq!(health.status, "degraded");
    }

    #[test]
    fn health_without_database_omits_section() {
        let json = serde_json::to_value(HealthResponse::healthy(true, None)).unwrap();
        assert!(json.get("database").is_none());
    }
}
