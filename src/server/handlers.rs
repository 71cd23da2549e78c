use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::billing::BillingPolicy;
use crate::errors::{LapseError, LapseResult};
use crate::jobs::{run_overdue_sweep, SweepSummary};
use crate::notify::Notifier;
use crate::server::database::Database;
use crate::server::logging::{record_sweep_outcome, HealthResponse};
use crate::store::AccountStore;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub notifier: Arc<dyn Notifier>,
    pub policy: Arc<BillingPolicy>,
    /// Bearer token required on `/sweep`; `None` leaves it open
    pub trigger_token: Option<Arc<str>>,
    /// SQL backend, when the store is one; used for health reporting
    pub database: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        policy: BillingPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            policy: Arc::new(policy),
            trigger_token: None,
            database: None,
        }
    }

    /// State backed by a SQL database, which also serves health checks.
    pub fn with_database(
        database: Arc<Database>,
        notifier: Arc<dyn Notifier>,
        policy: BillingPolicy,
    ) -> Self {
        let store: Arc<dyn AccountStore> = database.clone();
        Self {
            database: Some(database),
            ..Self::new(store, notifier, policy)
        }
    }

    pub fn with_trigger_token(mut self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.trigger_token = Some(Arc::from(token));
        self
    }
}

/// Standard error response body for HTTP errors.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Map `LapseError` into an HTTP response, so handlers can return
/// `LapseResult<Json<T>>`.
impl IntoResponse for LapseError {
    fn into_response(self) -> Response {
        let status = match self {
            LapseError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LapseError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            LapseError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            LapseError::NotificationError(_) => StatusCode::BAD_GATEWAY,
            LapseError::ConfigError(_)
            | LapseError::StoreError(_)
            | LapseError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Response body for a completed sweep.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SweepResponse {
    pub success: bool,
    pub processed: u32,
    pub blocked: u32,
    pub alerted: u32,
    pub failed: u32,
}

impl From<SweepSummary> for SweepResponse {
    fn from(summary: SweepSummary) -> Self {
        Self {
            success: true,
            processed: summary.processed,
            blocked: summary.blocked,
            alerted: summary.alerted,
            failed: summary.failed,
        }
    }
}

/// Handler for triggering an overdue-payment sweep.
///
/// Takes no arguments. Returns the sweep counts, or a 500 if the account
/// list could not be fetched.
pub async fn sweep_handler(State(state): State<AppState>) -> LapseResult<Json<SweepResponse>> {
    let now = Utc::now();
    info!("Sweep triggered over HTTP at {}", now);

    let summary = run_overdue_sweep(
        state.store.as_ref(),
        state.notifier.as_ref(),
        &state.policy,
        now,
    )
    .await
    .map_err(|e| {
        warn!("Triggered sweep failed: {e}");
        LapseError::ServerError(e.to_string())
    })?;

    record_sweep_outcome(
        summary.processed,
        summary.blocked,
        summary.alerted,
        summary.failed,
    );

    Ok(Json(SweepResponse::from(summary)))
}

/// Liveness check.
///
/// Reports `degraded` when a configured database does not answer.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = match &state.database {
        Some(db) => {
            let connected = db.health_check().await.is_ok();
            HealthResponse::healthy(connected, Some(db.db_type()))
        }
        None => HealthResponse::healthy(true, None),
    };
    Json(response)
}
