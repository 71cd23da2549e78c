use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::auth::require_trigger_token;
use crate::server::handlers::{health_handler, sweep_handler, AppState};
use crate::server::logging::request_logging_middleware;

/// Build the application router for the Lapse server.
///
/// # Routes
///
/// - `POST /sweep` - Run an overdue-payment sweep (bearer token when configured)
/// - `GET /health` - Liveness and database status
pub fn build_router(state: AppState) -> Router {
    let trigger = Router::new()
        .route("/sweep", post(sweep_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_trigger_token,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(trigger)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
