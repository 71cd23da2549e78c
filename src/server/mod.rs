// src/server/mod.rs

//! Server-side components for Lapse.
//!
//! This module contains:
//! - `database`  → `AccountStore` over SQLite/Postgres
//! - `handlers`  → Axum handlers for the sweep trigger and health check
//! - `auth`      → Bearer-token guard for the sweep trigger
//! - `logging`   → Request logging middleware
//! - `routes`    → Router builder

pub mod auth;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;

pub use database::Database;
pub use handlers::{health_handler, sweep_handler, AppState, SweepResponse};
pub use routes::build_router;
