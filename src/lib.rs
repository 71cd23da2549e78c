//! Lapse - overdue-payment sweeper for subscription accounts
//!
//! Lapse walks every account with an active paid plan, works out how many
//! days its payment is overdue, and moves it through
//! `current → overdue-alerting → blocked` according to a per-cycle grace
//! period. Reminder alerts go out at fixed remaining-day milestones.
//!
//! # Features
//!
//! - `server` - HTTP trigger endpoint and SQL account store. Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `background-jobs` - Run the sweep on an in-process cron schedule.
//!
//! # Example
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use lapse::billing::BillingPolicy;
//! use lapse::jobs::run_overdue_sweep;
//! use lapse::notify::LogNotifier;
//! use lapse::store::InMemoryAccounts;
//!
//! let store = InMemoryAccounts::with_accounts(accounts);
//! let summary = run_overdue_sweep(&store, &LogNotifier, &BillingPolicy::default(), Utc::now()).await?;
//! println!("{} accounts blocked", summary.blocked);
//! ```

// Core modules (always available)
pub mod account;
pub mod billing;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod notify;
pub mod store;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
