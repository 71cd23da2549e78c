//! Account storage seam.
//!
//! Implemented by the SQL-backed `server::Database` and by the in-memory
//! [`memory::InMemoryAccounts`]. Only the sweep job holds a store;
//! user-facing request paths never touch it.

use async_trait::async_trait;

use crate::account::{Account, AccountFilter, BillingStatusUpdate};
use crate::errors::LapseResult;

pub mod memory;

pub use memory::InMemoryAccounts;

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch every account matching `filter`.
    async fn query(&self, filter: &AccountFilter) -> LapseResult<Vec<Account>>;

    /// Persist billing-status fields for one account.
    ///
    /// Fails with `LapseError::AccountNotFound` if `id` does not exist.
    async fn update(&self, id: &str, update: &BillingStatusUpdate) -> LapseResult<()>;
}
