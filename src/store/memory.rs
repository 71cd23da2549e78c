use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::account::{Account, AccountFilter, BillingStatusUpdate};
use crate::errors::{LapseError, LapseResult};
use crate::store::AccountStore;

/// In-memory account store.
///
/// Accounts are kept in id order so query results are deterministic.
/// Failures can be injected per account id, or for the whole query, to
/// exercise the sweep's error handling.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: Mutex<BTreeMap<String, Account>>,
    failing_updates: Mutex<HashSet<String>>,
    fail_queries: Mutex<bool>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.accounts.lock() {
            map.extend(accounts.into_iter().map(|a| (a.id.clone(), a)));
        }
        store
    }

    /// Insert or replace an account.
    pub fn insert(&self, account: Account) -> LapseResult<()> {
        let mut map = self.lock_accounts()?;
        map.insert(account.id.clone(), account);
        Ok(())
    }

    /// Fetch an account by id.
    pub fn get(&self, id: &str) -> LapseResult<Option<Account>> {
        Ok(self.lock_accounts()?.get(id).cloned())
    }

    /// All accounts, in id order.
    pub fn snapshot(&self) -> LapseResult<Vec<Account>> {
        Ok(self.lock_accounts()?.values().cloned().collect())
    }

    /// Make every subsequent update of `id` fail.
    pub fn fail_updates_for(&self, id: &str) -> LapseResult<()> {
        self.failing_updates
            .lock()
            .map_err(|_| LapseError::StoreError("failed to acquire failure-set lock".into()))?
            .insert(id.to_string());
        Ok(())
    }

    /// Make every subsequent query fail (or succeed again).
    pub fn set_query_failure(&self, fail: bool) -> LapseResult<()> {
        *self
            .fail_queries
            .lock()
            .map_err(|_| LapseError::StoreError("failed to acquire query-flag lock".into()))? =
            fail;
        Ok(())
    }

    fn lock_accounts(&self) -> LapseResult<std::sync::MutexGuard<'_, BTreeMap<String, Account>>> {
        self.accounts
            .lock()
            .map_err(|_| LapseError::StoreError("failed to acquire accounts lock".into()))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccounts {
    async fn query(&self, filter: &AccountFilter) -> LapseResult<Vec<Account>> {
        let fail = *self
            .fail_queries
            .lock()
            .map_err(|_| LapseError::StoreError("failed to acquire query-flag lock".into()))?;
        if fail {
            return Err(LapseError::StoreError("account query unavailable".into()));
        }

        Ok(self
            .lock_accounts()?
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, update: &BillingStatusUpdate) -> LapseResult<()> {
        let failing = self
            .failing_updates
            .lock()
            .map_err(|_| LapseError::StoreError("failed to acquire failure-set lock".into()))?
            .contains(id);
        if failing {
            return Err(LapseError::StoreError(format!(
                "update rejected for account {id}"
            )));
        }

        let mut map = self.lock_accounts()?;
        let account = map
            .get_mut(id)
            .ok_or_else(|| LapseError::AccountNotFound(id.to_string()))?;
        account.apply(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::BillingCycle;
    use chrono::Utc;

    fn account(id: &str, active: bool) -> Account {
        Account {
            id: id.to_string(),
            next_billing_date: Some(Utc::now()),
            billing_cycle: BillingCycle::Monthly,
            monthly_plan_active: active,
            annual_plan_active: false,
            payment_overdue_days: 0,
            grace_period_end: None,
            access_blocked: false,
            access_blocked_reason: None,
        }
    }

    fn clear() -> BillingStatusUpdate {
        BillingStatusUpdate {
            payment_overdue_days: 0,
            grace_period_end: None,
            access_blocked: false,
            access_blocked_reason: None,
            deactivate_plans: false,
        }
    }

    #[tokio::test]
    async fn query_applies_filter() {
        let store = InMemoryAccounts::with_accounts([account("a", true), account("b", false)]);
        let found = store.query(&AccountFilter::billable()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");

        let all = store.query(&AccountFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn update_unknown_account_fails() {
        let store = InMemoryAccounts::new();
        let err = store.update("missing", &clear()).await.unwrap_err();
        assert!(matches!(err, LapseError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = InMemoryAccounts::with_accounts([account("a", true)]);
        store.fail_updates_for("a").unwrap();
        assert!(store.update("a", &clear()).await.is_err());

        store.set_query_failure(true).unwrap();
        assert!(store.query(&AccountFilter::billable()).await.is_err());
        store.set_query_failure(false).unwrap();
        assert!(store.query(&AccountFilter::billable()).await.is_ok());
    }
}
