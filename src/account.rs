//! Account records as seen by the sweeper.
//!
//! Accounts are provisioned and owned elsewhere. The sweeper only reads them
//! and writes back the billing-status fields described by
//! [`BillingStatusUpdate`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::LapseError;

/// How often an account is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Annual,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Annual => "annual",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = LapseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "annual" | "yearly" => Ok(BillingCycle::Annual),
            other => Err(LapseError::InvalidRecord(format!(
                "unknown billing cycle '{other}'"
            ))),
        }
    }
}

/// A billable account and its current billing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub billing_cycle: BillingCycle,
    pub monthly_plan_active: bool,
    pub annual_plan_active: bool,
    pub payment_overdue_days: i64,
    pub grace_period_end: Option<DateTime<Utc>>,
    pub access_blocked: bool,
    pub access_blocked_reason: Option<String>,
}

impl Account {
    /// True if any paid plan is active on the account.
    pub fn has_active_plan(&self) -> bool {
        self.monthly_plan_active || self.annual_plan_active
    }

    /// Apply a status update in place, exactly as a store would persist it.
    pub fn apply(&mut self, update: &BillingStatusUpdate) {
        self.payment_overdue_days = update.payment_overdue_days;
        self.grace_period_end = update.grace_period_end;
        self.access_blocked = update.access_blocked;
        self.access_blocked_reason = update.access_blocked_reason.clone();
        if update.deactivate_plans {
            self.monthly_plan_active = false;
            self.annual_plan_active = false;
        }
    }
}

/// The billing-status fields written for one account during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingStatusUpdate {
    pub payment_overdue_days: i64,
    pub grace_period_end: Option<DateTime<Utc>>,
    pub access_blocked: bool,
    pub access_blocked_reason: Option<String>,
    /// Clear every plan-active flag.
    pub deactivate_plans: bool,
}

/// Selection criteria for [`crate::store::AccountStore::query`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountFilter {
    /// Only accounts with at least one active plan.
    pub require_active_plan: bool,
    /// Only accounts with a known next billing date.
    pub require_billing_date: bool,
}

impl AccountFilter {
    /// Accounts the overdue sweep looks at.
    pub fn billable() -> Self {
        Self {
            require_active_plan: true,
            require_billing_date: true,
        }
    }

    pub fn matches(&self, account: &Account) -> bool {
        (!self.require_active_plan || account.has_active_plan())
            && (!self.require_billing_date || account.next_billing_date.is_some())
    }
}
