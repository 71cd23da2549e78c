//! Overdue and grace-period rules.
//!
//! Everything here is pure: the caller supplies `now`, so the same inputs
//! always produce the same [`Assessment`].

use chrono::{DateTime, Duration, Utc};

use crate::account::{Account, BillingCycle, BillingStatusUpdate};
use crate::config::SweepConfig;
use crate::errors::{LapseError, LapseResult};
use crate::notify::AlertKind;

const SECONDS_PER_DAY: i64 = 86_400;

/// Grace periods and alert milestones applied by the sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPolicy {
    pub monthly_grace_days: i64,
    pub annual_grace_days: i64,
    /// Remaining grace days at which an alert goes out. Matched exactly.
    pub alert_milestones: Vec<i64>,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            monthly_grace_days: 30,
            annual_grace_days: 365,
            alert_milestones: vec![7, 3, 1, 0],
        }
    }
}

impl From<&SweepConfig> for BillingPolicy {
    fn from(config: &SweepConfig) -> Self {
        Self {
            monthly_grace_days: config.monthly_grace_days,
            annual_grace_days: config.annual_grace_days,
            alert_milestones: config.alert_milestones.clone(),
        }
    }
}

/// Whole days elapsed since `next_billing_date`, floored.
///
/// Negative before the billing date.
pub fn days_overdue(now: DateTime<Utc>, next_billing_date: DateTime<Utc>) -> i64 {
    (now - next_billing_date)
        .num_seconds()
        .div_euclid(SECONDS_PER_DAY)
}

/// Where an account stands relative to its billing date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    /// Not past the billing date.
    Current,
    /// Past due but still inside the grace period.
    WithinGrace {
        days_overdue: i64,
        grace_period_end: DateTime<Utc>,
        alert: Option<AlertKind>,
    },
    /// Grace period has run out; access must be blocked.
    Expired {
        days_overdue: i64,
        grace_period_end: DateTime<Utc>,
        reason: String,
    },
}

impl Assessment {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Assessment::Expired { .. })
    }

    /// The alert this assessment calls for, if any.
    pub fn alert_kind(&self) -> Option<AlertKind> {
        match self {
            Assessment::Current => None,
            Assessment::WithinGrace { alert, .. } => *alert,
            Assessment::Expired { .. } => Some(AlertKind::Blocked),
        }
    }

    /// Fields to persist for this assessment.
    pub fn status_update(&self) -> BillingStatusUpdate {
        match self {
            Assessment::Current => BillingStatusUpdate {
                payment_overdue_days: 0,
                grace_period_end: None,
                access_blocked: false,
                access_blocked_reason: None,
                deactivate_plans: false,
            },
            Assessment::WithinGrace {
                days_overdue,
                grace_period_end,
                ..
            } => BillingStatusUpdate {
                payment_overdue_days: *days_overdue,
                grace_period_end: Some(*grace_period_end),
                access_blocked: false,
                access_blocked_reason: None,
                deactivate_plans: false,
            },
            Assessment::Expired {
                days_overdue,
                grace_period_end,
                reason,
            } => BillingStatusUpdate {
                payment_overdue_days: *days_overdue,
                grace_period_end: Some(*grace_period_end),
                access_blocked: true,
                access_blocked_reason: Some(reason.clone()),
                deactivate_plans: true,
            },
        }
    }
}

impl BillingPolicy {
    pub fn grace_period_days(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.monthly_grace_days,
            BillingCycle::Annual => self.annual_grace_days,
        }
    }

    /// Assess one account at `now`.
    ///
    /// Accounts without a next billing date are treated as current; the
    /// billable filter never returns them.
    ///
    /// Fails with `InvalidRecord` when the grace period end falls outside
    /// the representable date range.
    pub fn assess(&self, account: &Account, now: DateTime<Utc>) -> LapseResult<Assessment> {
        let Some(next_billing_date) = account.next_billing_date else {
            return Ok(Assessment::Current);
        };

        let days_overdue = days_overdue(now, next_billing_date);
        if days_overdue <= 0 {
            return Ok(Assessment::Current);
        }

        let grace_days = self.grace_period_days(account.billing_cycle);
        let grace_period_end = Duration::try_days(grace_days)
            .and_then(|grace| next_billing_date.checked_add_signed(grace))
            .ok_or_else(|| {
                LapseError::InvalidRecord(format!(
                    "grace period of {grace_days} days from {next_billing_date} is out of range"
                ))
            })?;

        // Day granularity: the last grace day stays open until it ends.
        if days_overdue <= grace_days {
            let remaining = grace_days - days_overdue;
            let alert = self
                .alert_milestones
                .contains(&remaining)
                .then(|| AlertKind::for_remaining_days(remaining));

            Ok(Assessment::WithinGrace {
                days_overdue,
                grace_period_end,
                alert,
            })
        } else {
            Ok(Assessment::Expired {
                days_overdue,
                grace_period_end,
                reason: format!(
                    "Access blocked: payment overdue by {days_overdue} days; \
                     the {grace_days}-day grace period ended on {}",
                    grace_period_end.format("%Y-%m-%d")
                ),
            })
        }
    }
}
