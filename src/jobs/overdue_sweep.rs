//! Overdue-payment sweep.
//!
//! One pass over every billable account: reset accounts that are current,
//! track accounts inside their grace period, and block accounts whose grace
//! period has run out.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountFilter};
use crate::billing::{Assessment, BillingPolicy};
use crate::logging::{log_account_event, AccountEvent};
use crate::notify::{Alert, AlertKind, Notifier};
use crate::store::AccountStore;

use super::JobError;

/// Counts reported by a sweep.
///
/// `processed` counts accounts whose status update was persisted; accounts
/// that could not be assessed or whose update failed are counted in
/// `failed` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub processed: u32,
    pub blocked: u32,
    pub alerted: u32,
    pub failed: u32,
}

/// Run one sweep at `now`.
///
/// Fails only if the billable accounts cannot be fetched. Per-account
/// failures are logged and counted, and the sweep moves on.
pub async fn run_overdue_sweep(
    store: &dyn AccountStore,
    notifier: &dyn Notifier,
    policy: &BillingPolicy,
    now: DateTime<Utc>,
) -> Result<SweepSummary, JobError> {
    debug!("Running overdue-payment sweep at {}", now);

    let accounts = store
        .query(&AccountFilter::billable())
        .await
        .map_err(|e| JobError::QueryFailure(e.to_string()))?;

    debug!("Sweep found {} billable accounts", accounts.len());

    let mut summary = SweepSummary::default();

    for account in accounts {
        let assessment = match policy.assess(&account, now) {
            Ok(assessment) => assessment,
            Err(e) => {
                summary.failed += 1;
                log_account_event(AccountEvent::Rejected, &account.id, Some(&e.to_string()));
                continue;
            }
        };

        if let Err(e) = store.update(&account.id, &assessment.status_update()).await {
            summary.failed += 1;
            log_account_event(
                AccountEvent::UpdateFailed,
                &account.id,
                Some(&e.to_string()),
            );
            continue;
        }
        summary.processed += 1;

        record_transition(&account, &assessment);
        if assessment.is_blocking() {
            summary.blocked += 1;
        }

        if let Some(kind) = assessment.alert_kind() {
            let message = alert_message(kind, &assessment, policy, &account);
            let alert = Alert::new(&account.id, kind, message);
            match notifier.send_alert(&alert).await {
                Ok(()) => summary.alerted += 1,
                Err(e) => warn!(
                    account_id = %account.id,
                    kind = %kind,
                    error = %e,
                    "Failed to deliver billing alert"
                ),
            }
        }
    }

    info!(
        processed = summary.processed,
        blocked = summary.blocked,
        alerted = summary.alerted,
        failed = summary.failed,
        "Overdue-payment sweep finished"
    );

    Ok(summary)
}

fn record_transition(account: &Account, assessment: &Assessment) {
    match assessment {
        Assessment::Current => {
            if account.payment_overdue_days > 0 || account.access_blocked {
                log_account_event(AccountEvent::Reset, &account.id, None);
            } else {
                log_account_event(AccountEvent::Checked, &account.id, None);
            }
        }
        Assessment::WithinGrace { days_overdue, .. } => {
            let details = format!("{days_overdue} days overdue");
            log_account_event(AccountEvent::Overdue, &account.id, Some(&details));
        }
        Assessment::Expired { reason, .. } => {
            log_account_event(AccountEvent::Blocked, &account.id, Some(reason));
        }
    }
}

fn alert_message(
    kind: AlertKind,
    assessment: &Assessment,
    policy: &BillingPolicy,
    account: &Account,
) -> String {
    match assessment {
        Assessment::WithinGrace {
            days_overdue,
            grace_period_end,
            ..
        } => {
            let remaining = policy.grace_period_days(account.billing_cycle) - days_overdue;
            match kind {
                AlertKind::BlockedWarning => format!(
                    "Payment is {days_overdue} days overdue. Access will be blocked after today ({}).",
                    grace_period_end.format("%Y-%m-%d")
                ),
                _ => format!(
                    "Payment is {days_overdue} days overdue. {remaining} day(s) left before access is blocked on {}.",
                    grace_period_end.format("%Y-%m-%d")
                ),
            }
        }
        Assessment::Expired { reason, .. } => reason.clone(),
        Assessment::Current => String::new(),
    }
}
