//! Structured logging for Lapse.
//!
//! Sets up the global `tracing` subscriber and records account billing-state
//! changes as structured events for audit and debugging.

use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::errors::{LapseError, LapseResult};

/// Account billing-state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    /// Account is current and needed no change
    Checked,
    /// Overdue state was cleared after payment
    Reset,
    /// Account is overdue but inside its grace period
    Overdue,
    /// Grace period expired and access was blocked
    Blocked,
    /// Persisting the account's status failed
    UpdateFailed,
    /// The account's billing data could not be assessed
    Rejected,
}

impl std::fmt::Display for AccountEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountEvent::Checked => "checked",
            AccountEvent::Reset => "reset",
            AccountEvent::Overdue => "overdue",
            AccountEvent::Blocked => "blocked",
            AccountEvent::UpdateFailed => "update_failed",
            AccountEvent::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Log an account billing-state change.
///
/// # Arguments
///
/// * `event` - The type of account event
/// * `account_id` - The account ID
/// * `details` - Optional additional details about the event
pub fn log_account_event(event: AccountEvent, account_id: &str, details: Option<&str>) {
    let span = info_span!(
        "account_event",
        event = %event,
        account_id = %account_id,
    );
    let _enter = span.enter();

    match event {
        AccountEvent::UpdateFailed => {
            error!(reason = %details.unwrap_or("unknown"), "Account update failed");
        }
        AccountEvent::Rejected => {
            error!(reason = %details.unwrap_or("unknown"), "Account could not be assessed");
        }
        AccountEvent::Blocked => {
            if let Some(d) = details {
                warn!(details = %d, "Account event occurred");
            } else {
                warn!("Account event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "Account event occurred");
            } else {
                info!("Account event occurred");
            }
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> LapseResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .map_err(|e| LapseError::ConfigError(format!("invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = if config.json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LapseError::ConfigError(format!("failed to install subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_snake_case() {
        assert_eq!(AccountEvent::UpdateFailed.to_string(), "update_failed");
        assert_eq!(AccountEvent::Rejected.to_string(), "rejected");
        assert_eq!(AccountEvent::Blocked.to_string(), "blocked");
    }

    #[test]
    fn logging_without_subscriber_does_not_panic() {
        log_account_event(AccountEvent::Overdue, "acct-1", Some("3 days overdue"));
        log_account_event(AccountEvent::UpdateFailed, "acct-2", None);
    }
}
