//! Background jobs for Lapse.
//!
//! The overdue-payment sweep is always available as a plain async function
//! so the HTTP trigger can call it. The cron scheduler that runs it
//! periodically requires the `background-jobs` feature.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lapse::jobs::{JobScheduler, JobConfig};
//!
//! let scheduler = JobScheduler::new(store, notifier, policy, JobConfig::default()).await?;
//! scheduler.start().await?;
//! ```

mod overdue_sweep;

pub use overdue_sweep::{run_overdue_sweep, SweepSummary};

#[cfg(feature = "background-jobs")]
pub use scheduler::{JobConfig, JobScheduler};

/// Errors that can occur in background jobs.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The billable accounts could not be fetched; nothing was swept.
    #[error("Account query failed: {0}")]
    QueryFailure(String),

    #[error("Scheduler error: {0}")]
    SchedulerError(String),
}

#[cfg(feature = "background-jobs")]
mod scheduler {
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
    use tracing::{error, info};

    use super::{run_overdue_sweep, JobError, SweepSummary};
    use crate::billing::BillingPolicy;
    use crate::config::JobsConfig;
    use crate::notify::Notifier;
    use crate::store::AccountStore;

    /// Configuration for background jobs.
    #[derive(Debug, Clone)]
    pub struct JobConfig {
        /// Cron expression for the overdue sweep (default: daily at 06:00)
        pub sweep_cron: String,
    }

    impl Default for JobConfig {
        fn default() -> Self {
            Self {
                sweep_cron: "0 0 6 * * *".to_string(),
            }
        }
    }

    impl From<&JobsConfig> for JobConfig {
        fn from(config: &JobsConfig) -> Self {
            Self {
                sweep_cron: config.sweep_cron.clone(),
            }
        }
    }

    /// Runs the overdue sweep on a cron schedule.
    pub struct JobScheduler {
        scheduler: TokioJobScheduler,
        store: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        policy: Arc<BillingPolicy>,
        config: JobConfig,
    }

    impl JobScheduler {
        pub async fn new(
            store: Arc<dyn AccountStore>,
            notifier: Arc<dyn Notifier>,
            policy: BillingPolicy,
            config: JobConfig,
        ) -> Result<Self, JobError> {
            let scheduler = TokioJobScheduler::new()
                .await
                .map_err(|e| JobError::SchedulerError(e.to_string()))?;

            Ok(Self {
                scheduler,
                store,
                notifier,
                policy: Arc::new(policy),
                config,
            })
        }

        /// Register the sweep job and start the scheduler.
        pub async fn start(&self) -> Result<(), JobError> {
            info!("Starting Lapse job scheduler");

            self.add_sweep_job().await?;

            self.scheduler
                .start()
                .await
                .map_err(|e| JobError::SchedulerError(e.to_string()))?;

            info!("Lapse job scheduler started successfully");

            Ok(())
        }

        pub async fn shutdown(&mut self) -> Result<(), JobError> {
            info!("Shutting down Lapse job scheduler");
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| JobError::SchedulerError(e.to_string()))?;
            Ok(())
        }

        async fn add_sweep_job(&self) -> Result<(), JobError> {
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let policy = Arc::clone(&self.policy);

            let job = Job::new_async(self.config.sweep_cron.as_str(), move |_uuid, _l| {
                let store = Arc::clone(&store);
                let notifier = Arc::clone(&notifier);
                let policy = Arc::clone(&policy);
                Box::pin(async move {
                    let now = Utc::now();
                    info!("Running scheduled overdue sweep at {}", now);

                    match run_overdue_sweep(store.as_ref(), notifier.as_ref(), &policy, now)
                        .await
                    {
                        Ok(summary) => {
                            if summary.blocked > 0 || summary.failed > 0 {
                                info!(
                                    "Overdue sweep: {} blocked, {} failed",
                                    summary.blocked, summary.failed
                                );
                            }
                        }
                        Err(e) => {
                            error!("Overdue sweep failed: {}", e);
                        }
                    }
                })
            })
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

            self.scheduler
                .add(job)
                .await
                .map_err(|e| JobError::SchedulerError(e.to_string()))?;

            info!(
                "Added overdue sweep job (schedule: {})",
                self.config.sweep_cron
            );

            Ok(())
        }

        /// Run the sweep immediately (manual triggers and tests).
        pub async fn run_sweep_now(&self, now: DateTime<Utc>) -> Result<SweepSummary, JobError> {
            run_overdue_sweep(self.store.as_ref(), self.notifier.as_ref(), &self.policy, now).await
        }
    }

}
