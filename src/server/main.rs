use std::error::Error;
use std::net::SocketAddr;

use lapse::billing::BillingPolicy;
use lapse::config::init_config;
use lapse::logging::init_tracing;
use lapse::notify::notifier_from_config;
use lapse::server::{build_router, AppState, Database};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = init_config()?;
    init_tracing(&config.logging)?;

    let db = Database::new().await?;
    let notifier = notifier_from_config(&config.alerts)?;
    let policy = BillingPolicy::from(&config.sweep);

    let mut state = AppState::with_database(db.clone(), notifier.clone(), policy.clone());
    if config.auth.enabled {
        state = state.with_trigger_token(config.auth.trigger_token.clone());
    } else {
        warn!("Sweep trigger authentication is disabled");
    }

    #[cfg(feature = "background-jobs")]
    let _scheduler = if config.jobs.enabled {
        use lapse::jobs::{JobConfig, JobScheduler};

        let scheduler =
            JobScheduler::new(db.clone(), notifier, policy, JobConfig::from(&config.jobs)).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        None
    };

    if !cfg!(feature = "background-jobs") && config.jobs.enabled {
        warn!("jobs.enabled is set but the 'background-jobs' feature is not compiled in");
    }

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("Lapse listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
