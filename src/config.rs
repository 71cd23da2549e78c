//! Configuration system for Lapse.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LAPSE_SERVER_HOST` - Server bind address
//! - `LAPSE_SERVER_PORT` - Server port
//! - `LAPSE_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `LAPSE_DATABASE_URL` - Database connection URL
//! - `LAPSE_DATABASE_MAX_CONNECTIONS` - Pool size
//! - `LAPSE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `LAPSE_LOG_JSON` - Emit JSON log lines
//! - `LAPSE_MONTHLY_GRACE_DAYS` - Grace period for monthly plans
//! - `LAPSE_ANNUAL_GRACE_DAYS` - Grace period for annual plans
//! - `LAPSE_ALERT_MILESTONES` - Comma-separated remaining-day milestones, e.g. `7,3,1,0`
//! - `LAPSE_JOBS_ENABLED` - Run the sweep on an in-process schedule
//! - `LAPSE_SWEEP_CRON` - Cron expression for the scheduled sweep
//! - `LAPSE_ALERT_WEBHOOK_URL` - Deliver alerts to this URL instead of logging them
//! - `LAPSE_ALERT_TIMEOUT_SECS` - Webhook request timeout
//! - `LAPSE_AUTH_ENABLED` - Require a bearer token on the sweep trigger
//! - `LAPSE_TRIGGER_TOKEN` - The bearer token

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LapseError, LapseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<LapseConfig> = OnceLock::new();

/// Longest grace period accepted for either billing cycle.
pub const MAX_GRACE_DAYS: i64 = 3650;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LapseConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Grace periods and alert milestones
    pub sweep: SweepConfig,
    /// In-process schedule (requires "background-jobs" feature)
    pub jobs: JobsConfig,
    pub alerts: AlertConfig,
    /// Trigger endpoint authentication
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    pub sqlite_url: String,
    pub postgres_url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://lapse.db".to_string(),
            postgres_url: "postgres://localhost/lapse".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for the configured database type.
    pub fn url(&self) -> &str {
        match self.db_type.as_str() {
            "postgres" => &self.postgres_url,
            _ => &self.sqlite_url,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Emit structured JSON instead of human-readable lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Overdue rules applied by the sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub monthly_grace_days: i64,
    pub annual_grace_days: i64,
    /// Remaining grace days at which an alert is sent (exact match)
    pub alert_milestones: Vec<i64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            monthly_grace_days: 30,
            annual_grace_days: 365,
            alert_milestones: vec![7, 3, 1, 0],
        }
    }
}

/// In-process sweep schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub enabled: bool,
    /// Six-field cron expression (default: daily at 06:00 UTC)
    pub sweep_cron: String,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sweep_cron: "0 0 6 * * *".to_string(),
        }
    }
}

/// Alert delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Alerts are POSTed here when set; otherwise they are only logged
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// Sweep trigger authentication.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Shared bearer token; supply through `LAPSE_TRIGGER_TOKEN`
    pub trigger_token: String,
}

fn parse_milestones(raw: &str) -> Option<Vec<i64>> {
    raw.split(',')
        .map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Read `LAPSE_DATABASE_URL`, rejecting schemes no backend can serve.
///
/// The URL itself stays out of the error since it may carry a password.
fn database_url_from_env() -> LapseResult<Option<String>> {
    match env::var("LAPSE_DATABASE_URL") {
        Ok(url) if url.starts_with("sqlite") || url.starts_with("postgres") => Ok(Some(url)),
        Ok(url) => {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(LapseError::ConfigError(format!(
                "LAPSE_DATABASE_URL must use a sqlite or postgres scheme, got '{scheme}'"
            )))
        }
        Err(_) => Ok(None),
    }
}

impl LapseConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LapseResult<Self> {
        let database_url = database_url_from_env()?;

        let builder = Config::builder()
            .set_default("server.host", "127.0.0.1")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("server.port", 8080)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("database.db_type", "sqlite")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://lapse.db")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/lapse")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("database.max_connections", 5)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("logging.json", false)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("sweep.monthly_grace_days", 30)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("sweep.annual_grace_days", 365)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("jobs.enabled", false)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("jobs.sweep_cron", "0 0 6 * * *")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("alerts.timeout_secs", 10)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("auth.enabled", false)
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_default("auth.trigger_token", "")
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("LAPSE_SERVER_HOST").ok())
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("LAPSE_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option("database.db_type", env::var("LAPSE_DATABASE_TYPE").ok())
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.max_connections",
                env::var("LAPSE_DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("LAPSE_LOG_LEVEL").ok())
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.json",
                env::var("LAPSE_LOG_JSON")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sweep.monthly_grace_days",
                env::var("LAPSE_MONTHLY_GRACE_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sweep.annual_grace_days",
                env::var("LAPSE_ANNUAL_GRACE_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "sweep.alert_milestones",
                env::var("LAPSE_ALERT_MILESTONES")
                    .ok()
                    .and_then(|v| parse_milestones(&v)),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "jobs.enabled",
                env::var("LAPSE_JOBS_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option("jobs.sweep_cron", env::var("LAPSE_SWEEP_CRON").ok())
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "alerts.webhook_url",
                env::var("LAPSE_ALERT_WEBHOOK_URL").ok(),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "alerts.timeout_secs",
                env::var("LAPSE_ALERT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option(
                "auth.enabled",
                env::var("LAPSE_AUTH_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LapseError::ConfigError(e.to_string()))?
            .set_override_option("auth.trigger_token", env::var("LAPSE_TRIGGER_TOKEN").ok())
            .map_err(|e| LapseError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| LapseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LapseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LapseResult<()> {
        if self.server.port == 0 {
            return Err(LapseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LapseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }
        if self.database.max_connections == 0 {
            return Err(LapseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LapseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        for (name, days) in [
            ("monthly_grace_days", self.sweep.monthly_grace_days),
            ("annual_grace_days", self.sweep.annual_grace_days),
        ] {
            if !(1..=MAX_GRACE_DAYS).contains(&days) {
                return Err(LapseError::ConfigError(format!(
                    "sweep.{name} must be between 1 and {MAX_GRACE_DAYS} days, got {days}"
                )));
            }
        }
        if self.sweep.alert_milestones.iter().any(|m| *m < 0) {
            return Err(LapseError::ConfigError(
                "sweep.alert_milestones cannot contain negative values".to_string(),
            ));
        }

        if self.jobs.enabled && self.jobs.sweep_cron.trim().is_empty() {
            return Err(LapseError::ConfigError(
                "jobs.sweep_cron is required when jobs.enabled is true".to_string(),
            ));
        }

        if self.auth.enabled && self.auth.trigger_token.is_empty() {
            return Err(LapseError::ConfigError(
                "auth.trigger_token is required when auth.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LapseResult<&'static LapseConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LapseConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is valid
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| LapseError::ConfigError("configuration was not stored".to_string()))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LapseResult<&'static LapseConfig> {
    get_config()
}
