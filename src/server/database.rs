use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow};
use std::sync::Arc;
use tracing::error;

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[cfg(feature = "postgres")]
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::account::{Account, AccountFilter, BillingStatusUpdate};
use crate::config::{get_config, DatabaseConfig};
use crate::errors::{LapseError, LapseResult};
use crate::store::AccountStore;

/// Row shape of the `accounts` table.
///
/// The table is owned by account provisioning; only the billing-status
/// columns are written here.
#[derive(Debug, Clone, FromRow)]
struct AccountRow {
    id: String,
    next_billing_date: Option<DateTime<Utc>>,
    billing_cycle: String,
    monthly_plan_active: bool,
    annual_plan_active: bool,
    payment_overdue_days: i64,
    grace_period_end: Option<DateTime<Utc>>,
    access_blocked: bool,
    access_blocked_reason: Option<String>,
}

impl TryFrom<AccountRow> for Account {
    type Error = LapseError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            billing_cycle: row.billing_cycle.parse()?,
            id: row.id,
            next_billing_date: row.next_billing_date,
            monthly_plan_active: row.monthly_plan_active,
            annual_plan_active: row.annual_plan_active,
            payment_overdue_days: row.payment_overdue_days,
            grace_period_end: row.grace_period_end,
            access_blocked: row.access_blocked,
            access_blocked_reason: row.access_blocked_reason,
        })
    }
}

const ACCOUNT_COLUMNS: &str = "id, next_billing_date, billing_cycle, monthly_plan_active, \
     annual_plan_active, payment_overdue_days, grace_period_end, access_blocked, \
     access_blocked_reason";

/// Build the SELECT for a filter. The filter only toggles fixed clauses, so
/// nothing user-controlled reaches the SQL text.
fn select_sql(filter: &AccountFilter) -> String {
    let mut clauses = Vec::new();
    if filter.require_active_plan {
        clauses.push("(monthly_plan_active OR annual_plan_active)");
    }
    if filter.require_billing_date {
        clauses.push("next_billing_date IS NOT NULL");
    }

    let mut sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY id");
    sql
}

/// Convert fetched rows, skipping records that cannot be interpreted.
fn rows_to_accounts(rows: Vec<AccountRow>) -> Vec<Account> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            match Account::try_from(row) {
                Ok(account) => Some(account),
                Err(e) => {
                    error!(account_id = %id, "Skipping unreadable account record: {e}");
                    None
                }
            }
        })
        .collect()
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect using the global configuration.
    pub async fn new() -> LapseResult<Arc<Self>> {
        let config = get_config()?;
        Self::connect(&config.database).await
    }

    /// Connect using an explicit database configuration.
    pub async fn connect(db_config: &DatabaseConfig) -> LapseResult<Arc<Self>> {
        match db_config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LapseError::StoreError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LapseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(db_config.max_connections)
                    .connect(&db_config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LapseError::StoreError(format!("failed to connect to PostgreSQL: {e}"))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LapseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LapseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Backend name, for health reporting.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> LapseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("SELECT 1").execute(pool).await.map_err(|e| {
                    LapseError::StoreError(format!("SQLite health check failed: {e}"))
                })?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("SELECT 1").execute(pool).await.map_err(|e| {
                    LapseError::StoreError(format!("Postgres health check failed: {e}"))
                })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn query(&self, filter: &AccountFilter) -> LapseResult<Vec<Account>> {
        let sql = select_sql(filter);

        let rows = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, AccountRow>(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("SQLite account query failed: {e}");
                    LapseError::StoreError(format!("database error: {e}"))
                })?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, AccountRow>(&sql)
                .fetch_all(pool)
                .await
                .map_err(|e| {
                    error!("Postgres account query failed: {e}");
                    LapseError::StoreError(format!("database error: {e}"))
                })?,
        };

        Ok(rows_to_accounts(rows))
    }

    async fn update(&self, id: &str, update: &BillingStatusUpdate) -> LapseResult<()> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                r#"
                UPDATE accounts SET
                    payment_overdue_days  = ?,
                    grace_period_end      = ?,
                    access_blocked        = ?,
                    access_blocked_reason = ?,
                    monthly_plan_active   = CASE WHEN ? THEN FALSE ELSE monthly_plan_active END,
                    annual_plan_active    = CASE WHEN ? THEN FALSE ELSE annual_plan_active END
                WHERE id = ?
                "#,
            )
            .bind(update.payment_overdue_days)
            .bind(update.grace_period_end)
            .bind(update.access_blocked)
            .bind(&update.access_blocked_reason)
            .bind(update.deactivate_plans)
            .bind(update.deactivate_plans)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("SQLite account update failed: {e}");
                LapseError::StoreError(format!("database error: {e}"))
            })?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                r#"
                UPDATE accounts SET
                    payment_overdue_days  = $1,
                    grace_period_end      = $2,
                    access_blocked        = $3,
                    access_blocked_reason = $4,
                    monthly_plan_active   = CASE WHEN $5 THEN FALSE ELSE monthly_plan_active END,
                    annual_plan_active    = CASE WHEN $5 THEN FALSE ELSE annual_plan_active END
                WHERE id = $6
                "#,
            )
            .bind(update.payment_overdue_days)
            .bind(update.grace_period_end)
            .bind(update.access_blocked)
            .bind(&update.access_blocked_reason)
            .bind(update.deactivate_plans)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| {
                error!("Postgres account update failed: {e}");
                LapseError::StoreError(format!("database error: {e}"))
            })?
            .rows_affected(),
        };

        if rows_affected == 0 {
            return Err(LapseError::AccountNotFound(id.to_string()));
        }

        Ok(())
    }
}
