//! Integration tests for the SQL-backed account store.

#![cfg(all(feature = "server", feature = "sqlite"))]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lapse::account::{AccountFilter, BillingStatusUpdate};
use lapse::billing::BillingPolicy;
use lapse::config::DatabaseConfig;
use lapse::errors::LapseError;
use lapse::jobs::run_overdue_sweep;
use lapse::notify::LogNotifier;
use lapse::server::database::Database;
use lapse::store::AccountStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// Helper to create an in-memory database with the accounts table.
async fn setup_test_db() -> Arc<Database> {
    let config = DatabaseConfig {
        db_type: "sqlite".to_string(),
        sqlite_url: "sqlite::memory:".to_string(),
        // One connection, so every query sees the same in-memory database
        max_connections: 1,
        ..DatabaseConfig::default()
    };

    let db = Database::connect(&config)
        .await
        .expect("failed to create database");

    match &*db {
        Database::SQLite(pool) => {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS accounts (
                    id TEXT PRIMARY KEY,
                    next_billing_date TEXT,
                    billing_cycle TEXT NOT NULL DEFAULT 'monthly',
                    monthly_plan_active BOOLEAN NOT NULL DEFAULT 0,
                    annual_plan_active BOOLEAN NOT NULL DEFAULT 0,
                    payment_overdue_days INTEGER NOT NULL DEFAULT 0,
                    grace_period_end TEXT,
                    access_blocked BOOLEAN NOT NULL DEFAULT 0,
                    access_blocked_reason TEXT
                )
                "#,
            )
            .execute(pool)
            .await
            .expect("failed to create accounts table");
        }
        #[cfg(feature = "postgres")]
        Database::Postgres(_) => {
            panic!("PostgreSQL not supported in tests");
        }
    }

    db
}

/// Helper to insert an account row.
async fn insert_account(
    db: &Database,
    id: &str,
    cycle: &str,
    monthly: bool,
    annual: bool,
    next_billing_date: Option<DateTime<Utc>>,
) {
    match db {
        Database::SQLite(pool) => {
            sqlx::query(
                "INSERT INTO accounts \
                 (id, billing_cycle, monthly_plan_active, annual_plan_active, next_billing_date) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(cycle)
            .bind(monthly)
            .bind(annual)
            .bind(next_billing_date)
            .execute(pool)
            .await
            .expect("failed to insert account");
        }
        #[cfg(feature = "postgres")]
        Database::Postgres(_) => unreachable!(),
    }
}

#[tokio::test]
async fn query_returns_only_billable_accounts() {
    let db = setup_test_db().await;
    let due = Some(now());

    insert_account(&db, "monthly", "monthly", true, false, due).await;
    insert_account(&db, "annual", "annual", false, true, due).await;
    insert_account(&db, "inactive", "monthly", false, false, due).await;
    insert_account(&db, "undated", "monthly", true, false, None).await;

    let accounts = db.query(&AccountFilter::billable()).await.unwrap();
    let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["annual", "monthly"]);

    let all = db.query(&AccountFilter::default()).await.unwrap();
    assert_eq!(all.len(), 4);
}

#[tokio::test]
async fn query_skips_unknown_billing_cycles() {
    let db = setup_test_db().await;
    insert_account(&db, "good", "monthly", true, false, Some(now())).await;
    insert_account(&db, "bad", "weekly", true, false, Some(now())).await;

    let accounts = db.query(&AccountFilter::billable()).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, "good");
}

#[tokio::test]
async fn update_persists_status_and_deactivates_plans() {
    let db = setup_test_db().await;
    insert_account(&db, "acct", "monthly", true, false, Some(now())).await;

    let grace_end = now() + Duration::days(10);
    db.update(
        "acct",
        &BillingStatusUpdate {
            payment_overdue_days: 31,
            grace_period_end: Some(grace_end),
            access_blocked: true,
            access_blocked_reason: Some("overdue by 31 days".to_string()),
            deactivate_plans: true,
        },
    )
    .await
    .unwrap();

    let all = db.query(&AccountFilter::default()).await.unwrap();
    let acct = &all[0];
    assert_eq!(acct.payment_overdue_days, 31);
    assert_eq!(acct.grace_period_end, Some(grace_end));
    assert!(acct.access_blocked);
    assert!(!acct.monthly_plan_active);
    assert!(!acct.annual_plan_active);
}

#[tokio::test]
async fn update_keeps_plans_when_not_deactivating() {
    let db = setup_test_db().await;
    insert_account(&db, "acct", "annual", false, true, Some(now())).await;

    db.update(
        "acct",
        &BillingStatusUpdate {
            payment_overdue_days: 3,
            grace_period_end: None,
            access_blocked: false,
            access_blocked_reason: None,
            deactivate_plans: false,
        },
    )
    .await
    .unwrap();

    let accounts = db.query(&AccountFilter::billable()).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].annual_plan_active);
    assert_eq!(accounts[0].payment_overdue_days, 3);
}

#[tokio::test]
async fn update_unknown_account_is_not_found() {
    let db = setup_test_db().await;

    let err = db
        .update(
            "ghost",
            &BillingStatusUpdate {
                payment_overdue_days: 0,
                grace_period_end: None,
                access_blocked: false,
                access_blocked_reason: None,
                deactivate_plans: false,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LapseError::AccountNotFound(_)));
}

#[tokio::test]
async fn sweep_against_database_blocks_and_drops_account() {
    let db = setup_test_db().await;
    insert_account(&db, "late", "monthly", true, false, Some(now() - Duration::days(31))).await;
    insert_account(&db, "fine", "monthly", true, false, Some(now() + Duration::days(2))).await;

    let summary = run_overdue_sweep(&*db, &LogNotifier, &BillingPolicy::default(), now())
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.blocked, 1);

    // Blocked accounts no longer have an active plan
    let billable = db.query(&AccountFilter::billable()).await.unwrap();
    assert_eq!(billable.len(), 1);
    assert_eq!(billable[0].id, "fine");

    let all = db.query(&AccountFilter::default()).await.unwrap();
    let late = all.iter().find(|a| a.id == "late").unwrap();
    assert!(late.access_blocked);
    assert!(late.access_blocked_reason.as_deref().unwrap().contains("31"));
}

#[tokio::test]
async fn health_check_succeeds() {
    let db = setup_test_db().await;
    assert!(db.health_check().await.is_ok());
    assert_eq!(db.db_type(), "sqlite");
}
