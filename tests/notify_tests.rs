//! Integration tests for webhook alert delivery.
//!
//! Each test runs a small axum receiver on a random local port.

#![cfg(feature = "server")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{TimeZone, Utc};
use lapse::account::{Account, BillingCycle};
use lapse::billing::BillingPolicy;
use lapse::config::AlertConfig;
use lapse::errors::LapseError;
use lapse::jobs::run_overdue_sweep;
use lapse::notify::{notifier_from_config, Alert, AlertKind, Notifier, WebhookNotifier};
use lapse::store::InMemoryAccounts;
use serde_json::{json, Value};

#[derive(Clone)]
struct Receiver {
    bodies: Arc<Mutex<Vec<Value>>>,
    status: StatusCode,
}

async fn receive(State(receiver): State<Receiver>, Json(body): Json<Value>) -> StatusCode {
    receiver.bodies.lock().unwrap().push(body);
    receiver.status
}

/// Start a receiver answering every POST with `status`; returns its URL.
async fn spawn_receiver(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hooks/billing", post(receive))
        .with_state(Receiver {
            bodies: bodies.clone(),
            status,
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hooks/billing"), bodies)
}

#[tokio::test]
async fn webhook_posts_alert_as_json() {
    let (url, bodies) = spawn_receiver(StatusCode::OK).await;
    let notifier = WebhookNotifier::new(&url, Duration::from_secs(5)).unwrap();

    let alert = Alert::new("acct-9", AlertKind::BlockedWarning, "last grace day");
    notifier.send_alert(&alert).await.expect("delivery should succeed");

    let received = bodies.lock().unwrap().clone();
    assert_eq!(
        received,
        vec![json!({
            "account_id": "acct-9",
            "kind": "blocked-warning",
            "message": "last grace day"
        })]
    );
}

#[tokio::test]
async fn webhook_server_error_is_notification_error() {
    let (url, bodies) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let notifier = WebhookNotifier::new(&url, Duration::from_secs(5)).unwrap();

    let alert = Alert::new("acct-9", AlertKind::Reminder, "3 days left");
    let err = notifier.send_alert(&alert).await.unwrap_err();

    assert!(matches!(err, LapseError::NotificationError(_)));
    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn configured_url_selects_webhook_delivery() {
    let (url, bodies) = spawn_receiver(StatusCode::OK).await;
    let notifier = notifier_from_config(&AlertConfig {
        webhook_url: Some(url),
        timeout_secs: 5,
    })
    .unwrap();

    let alert = Alert::new("acct-1", AlertKind::Blocked, "blocked");
    notifier.send_alert(&alert).await.unwrap();

    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_does_not_count_alerts_the_webhook_rejects() {
    let (url, bodies) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let notifier = WebhookNotifier::new(&url, Duration::from_secs(5)).unwrap();

    let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let store = InMemoryAccounts::with_accounts([Account {
        id: "late".to_string(),
        next_billing_date: Some(now - chrono::Duration::days(31)),
        billing_cycle: BillingCycle::Monthly,
        monthly_plan_active: true,
        annual_plan_active: false,
        payment_overdue_days: 0,
        grace_period_end: None,
        access_blocked: false,
        access_blocked_reason: None,
    }]);

    let summary = run_overdue_sweep(&store, &notifier, &BillingPolicy::default(), now)
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.blocked, 1);
    assert_eq!(summary.alerted, 0);
    assert_eq!(bodies.lock().unwrap().len(), 1);
    assert!(store.get("late").unwrap().unwrap().access_blocked);
}
