//! Database-backed scenarios from spec §8's six end-to-end flows, run
//! against a real scratch Postgres via `#[sqlx::test]` (SPEC_FULL §8's
//! test-tooling note), the way the teacher's `tests/database_tests.rs`
//! exercises its own `Database` against a live connection.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use pitlink_core::commands::Dispatcher;
use pitlink_core::config::BrokerConfig;
use pitlink_core::db::alert::{NewAlert, Severity};
use pitlink_core::db::device::DeviceStatus;
use pitlink_core::db::Database;
use pitlink_core::gate;
use pitlink_core::lifecycle;
use pitlink_core::{broker, provisioning::ProvisioningHandler};

async fn seed_tenant(db: &Database, name: &str) -> i64 {
    let tenant = db
        .create_tenant(name, &name.to_lowercase(), "starter")
        .await
        .unwrap();
    tenant.id
}

async fn seed_location(pool: &PgPool, tenant_id: i64, number: i32) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO locations (tenant_id, number, status) VALUES ($1, $2, 'active') RETURNING id",
    )
    .bind(tenant_id)
    .bind(number)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

fn test_dispatcher(db: std::sync::Arc<Database>) -> Dispatcher {
    let (_client, handle, _rx) = broker::new(&BrokerConfig::default(), 16);
    Dispatcher::new(db, handle)
}

#[sqlx::test]
async fn provisioning_approve_is_atomic_with_trial_subscription(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "acme-workshop").await;
    let location_id = seed_location(&pool, tenant_id, 1).await;

    db.create_pending_device("ESP32-AAAA", None, None, None, Utc::now())
        .await
        .unwrap();

    let dispatcher = test_dispatcher(db.clone());
    let handler = ProvisioningHandler::new(
        db.clone(),
        dispatcher,
        pitlink_core::config::SubscriptionsConfig::default(),
    );

    let device = handler
        .approve("ESP32-AAAA", tenant_id, Some(location_id), "starter")
        .await
        .unwrap();

    assert_eq!(device.status, "active");
    assert!(device.license_key.is_some());

    let sub = db
        .get_subscription_by_device_id("ESP32-AAAA")
        .await
        .unwrap()
        .expect("trial subscription created alongside approval");
    assert_eq!(sub.status, "trial");
    assert_eq!(sub.license_key, device.license_key.unwrap());
    assert!(sub.is_currently_valid(Utc::now()));
}

#[sqlx::test]
async fn gate_decide_against_real_rows_is_valid_for_active_device(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "pit-crew").await;
    let location_id = seed_location(&pool, tenant_id, 2).await;

    db.create_pending_device("ESP32-BBBB", None, None, None, Utc::now())
        .await
        .unwrap();
    let dispatcher = test_dispatcher(db.clone());
    let handler = ProvisioningHandler::new(
        db.clone(),
        dispatcher,
        pitlink_core::config::SubscriptionsConfig::default(),
    );
    let device = handler
        .approve("ESP32-BBBB", tenant_id, Some(location_id), "starter")
        .await
        .unwrap();

    let sub = db
        .get_subscription_by_device_id("ESP32-BBBB")
        .await
        .unwrap();

    let decision = gate::decide(
        Some(&device),
        device.license_key.as_deref().unwrap(),
        sub.as_ref(),
        Utc::now(),
    );
    assert!(decision.is_valid());
}

#[sqlx::test]
async fn gate_decide_rejects_key_mismatch_over_real_row(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "mismatch-co").await;
    db.create_pending_device("ESP32-CCCC", None, None, None, Utc::now())
        .await
        .unwrap();
    let dispatcher = test_dispatcher(db.clone());
    let handler = ProvisioningHandler::new(
        db.clone(),
        dispatcher,
        pitlink_core::config::SubscriptionsConfig::default(),
    );
    let device = handler
        .approve("ESP32-CCCC", tenant_id, None, "starter")
        .await
        .unwrap();

    let decision = gate::decide(Some(&device), "LIC-WRONG-WRONG-WRON", None, Utc::now());
    assert!(!decision.is_valid());
}

#[sqlx::test]
async fn cooldown_suppresses_repeat_alert_within_window(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "cooldown-co").await;
    let now = Utc::now();

    let mut tx = db.begin().await.unwrap();
    db.insert_alert(
        &mut tx,
        &NewAlert {
            tenant_id,
            location_id: None,
            device_id: Some("ESP32-DDDD".to_string()),
            alert_type: "temp_too_high".to_string(),
            severity: Severity::Warning,
            message: "Temperature 40.0\u{b0}C exceeded max threshold of 35.0\u{b0}C".to_string(),
            trigger_value: Some(40.0),
            threshold_value: Some(35.0),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let still_cooling_down = db
        .has_recent_unacknowledged_alert(
            Some("ESP32-DDDD"),
            None,
            "temp_too_high",
            now + Duration::minutes(1),
            pitlink_core::alerts::ALERT_COOLDOWN,
        )
        .await
        .unwrap();
    assert!(still_cooling_down);

    let past_cooldown = db
        .has_recent_unacknowledged_alert(
            Some("ESP32-DDDD"),
            None,
            "temp_too_high",
            now + Duration::minutes(10),
            pitlink_core::alerts::ALERT_COOLDOWN,
        )
        .await
        .unwrap();
    assert!(!past_cooldown);
}

#[sqlx::test]
async fn payment_reactivates_a_suspended_device(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "grace-co").await;

    db.create_pending_device("ESP32-EEEE", None, None, None, Utc::now())
        .await
        .unwrap();
    let dispatcher = test_dispatcher(db.clone());
    let handler = ProvisioningHandler::new(
        db.clone(),
        dispatcher,
        pitlink_core::config::SubscriptionsConfig::default(),
    );
    let device = handler
        .approve("ESP32-EEEE", tenant_id, None, "starter")
        .await
        .unwrap();
    let sub = db
        .get_subscription_by_device_id("ESP32-EEEE")
        .await
        .unwrap()
        .unwrap();

    db.set_device_status("ESP32-EEEE", DeviceStatus::Suspended)
        .await
        .unwrap();
    db.mark_suspended(sub.id).await.unwrap();

    lifecycle::record_payment(&db, sub.id, 1).await.unwrap();

    let refreshed = db
        .get_device_by_device_id("ESP32-EEEE")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.status, "active");

    let refreshed_sub = db
        .get_subscription_by_device_id("ESP32-EEEE")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed_sub.status, "active");
    assert!(refreshed_sub.expires_at.unwrap() > Utc::now());
    let _ = device;
}

#[sqlx::test]
async fn expiring_soon_sweep_dedupes_within_the_24h_window(pool: PgPool) {
    let db = Database::from_pool(pool.clone());
    let tenant_id = seed_tenant(&db, "expiring-co").await;

    let mut tx = db.begin().await.unwrap();
    let sub = db
        .create_trial_subscription(
            &mut tx,
            tenant_id,
            "ESP32-FFFF",
            "LIC-EXPR-SOON-0001",
            "starter",
            14,
            Utc::now(),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    sqlx::query("UPDATE subscriptions SET status = 'active', expires_at = $2 WHERE id = $1")
        .bind(sub.id)
        .bind(Utc::now() + Duration::days(3))
        .execute(&pool)
        .await
        .unwrap();

    let first_pass = lifecycle::run_expiring_soon_sweep(&db).await.unwrap();
    assert_eq!(first_pass, 1);

    let second_pass = lifecycle::run_expiring_soon_sweep(&db).await.unwrap();
    assert_eq!(second_pass, 0, "dedupe window should suppress the repeat warning");
}
