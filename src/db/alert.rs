//! Alert entity (§3) and the cooldown check C6 runs before inserting one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, Transaction};

use crate::errors::{CoreError, CoreResult};

use super::pagination::Page;
use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: i64,
    pub tenant_id: i64,
    pub location_id: Option<i64>,
    pub device_id: Option<String>,
    pub r#type: String,
    pub severity: String,
    pub message: String,
    pub trigger_value: Option<f64>,
    pub threshold_value: Option<f64>,
    pub is_acknowledged: bool,
    pub acked_by: Option<i64>,
    pub acked_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sms_sent: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub tenant_id: i64,
    pub location_id: Option<i64>,
    pub device_id: Option<String>,
    pub alert_type: String,
    pub severity: Severity,
    pub message: String,
    pub trigger_value: Option<f64>,
    pub threshold_value: Option<f64>,
}

impl Database {
    /// §4.6 step 3: suppress if any unacknowledged alert of the same
    /// `(device_id, location_id, alert_type)` was created within `window`
    /// of `now`.
    pub async fn has_recent_unacknowledged_alert(
        &self,
        device_id: Option<&str>,
        location_id: Option<i64>,
        alert_type: &str,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> CoreResult<bool> {
        let since = now - window;
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM alerts
            WHERE type = $1
              AND is_acknowledged = false
              AND created_at > $2
              AND device_id IS NOT DISTINCT FROM $3
              AND location_id IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(alert_type)
        .bind(since)
        .bind(device_id)
        .bind(location_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count > 0)
    }

    pub async fn insert_alert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        a: &NewAlert,
    ) -> CoreResult<Alert> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (
                tenant_id, location_id, device_id, type, severity, message,
                trigger_value, threshold_value, is_acknowledged, sms_sent, email_sent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, false, false)
            RETURNING *
            "#,
        )
        .bind(a.tenant_id)
        .bind(a.location_id)
        .bind(&a.device_id)
        .bind(&a.alert_type)
        .bind(a.severity.as_str())
        .bind(&a.message)
        .bind(a.trigger_value)
        .bind(a.threshold_value)
        .fetch_one(&mut **tx)
        .await
        .map_err(CoreError::from)
    }

    /// Standalone insert for alerts raised outside the ingest transaction
    /// (device/camera offline sweeps, subscription lifecycle warnings).
    pub async fn insert_alert_standalone(&self, a: &NewAlert) -> CoreResult<Alert> {
        sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (
                tenant_id, location_id, device_id, type, severity, message,
                trigger_value, threshold_value, is_acknowledged, sms_sent, email_sent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, false, false)
            RETURNING *
            "#,
        )
        .bind(a.tenant_id)
        .bind(a.location_id)
        .bind(&a.device_id)
        .bind(&a.alert_type)
        .bind(a.severity.as_str())
        .bind(&a.message)
        .bind(a.trigger_value)
        .bind(a.threshold_value)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }

    pub async fn acknowledge_alert(&self, alert_id: i64, acked_by: i64, now: DateTime<Utc>) -> CoreResult<Alert> {
        sqlx::query_as::<_, Alert>(
            r#"
            UPDATE alerts SET is_acknowledged = true, acked_by = $2, acked_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(alert_id)
        .bind(acked_by)
        .bind(now)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("alert {alert_id} not found")))
    }

    pub async fn list_alerts_for_tenant(
        &self,
        tenant_id: i64,
        page: i64,
        page_size: i64,
    ) -> CoreResult<Page<Alert>> {
        let (limit, offset) = Page::<Alert>::limit_offset(page, page_size);
        let items = sqlx::query_as::<_, Alert>(
            "SELECT * FROM alerts WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM alerts WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await?;
        Ok(Page::new(items, total, page, page_size))
    }
}
