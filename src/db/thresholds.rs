//! TenantThresholds / LocationThresholds entities (§3). Resolution per
//! invariant I6 (location override > tenant > built-in default) lives in
//! `alerts::ResolvedThresholds::resolve`, which consumes both rows fetched
//! here.

use serde::Serialize;
use sqlx::FromRow;

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TenantThresholds {
    pub tenant_id: i64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_max: f64,
    pub pm25_warn: f64,
    pub pm25_crit: f64,
    pub pm10_warn: f64,
    pub pm10_crit: f64,
    pub iaq_warn: f64,
    pub iaq_crit: f64,
    pub device_offline_s: i32,
    pub camera_offline_s: i32,
    pub notify_sms: bool,
    pub notify_email: bool,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
}

impl Default for TenantThresholds {
    fn default() -> Self {
        Self {
            tenant_id: 0,
            temp_min: 15.0,
            temp_max: 35.0,
            humidity_max: 70.0,
            pm25_warn: 12.0,
            pm25_crit: 35.4,
            pm10_warn: 54.0,
            pm10_crit: 154.0,
            iaq_warn: 100.0,
            iaq_crit: 150.0,
            device_offline_s: 60,
            camera_offline_s: 30,
            notify_sms: false,
            notify_email: true,
            notify_webhook: false,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, FromRow, Serialize)]
pub struct LocationThresholds {
    pub location_id: i64,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity_max: Option<f64>,
    pub pm25_warn: Option<f64>,
    pub pm25_crit: Option<f64>,
    pub pm10_warn: Option<f64>,
    pub pm10_crit: Option<f64>,
    pub iaq_warn: Option<f64>,
    pub iaq_crit: Option<f64>,
    pub device_offline_s: Option<i32>,
    pub camera_offline_s: Option<i32>,
}

impl Database {
    /// Every tenant gets a `TenantThresholds` row at creation time (§3); a
    /// missing row falls back to the built-in industry-standard defaults
    /// rather than failing the read path.
    pub async fn get_tenant_thresholds(&self, tenant_id: i64) -> CoreResult<TenantThresholds> {
        let row = sqlx::query_as::<_, TenantThresholds>(
            "SELECT * FROM tenant_thresholds WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.unwrap_or(TenantThresholds {
            tenant_id,
            ..TenantThresholds::default()
        }))
    }

    pub async fn create_tenant_thresholds(&self, tenant_id: i64) -> CoreResult<TenantThresholds> {
        sqlx::query_as::<_, TenantThresholds>(
            "INSERT INTO tenant_thresholds (tenant_id) VALUES ($1) RETURNING *",
        )
        .bind(tenant_id)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }

    /// A location with no override row inherits everything from the tenant.
    pub async fn get_location_thresholds(
        &self,
        location_id: i64,
    ) -> CoreResult<LocationThresholds> {
        let row = sqlx::query_as::<_, LocationThresholds>(
            "SELECT * FROM location_thresholds WHERE location_id = $1",
        )
        .bind(location_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.unwrap_or(LocationThresholds {
            location_id,
            ..Default::default()
        }))
    }
}
