//! Device entity (§3) plus the lifecycle transitions it participates in
//! (approval, reassignment, command-driven disable/suspend).

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, Transaction};

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceStatus {
    Pending,
    Active,
    Disabled,
    Suspended,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Pending => "pending",
            DeviceStatus::Active => "active",
            DeviceStatus::Disabled => "disabled",
            DeviceStatus::Suspended => "suspended",
            DeviceStatus::Maintenance => "maintenance",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: i64,
    pub device_id: String,
    pub license_key: Option<String>,
    pub tenant_id: Option<i64>,
    pub location_id: Option<i64>,
    pub primary_sensor_type: Option<String>,
    pub aq_sensor_type: Option<String>,
    pub firmware_version: Option<String>,
    pub mac: Option<String>,
    pub ip: Option<String>,
    pub status: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_message: Option<DateTime<Utc>>,
    pub report_interval_seconds: i32,
}

impl Device {
    /// I1: license_key is non-null iff status != pending.
    pub fn upholds_license_invariant(&self) -> bool {
        (self.license_key.is_some()) != (self.status == "pending")
            || (self.license_key.is_none() && self.status == "pending")
    }
}

impl Database {
    pub async fn get_device_by_device_id(&self, device_id: &str) -> CoreResult<Option<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = $1")
                .bind(device_id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn get_device(&self, id: i64) -> CoreResult<Device> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("device {id} not found")))
    }

    /// Create a new `pending` device row from a provisioning announce.
    pub async fn create_pending_device(
        &self,
        device_id: &str,
        mac: Option<&str>,
        firmware_version: Option<&str>,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Device> {
        sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (
                device_id, mac, firmware_version, ip, status,
                is_online, last_seen, report_interval_seconds
            )
            VALUES ($1, $2, $3, $4, 'pending', true, $5, 60)
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(mac)
        .bind(firmware_version)
        .bind(ip)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }

    /// Refresh a still-pending device on re-announce.
    pub async fn refresh_pending_device(
        &self,
        device_id: &str,
        mac: Option<&str>,
        firmware_version: Option<&str>,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET last_seen = $2, ip = COALESCE($3, ip),
                firmware_version = COALESCE($4, firmware_version),
                is_online = true, mac = COALESCE($5, mac)
            WHERE device_id = $1 AND status = 'pending'
            "#,
        )
        .bind(device_id)
        .bind(now)
        .bind(ip)
        .bind(firmware_version)
        .bind(mac)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Approve a pending device: mint license, attach tenant/location,
    /// transition to active. Runs inside the caller's transaction
    /// (provisioning.rs) so it commits atomically with the trial
    /// Subscription row.
    pub async fn approve_device(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        device_id: &str,
        license_key: &str,
        tenant_id: i64,
        location_id: Option<i64>,
    ) -> CoreResult<Device> {
        sqlx::query_as::<_, Device>(
            r#"
            UPDATE devices
            SET license_key = $2, tenant_id = $3, location_id = $4, status = 'active'
            WHERE device_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(license_key)
        .bind(tenant_id)
        .bind(location_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| {
            CoreError::Conflict(format!(
                "device {device_id} is not pending or was already approved"
            ))
        })
    }

    /// I5: reassigning a device clears its license and returns it to
    /// `pending`; a new key is minted on the next approval.
    pub async fn unassign_device(&self, device_id: &str) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET license_key = NULL, tenant_id = NULL, location_id = NULL, status = 'pending'
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_device_status(&self, device_id: &str, status: DeviceStatus) -> CoreResult<()> {
        sqlx::query("UPDATE devices SET status = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(status.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn reactivate_device(&self, device_id: &str) -> CoreResult<()> {
        sqlx::query(
            "UPDATE devices SET status = 'active' WHERE device_id = $1 AND status = 'suspended'",
        )
        .bind(device_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Update online/health markers standalone, for the status-message path
    /// (§4.5) where no reading/alert transaction exists to join.
    pub async fn mark_device_seen(&self, device_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE devices SET is_online = true, last_seen = $2 WHERE device_id = $1")
            .bind(device_id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Same update, against an open transaction: the sensor-message path
    /// (§4.5 step 4) needs the device health update to commit or roll back
    /// atomically with the reading insert and any alerts it triggers.
    pub async fn mark_device_seen_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query(
            "UPDATE devices SET is_online = true, last_seen = $2, last_message = $2 WHERE device_id = $1",
        )
        .bind(device_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn license_invariant_holds_for_pending_and_active() {
        let pending = Device {
            id: 1,
            device_id: "ESP32-AA".into(),
            license_key: None,
            tenant_id: None,
            location_id: None,
            primary_sensor_type: None,
            aq_sensor_type: None,
            firmware_version: None,
            mac: None,
            ip: None,
            status: "pending".into(),
            is_online: false,
            last_seen: None,
            last_message: None,
            report_interval_seconds: 60,
        };
        assert!(pending.upholds_license_invariant());

        let mut active = pending.clone();
        active.status = "active".into();
        active.license_key = Some("LIC-AAAA-BBBB-CCCC".into());
        assert!(active.upholds_license_invariant());

        let mut broken = pending.clone();
        broken.license_key = Some("LIC-AAAA-BBBB-CCCC".into());
        assert!(!broken.upholds_license_invariant());
    }
}
