//! Provisioning Handler (C8): create-if-absent / refresh-if-pending /
//! ignore-otherwise on device announce, plus the operator-facing approval
//! flow. Mirrors `_handle_provisioning_announce` 1:1.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::clock;
use crate::commands::Dispatcher;
use crate::config::SubscriptionsConfig;
use crate::db::device::Device;
use crate::db::Database;
use crate::errors::CoreResult;

/// Inbound `provisioning/{device_id}/announce` body (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningAnnounce {
    pub device_id: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

pub struct ProvisioningHandler {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    subscriptions: SubscriptionsConfig,
}

impl ProvisioningHandler {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, subscriptions: SubscriptionsConfig) -> Self {
        Self { db, dispatcher, subscriptions }
    }

    /// §4.8: create-if-absent, refresh-if-pending, ignore otherwise.
    pub async fn on_announce(&self, raw: &str) -> CoreResult<()> {
        let announce: ProvisioningAnnounce = match serde_json::from_str(raw) {
            Ok(a) => a,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed provisioning announce");
                return Ok(());
            }
        };

        let now = Utc::now();
        match self.db.get_device_by_device_id(&announce.device_id).await? {
            None => {
                self.db
                    .create_pending_device(
                        &announce.device_id,
                        announce.mac.as_deref(),
                        announce.firmware_version.as_deref(),
                        announce.ip.as_deref(),
                        now,
                    )
                    .await?;
                tracing::info!(device_id = %announce.device_id, "new device announced, awaiting approval");
            }
            Some(d) if d.status == "pending" => {
                self.db
                    .refresh_pending_device(
                        &announce.device_id,
                        announce.mac.as_deref(),
                        announce.firmware_version.as_deref(),
                        announce.ip.as_deref(),
                        now,
                    )
                    .await?;
            }
            Some(_) => {
                tracing::debug!(device_id = %announce.device_id, "ignoring re-announce of already-provisioned device");
            }
        }
        Ok(())
    }

    /// Operator-facing approval: mint license, bind to tenant/location,
    /// create trial subscription, publish provisioning config. Idempotent
    /// against duplicate commits via the unique constraint on
    /// `devices.license_key` (surfaced as `CoreError::Conflict`).
    pub async fn approve(
        &self,
        device_id: &str,
        tenant_id: i64,
        location_id: Option<i64>,
        plan: &str,
    ) -> CoreResult<Device> {
        let license_key = clock::generate_license_key();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let device = self
            .db
            .approve_device(&mut tx, device_id, &license_key, tenant_id, location_id)
            .await?;

        self.db
            .create_trial_subscription(
                &mut tx,
                tenant_id,
                device_id,
                &license_key,
                plan,
                i64::from(self.subscriptions.trial_days),
                now,
            )
            .await?;
        tx.commit().await?;

        self.dispatcher
            .provisioning_config(device_id, &license_key, tenant_id, location_id)
            .await?;

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_payload_tolerates_missing_optional_fields() {
        let json = r#"{"device_id":"ESP32-0123456789AB"}"#;
        let announce: ProvisioningAnnounce = serde_json::from_str(json).unwrap();
        assert_eq!(announce.device_id, "ESP32-0123456789AB");
        assert!(announce.mac.is_none());
    }
}
