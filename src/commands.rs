//! Command Dispatcher (C7): persist -> publish -> status-track outbound
//! device commands, per spec §4.7's two-transaction discipline.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::broker::{topics, Handle};
use crate::db::command::Command;
use crate::db::Database;
use crate::errors::CoreResult;

#[derive(Clone)]
pub struct Dispatcher {
    db: Arc<Database>,
    broker: Handle,
}

impl Dispatcher {
    pub fn new(db: Arc<Database>, broker: Handle) -> Self {
        Self { db, broker }
    }

    /// Persist as `pending` in its own transaction, then publish. A
    /// persistence failure never reaches the broker; a publish failure
    /// marks the already-committed row `failed` and the caller is told.
    pub async fn send(
        &self,
        device_id: &str,
        tenant_id: i64,
        command: &str,
        reason: Option<&str>,
        payload: Option<Value>,
        issuer_user_id: Option<i64>,
    ) -> CoreResult<Command> {
        let record = self
            .db
            .insert_pending_command(
                device_id,
                tenant_id,
                command,
                reason,
                payload.as_ref(),
                issuer_user_id,
            )
            .await?;

        let body = json!({
            "command": command,
            "reason": reason,
            "payload": payload,
            "issued_at": Utc::now().to_rfc3339(),
        });

        let topic = topics::command_topic(tenant_id, device_id);
        match self
            .broker
            .publish(&topic, false, serde_json::to_vec(&body).unwrap_or_default())
            .await
        {
            Ok(()) => {
                self.db.mark_command_sent(record.id, Utc::now()).await?;
                tracing::info!(device_id, command, "command sent");
            }
            Err(e) => {
                self.db.mark_command_failed(record.id).await?;
                tracing::warn!(device_id, command, error = %e, "command publish failed");
                return Err(e);
            }
        }

        self.db.get_command(record.id).await
    }

    /// Publish the approval provisioning config as a retained message; no
    /// `Command` row is created (§4.7, §4.8).
    pub async fn provisioning_config(
        &self,
        device_id: &str,
        license_key: &str,
        tenant_id: i64,
        location_id: Option<i64>,
    ) -> CoreResult<()> {
        let body = json!({
            "command": "PROVISION",
            "license_key": license_key,
            "workshop_id": tenant_id,
            "pit_id": location_id,
        });
        let topic = topics::provisioning_config_topic(device_id);
        self.broker
            .publish(&topic, true, serde_json::to_vec(&body).unwrap_or_default())
            .await
    }
}
