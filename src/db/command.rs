//! Command entity (§3): outbound device commands dispatched by C7.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use serde_json::Value;

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandStatus {
    Pending,
    Sent,
    Acknowledged,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Acknowledged => "acknowledged",
            CommandStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Command {
    pub id: i64,
    pub device_id: String,
    pub tenant_id: i64,
    pub command: String,
    pub reason: Option<String>,
    pub payload: Option<Value>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub acked_at: Option<DateTime<Utc>>,
    pub issuer_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Database {
    /// §4.7: persist as `pending` in its own transaction; the dispatcher
    /// publishes only after this commits.
    pub async fn insert_pending_command(
        &self,
        device_id: &str,
        tenant_id: i64,
        command: &str,
        reason: Option<&str>,
        payload: Option<&Value>,
        issuer_user_id: Option<i64>,
    ) -> CoreResult<Command> {
        sqlx::query_as::<_, Command>(
            r#"
            INSERT INTO commands (device_id, tenant_id, command, reason, payload, status, issuer_user_id)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(tenant_id)
        .bind(command)
        .bind(reason)
        .bind(payload)
        .bind(issuer_user_id)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }

    pub async fn mark_command_sent(&self, command_id: i64, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE commands SET status = 'sent', sent_at = $2 WHERE id = $1")
            .bind(command_id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_command_failed(&self, command_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE commands SET status = 'failed' WHERE id = $1")
            .bind(command_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mark_command_acknowledged(
        &self,
        command_id: i64,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query("UPDATE commands SET status = 'acknowledged', acked_at = $2 WHERE id = $1")
            .bind(command_id)
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn get_command(&self, command_id: i64) -> CoreResult<Command> {
        sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = $1")
            .bind(command_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("command {command_id} not found")))
    }

    pub async fn list_commands_for_device(&self, device_id: &str) -> CoreResult<Vec<Command>> {
        Ok(sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE device_id = $1 ORDER BY created_at DESC LIMIT 50",
        )
        .bind(device_id)
        .fetch_all(self.pool())
        .await?)
    }
}
