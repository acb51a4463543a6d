//! AuditLog entity (§3, SUPPLEMENT). The core never writes to it itself —
//! audit writes are triggered by the excluded CRUD/API layer — but that
//! layer depends on this typed primitive existing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

use crate::errors::CoreResult;

use super::pagination::Page;
use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: i64,
    pub tenant_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub tenant_id: Option<i64>,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub ip: Option<String>,
    pub ua: Option<String>,
}

impl Database {
    pub async fn insert_audit_log(&self, entry: &NewAuditLog) -> CoreResult<AuditLog> {
        Ok(sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (
                tenant_id, user_id, action, resource_type, resource_id, old, new, ip, ua
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(entry.tenant_id)
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.old)
        .bind(&entry.new)
        .bind(&entry.ip)
        .bind(&entry.ua)
        .fetch_one(self.pool())
        .await?)
    }

    pub async fn list_audit_logs_for_tenant(
        &self,
        tenant_id: i64,
        page: i64,
        page_size: i64,
    ) -> CoreResult<Page<AuditLog>> {
        let (limit, offset) = Page::<AuditLog>::limit_offset(page, page_size);
        let items = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM audit_logs WHERE tenant_id = $1")
                .bind(tenant_id)
                .fetch_one(self.pool())
                .await?;
        Ok(Page::new(items, total, page, page_size))
    }
}
