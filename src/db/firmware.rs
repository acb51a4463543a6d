//! FirmwareRelease entity (§3): content-addressed firmware store, consumed
//! by C11.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FirmwareRelease {
    pub id: i64,
    pub version: String,
    pub filename: String,
    pub path: String,
    pub size: i64,
    pub sha256: String,
    pub notes: Option<String>,
    pub uploader_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub async fn get_firmware_by_version(&self, version: &str) -> CoreResult<Option<FirmwareRelease>> {
        Ok(sqlx::query_as::<_, FirmwareRelease>(
            "SELECT * FROM firmware_releases WHERE version = $1",
        )
        .bind(version)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn insert_firmware_release(
        &self,
        version: &str,
        filename: &str,
        path: &str,
        size: i64,
        sha256: &str,
        notes: Option<&str>,
        uploader_id: Option<i64>,
    ) -> CoreResult<FirmwareRelease> {
        sqlx::query_as::<_, FirmwareRelease>(
            r#"
            INSERT INTO firmware_releases (version, filename, path, size, sha256, notes, uploader_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(version)
        .bind(filename)
        .bind(path)
        .bind(size)
        .bind(sha256)
        .bind(notes)
        .bind(uploader_id)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }

    /// "Latest" is by `created_at` (§4.11), not by version string ordering.
    pub async fn get_latest_firmware(&self) -> CoreResult<FirmwareRelease> {
        sqlx::query_as::<_, FirmwareRelease>(
            "SELECT * FROM firmware_releases ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| CoreError::NotFound("no firmware releases exist".to_string()))
    }

    pub async fn list_firmware_releases(&self) -> CoreResult<Vec<FirmwareRelease>> {
        Ok(sqlx::query_as::<_, FirmwareRelease>(
            "SELECT * FROM firmware_releases ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await?)
    }
}
