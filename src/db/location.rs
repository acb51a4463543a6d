//! Location (pit) entity.

use serde::Serialize;
use sqlx::FromRow;

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Location {
    pub id: i64,
    pub tenant_id: i64,
    pub number: i32,
    pub name: Option<String>,
    pub status: String,
    pub camera_stream_url: Option<String>,
    pub camera_is_online: Option<bool>,
}

impl Database {
    pub async fn get_location(&self, location_id: i64) -> CoreResult<Location> {
        sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = $1")
            .bind(location_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("location {location_id} not found")))
    }

    pub async fn belongs_to_tenant(&self, location_id: i64, tenant_id: i64) -> CoreResult<bool> {
        let loc = self.get_location(location_id).await?;
        Ok(loc.tenant_id == tenant_id)
    }
}
