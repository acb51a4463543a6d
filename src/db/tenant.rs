//! Tenant (workshop) entity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::errors::{CoreError, CoreResult};

use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub subscription_plan: String,
    pub subscription_status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Database {
    pub async fn get_tenant(&self, tenant_id: i64) -> CoreResult<Tenant> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("tenant {tenant_id} not found")))
    }

    pub async fn get_tenant_by_slug(&self, slug: &str) -> CoreResult<Option<Tenant>> {
        Ok(
            sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE slug = $1")
                .bind(slug)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn count_slug_collisions(&self, base_slug_prefix: &str) -> CoreResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE slug = $1 OR slug LIKE $2")
                .bind(base_slug_prefix)
                .bind(format!("{base_slug_prefix}-%"))
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    pub async fn create_tenant(
        &self,
        name: &str,
        slug: &str,
        subscription_plan: &str,
    ) -> CoreResult<Tenant> {
        sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (name, slug, subscription_plan, subscription_status, is_active)
            VALUES ($1, $2, $3, 'trial', true)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(subscription_plan)
        .fetch_one(self.pool())
        .await
        .map_err(CoreError::from)
    }
}
