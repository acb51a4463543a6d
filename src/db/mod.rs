//! Persistence gateway (C2): typed access to every entity in spec §3.
//!
//! Two transactional scopes per spec §4.2:
//! - request/ingest-scoped: `Database::begin()` returns an `sqlx::Transaction`
//!   the caller commits explicitly; dropping it without committing rolls
//!   back, matching "rolls back on error".
//! - ambient: sweepers call the typed functions directly against the pool,
//!   each statement committing independently.

pub mod alert;
pub mod audit;
pub mod command;
pub mod device;
pub mod firmware;
pub mod location;
pub mod pagination;
pub mod reading;
pub mod sensor_catalog;
pub mod subscription;
pub mod tenant;
pub mod thresholds;

use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::config::DbConfig;
use crate::errors::{CoreError, CoreResult};

pub use pagination::Page;

/// Wraps the shared connection pool. Cheaply cloned (`Arc` inside),
/// matching the teacher's `Arc<Database>` hand-off into handlers, jobs and
/// the ingest pipeline.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DbConfig) -> CoreResult<Arc<Self>> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size + config.max_overflow)
            .connect(&config.url)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(format!("db connect failed: {e}")))?;
        Ok(Arc::new(Self { pool }))
    }

    /// Wrap an already-connected pool, for `#[sqlx::test]` fixtures and
    /// other callers that manage the pool's lifecycle themselves.
    pub fn from_pool(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin an explicit transaction for request/ingest-scoped work.
    pub async fn begin(&self) -> CoreResult<Transaction<'_, Postgres>> {
        self.pool.begin().await.map_err(CoreError::from)
    }
}
