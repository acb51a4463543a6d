//! Reading entity (§3): high-volume, append-only sensor observations.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Postgres, Transaction};

use crate::errors::{CoreError, CoreResult};

use super::pagination::Page;
use super::Database;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Reading {
    pub id: i64,
    pub device_id: String,
    pub location_id: i64,
    pub tenant_id: i64,
    pub primary_sensor_type: Option<String>,
    pub aq_sensor_type: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub gas_resistance: Option<f64>,
    pub iaq: Option<f64>,
    pub iaq_accuracy: Option<i32>,
    pub pm1: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub particles_03um: Option<f64>,
    pub particles_05um: Option<f64>,
    pub particles_10um: Option<f64>,
    pub particles_25um: Option<f64>,
    pub particles_50um: Option<f64>,
    pub particles_100um: Option<f64>,
    pub is_valid: bool,
    pub validation_notes: Option<String>,
    pub device_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Columns for a not-yet-inserted reading, already sensor-type-gated by the
/// ingest pipeline (§4.5 step 3: unrelated columns are null regardless of
/// what the payload contained).
#[derive(Debug, Clone, Default)]
pub struct NewReading {
    pub device_id: String,
    pub location_id: i64,
    pub tenant_id: i64,
    pub primary_sensor_type: Option<String>,
    pub aq_sensor_type: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub gas_resistance: Option<f64>,
    pub iaq: Option<f64>,
    pub iaq_accuracy: Option<i32>,
    pub pm1: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub particles_03um: Option<f64>,
    pub particles_05um: Option<f64>,
    pub particles_10um: Option<f64>,
    pub particles_25um: Option<f64>,
    pub particles_50um: Option<f64>,
    pub particles_100um: Option<f64>,
    pub validation_notes: Option<String>,
    pub device_timestamp: Option<DateTime<Utc>>,
}

impl Database {
    /// Insert a reading as part of the caller's ingest transaction (§5:
    /// "one transaction covering reading insert, device health update, and
    /// alert inserts").
    pub async fn insert_reading(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        r: &NewReading,
    ) -> CoreResult<Reading> {
        sqlx::query_as::<_, Reading>(
            r#"
            INSERT INTO readings (
                device_id, location_id, tenant_id, primary_sensor_type, aq_sensor_type,
                temperature, humidity, pressure, gas_resistance, iaq, iaq_accuracy,
                pm1, pm25, pm10,
                particles_03um, particles_05um, particles_10um,
                particles_25um, particles_50um, particles_100um,
                is_valid, validation_notes, device_timestamp
            )
            VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10, $11,
                $12, $13, $14,
                $15, $16, $17,
                $18, $19, $20,
                true, $21, $22
            )
            RETURNING *
            "#,
        )
        .bind(&r.device_id)
        .bind(r.location_id)
        .bind(r.tenant_id)
        .bind(&r.primary_sensor_type)
        .bind(&r.aq_sensor_type)
        .bind(r.temperature)
        .bind(r.humidity)
        .bind(r.pressure)
        .bind(r.gas_resistance)
        .bind(r.iaq)
        .bind(r.iaq_accuracy)
        .bind(r.pm1)
        .bind(r.pm25)
        .bind(r.pm10)
        .bind(r.particles_03um)
        .bind(r.particles_05um)
        .bind(r.particles_10um)
        .bind(r.particles_25um)
        .bind(r.particles_50um)
        .bind(r.particles_100um)
        .bind(&r.validation_notes)
        .bind(r.device_timestamp)
        .fetch_one(&mut **tx)
        .await
        .map_err(CoreError::from)
    }

    pub async fn get_latest_reading_for_device(
        &self,
        device_id: &str,
    ) -> CoreResult<Option<Reading>> {
        Ok(sqlx::query_as::<_, Reading>(
            "SELECT * FROM readings WHERE device_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn list_readings_for_location(
        &self,
        location_id: i64,
        page: i64,
        page_size: i64,
    ) -> CoreResult<Page<Reading>> {
        let (limit, offset) = Page::<Reading>::limit_offset(page, page_size);
        let items = sqlx::query_as::<_, Reading>(
            "SELECT * FROM readings WHERE location_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(location_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;
        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM readings WHERE location_id = $1")
                .bind(location_id)
                .fetch_one(self.pool())
                .await?;
        Ok(Page::new(items, total, page, page_size))
    }
}
