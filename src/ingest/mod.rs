//! Ingest Pipeline (C5): parse -> authorize (C4) -> persist -> evaluate
//! alerts (C6) -> fan out (C9), per spec §4.5.

pub mod payload;

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::alerts::{self, ResolvedThresholds};
use crate::commands::Dispatcher;
use crate::db::device::Device;
use crate::db::reading::NewReading;
use crate::db::sensor_catalog::{AqSensorType, PrimarySensorType};
use crate::db::Database;
use crate::errors::CoreResult;
use crate::gate::{self, Decision};
use crate::hub::{Event, Hub};

use payload::{SensorPayload, StatusPayload};

pub struct Pipeline {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    hub: Arc<Hub>,
}

impl Pipeline {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, hub: Arc<Hub>) -> Self {
        Self { db, dispatcher, hub }
    }

    /// Handle one inbound message on `workshop/+/pit/+/sensors`.
    pub async fn handle_sensor_message(&self, raw: &str) -> CoreResult<()> {
        let payload: SensorPayload = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping malformed sensor payload");
                return Ok(());
            }
        };
        let payload = payload.sanitize();
        let now = Utc::now();

        let device = self.db.get_device_by_device_id(&payload.device_id).await?;
        let subscription = match &device {
            Some(d) => self.db.get_subscription_by_device_id(&d.device_id).await?,
            None => None,
        };

        let decision = gate::decide(device.as_ref(), &payload.license_key, subscription.as_ref(), now);

        let device = match decision {
            Decision::Valid { .. } => device.expect("Valid decision always carries a device"),
            Decision::Invalid { reason, device_id } => {
                if let Some(device_id) = device_id {
                    if let Some(d) = &device {
                        let _ = self
                            .dispatcher
                            .send(
                                &device_id,
                                d.tenant_id.unwrap_or_default(),
                                "DISABLE",
                                Some(reason.as_message()),
                                None,
                                None,
                            )
                            .await;
                    }
                }
                debug!(device_id = %payload.device_id, ?reason, "rejected by license gate");
                return Ok(());
            }
        };

        let Some(tenant_id) = device.tenant_id else {
            warn!(device_id = %device.device_id, "active device missing tenant_id");
            return Ok(());
        };
        let Some(location_id) = device.location_id else {
            warn!(device_id = %device.device_id, "active device missing location_id");
            return Ok(());
        };

        let new_reading = build_new_reading(&payload, &device, tenant_id, location_id);

        let mut tx = self.db.begin().await?;
        let reading = self.db.insert_reading(&mut tx, &new_reading).await?;
        self.db
            .mark_device_seen_tx(&mut tx, &device.device_id, now)
            .await?;

        let tenant_thresholds = self.db.get_tenant_thresholds(tenant_id).await?;
        let location_thresholds = self.db.get_location_thresholds(location_id).await?;
        let resolved = ResolvedThresholds::resolve(&tenant_thresholds, &location_thresholds);
        let new_alerts =
            alerts::evaluate_and_persist(&self.db, &mut tx, &resolved, &reading, now).await?;

        tx.commit().await.map_err(crate::errors::CoreError::from)?;

        self.fan_out(tenant_id, location_id, &reading, &new_alerts)
            .await;

        Ok(())
    }

    /// Handle one inbound message on `workshop/+/device/+/status`.
    pub async fn handle_status_message(&self, raw: &str) -> CoreResult<()> {
        let payload: StatusPayload = match serde_json::from_str(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dropping malformed status payload");
                return Ok(());
            }
        };
        let now = Utc::now();
        self.db.mark_device_seen(&payload.device_id, now).await?;
        Ok(())
    }

    async fn fan_out(
        &self,
        tenant_id: i64,
        location_id: i64,
        reading: &crate::db::reading::Reading,
        new_alerts: &[crate::db::alert::Alert],
    ) {
        let event = Event::sensor_update(
            serde_json::to_value(reading).unwrap_or_else(|_| json!({})),
        );
        self.hub.broadcast_to_tenant(tenant_id, event.clone()).await;
        self.hub.broadcast_to_location(location_id, event).await;

        for alert in new_alerts {
            let event = Event::alert(serde_json::to_value(alert).unwrap_or_else(|_| json!({})));
            self.hub.broadcast_to_tenant(tenant_id, event.clone()).await;
            self.hub.broadcast_to_location(location_id, event).await;
        }
    }
}

/// Gate reading columns by the device's declared sensor types (§3
/// SUPPLEMENT), independent of the payload's own `sensor_type` field.
fn build_new_reading(
    payload: &SensorPayload,
    device: &Device,
    tenant_id: i64,
    location_id: i64,
) -> NewReading {
    let primary = device
        .primary_sensor_type
        .as_deref()
        .and_then(PrimarySensorType::parse);
    let aq = device
        .aq_sensor_type
        .as_deref()
        .and_then(AqSensorType::parse);

    let (temperature, humidity, pressure, gas_resistance, iaq, iaq_accuracy) = match primary {
        Some(p) => (
            payload.temperature.filter(|_| p.reports_temperature()),
            payload.humidity.filter(|_| p.reports_humidity()),
            payload.pressure.filter(|_| p.reports_pressure()),
            payload.gas_resistance.filter(|_| p.reports_gas_resistance()),
            payload.iaq.filter(|_| p.reports_iaq()),
            payload.iaq_accuracy.filter(|_| p.reports_iaq()),
        ),
        None => (None, None, None, None, None, None),
    };

    let particulates_enabled = aq.map(|a| a.reports_particulates()).unwrap_or(false);
    let gate = |v: Option<f64>| v.filter(|_| particulates_enabled);

    NewReading {
        device_id: device.device_id.clone(),
        location_id,
        tenant_id,
        primary_sensor_type: device.primary_sensor_type.clone(),
        aq_sensor_type: device.aq_sensor_type.clone(),
        temperature,
        humidity,
        pressure,
        gas_resistance,
        iaq,
        iaq_accuracy,
        pm1: gate(payload.pm1),
        pm25: gate(payload.pm25),
        pm10: gate(payload.pm10),
        particles_03um: gate(payload.particles_03um),
        particles_05um: gate(payload.particles_05um),
        particles_10um: gate(payload.particles_10um),
        particles_25um: gate(payload.particles_25um),
        particles_50um: gate(payload.particles_50um),
        particles_100um: gate(payload.particles_100um),
        validation_notes: None,
        device_timestamp: payload.parsed_device_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(primary: Option<&str>, aq: Option<&str>) -> Device {
        Device {
            id: 1,
            device_id: "ESP32-AA".into(),
            license_key: Some("LIC-GOOD-GOOD-GOOD".into()),
            tenant_id: Some(7),
            location_id: Some(3),
            primary_sensor_type: primary.map(String::from),
            aq_sensor_type: aq.map(String::from),
            firmware_version: None,
            mac: None,
            ip: None,
            status: "active".into(),
            is_online: true,
            last_seen: None,
            last_message: None,
            report_interval_seconds: 60,
        }
    }

    fn payload() -> SensorPayload {
        serde_json::from_str(
            r#"{"device_id":"ESP32-AA","license_key":"LIC-GOOD-GOOD-GOOD",
                "temperature":24.5,"humidity":58.2,"pressure":1013.0,
                "pm1":8.0,"pm25":14.6,"pm10":22.1}"#,
        )
        .unwrap()
    }

    #[test]
    fn dht22_only_device_never_gets_pressure_or_particulates() {
        let dev = device(Some("DHT22"), None);
        let reading = build_new_reading(&payload(), &dev, 7, 3);
        assert_eq!(reading.temperature, Some(24.5));
        assert_eq!(reading.humidity, Some(58.2));
        assert_eq!(reading.pressure, None);
        assert_eq!(reading.pm25, None);
    }

    #[test]
    fn bme680_plus_pms5003_populates_everything_declared() {
        let dev = device(Some("BME680"), Some("PMS5003"));
        let reading = build_new_reading(&payload(), &dev, 7, 3);
        assert_eq!(reading.pressure, Some(1013.0));
        assert_eq!(reading.pm25, Some(14.6));
    }

    #[test]
    fn device_with_no_declared_sensors_gets_an_empty_reading() {
        let dev = device(None, None);
        let reading = build_new_reading(&payload(), &dev, 7, 3);
        assert_eq!(reading.temperature, None);
        assert_eq!(reading.pm25, None);
    }
}
