//! Wire payload shapes for the two `/sensors` and `/status` topics (§6).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Inbound sensor reading. `device_id` and `license_key` are required;
/// everything else is optional and unknown keys are ignored via the
/// `extra` catch-all, per §4.5 step 1 and §6's payload contract.
#[derive(Debug, Clone, Deserialize)]
pub struct SensorPayload {
    pub device_id: String,
    pub license_key: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub gas_resistance: Option<f64>,
    #[serde(default)]
    pub iaq: Option<f64>,
    #[serde(default)]
    pub iaq_accuracy: Option<i32>,
    #[serde(default)]
    pub pm1: Option<f64>,
    #[serde(default)]
    pub pm25: Option<f64>,
    #[serde(default)]
    pub pm10: Option<f64>,
    #[serde(default, rename = "particles_03um")]
    pub particles_03um: Option<f64>,
    #[serde(default, rename = "particles_05um")]
    pub particles_05um: Option<f64>,
    #[serde(default, rename = "particles_10um")]
    pub particles_10um: Option<f64>,
    #[serde(default, rename = "particles_25um")]
    pub particles_25um: Option<f64>,
    #[serde(default, rename = "particles_50um")]
    pub particles_50um: Option<f64>,
    #[serde(default, rename = "particles_100um")]
    pub particles_100um: Option<f64>,
    /// Raw ISO 8601 string; parsed defensively by `parsed_timestamp`.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Accepted but not authoritative: column gating follows the device's
    /// declared sensor types, not this field (resolves spec.md §9 Open
    /// Question 4).
    #[serde(default)]
    pub sensor_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SensorPayload {
    /// NaN-to-null defense (§4.5 step 3). `serde_json` itself rejects a
    /// literal NaN token, so this only matters if a value arrived as a
    /// string that happened to parse into a NaN-equivalent float, or a
    /// future non-JSON transport allows it through — kept cheap and
    /// idempotent so it's safe to call unconditionally.
    pub fn sanitize(mut self) -> Self {
        let clean = |v: Option<f64>| v.filter(|f| !f.is_nan());
        self.temperature = clean(self.temperature);
        self.humidity = clean(self.humidity);
        self.pressure = clean(self.pressure);
        self.gas_resistance = clean(self.gas_resistance);
        self.iaq = clean(self.iaq);
        self.pm1 = clean(self.pm1);
        self.pm25 = clean(self.pm25);
        self.pm10 = clean(self.pm10);
        self.particles_03um = clean(self.particles_03um);
        self.particles_05um = clean(self.particles_05um);
        self.particles_10um = clean(self.particles_10um);
        self.particles_25um = clean(self.particles_25um);
        self.particles_50um = clean(self.particles_50um);
        self.particles_100um = clean(self.particles_100um);
        self
    }

    /// Parses `timestamp` as ISO 8601; a malformed value becomes `None`
    /// without failing the row (§4.5 step 3).
    pub fn parsed_device_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Inbound device heartbeat/ack on `workshop/+/device/+/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub device_id: String,
    #[serde(default)]
    pub license_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_ignored_not_rejected() {
        let json = r#"{"device_id":"ESP32-AA","license_key":"LIC-GOOD-GOOD-GOOD","temperature":24.5,"weird_future_field":true}"#;
        let p: SensorPayload = serde_json::from_str(json).unwrap();
        assert_eq!(p.temperature, Some(24.5));
        assert!(p.extra.contains_key("weird_future_field"));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let json = r#"{"device_id":"ESP32-AA"}"#;
        let res: Result<SensorPayload, _> = serde_json::from_str(json);
        assert!(res.is_err());
    }

    #[test]
    fn sanitize_nulls_out_nan() {
        let p = SensorPayload {
            device_id: "ESP32-AA".into(),
            license_key: "LIC-GOOD-GOOD-GOOD".into(),
            temperature: Some(f64::NAN),
            humidity: Some(58.2),
            pressure: None,
            gas_resistance: None,
            iaq: None,
            iaq_accuracy: None,
            pm1: None,
            pm25: None,
            pm10: None,
            particles_03um: None,
            particles_05um: None,
            particles_10um: None,
            particles_25um: None,
            particles_50um: None,
            particles_100um: None,
            timestamp: None,
            sensor_type: None,
            extra: Map::new(),
        }
        .sanitize();
        assert_eq!(p.temperature, None);
        assert_eq!(p.humidity, Some(58.2));
    }

    #[test]
    fn malformed_timestamp_becomes_none() {
        let json = r#"{"device_id":"ESP32-AA","license_key":"LIC-GOOD-GOOD-GOOD","timestamp":"not-a-date"}"#;
        let p: SensorPayload = serde_json::from_str(json).unwrap();
        assert_eq!(p.parsed_device_timestamp(), None);
    }

    #[test]
    fn well_formed_timestamp_parses() {
        let json = r#"{"device_id":"ESP32-AA","license_key":"LIC-GOOD-GOOD-GOOD","timestamp":"2026-01-01T00:00:00Z"}"#;
        let p: SensorPayload = serde_json::from_str(json).unwrap();
        assert!(p.parsed_device_timestamp().is_some());
    }
}
