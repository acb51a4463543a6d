//! Alert Engine (C6): threshold resolution, classification, cooldown
//! suppression, and persistence.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Postgres, Transaction};

use crate::db::alert::{Alert, NewAlert, Severity};
use crate::db::reading::Reading;
use crate::db::thresholds::{LocationThresholds, TenantThresholds};
use crate::db::Database;
use crate::errors::CoreResult;

/// Cooldown window for suppressing repeat alerts of the same
/// `(device_id, location_id, alert_type)` (§4.6 step 3, spec.md §9 Open
/// Question: fixed at 5 minutes, not tenant-configurable).
pub const ALERT_COOLDOWN: Duration = Duration::minutes(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    Good,
    Warning,
    Critical,
    Unknown,
}

/// Thresholds resolved once per reading per invariant I6 (location override
/// > tenant > built-in default), so the rest of the engine never has to
/// reason about nullability.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedThresholds {
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity_max: f64,
    pub pm25_warn: f64,
    pub pm25_crit: f64,
    pub pm10_warn: f64,
    pub pm10_crit: f64,
    pub iaq_warn: f64,
    pub iaq_crit: f64,
}

impl ResolvedThresholds {
    pub fn resolve(tenant: &TenantThresholds, location: &LocationThresholds) -> Self {
        Self {
            temp_min: location.temp_min.unwrap_or(tenant.temp_min),
            temp_max: location.temp_max.unwrap_or(tenant.temp_max),
            humidity_max: location.humidity_max.unwrap_or(tenant.humidity_max),
            pm25_warn: location.pm25_warn.unwrap_or(tenant.pm25_warn),
            pm25_crit: location.pm25_crit.unwrap_or(tenant.pm25_crit),
            pm10_warn: location.pm10_warn.unwrap_or(tenant.pm10_warn),
            pm10_crit: location.pm10_crit.unwrap_or(tenant.pm10_crit),
            iaq_warn: location.iaq_warn.unwrap_or(tenant.iaq_warn),
            iaq_crit: location.iaq_crit.unwrap_or(tenant.iaq_crit),
        }
    }
}

fn classify_tri(value: Option<f64>, warn: f64, crit: f64) -> SignalStatus {
    match value {
        None => SignalStatus::Unknown,
        Some(v) if v >= crit => SignalStatus::Critical,
        Some(v) if v >= warn => SignalStatus::Warning,
        Some(_) => SignalStatus::Good,
    }
}

struct Candidate {
    alert_type: &'static str,
    severity: Severity,
    message: String,
    trigger_value: f64,
    threshold_value: f64,
}

fn candidates(reading: &Reading, t: &ResolvedThresholds) -> Vec<Candidate> {
    let mut out = Vec::new();

    if let Some(temp) = reading.temperature {
        if temp < t.temp_min {
            out.push(Candidate {
                alert_type: "temp_too_low",
                severity: Severity::Warning,
                message: format!(
                    "Temperature {temp:.1}\u{b0}C below min threshold of {:.1}\u{b0}C",
                    t.temp_min
                ),
                trigger_value: temp,
                threshold_value: t.temp_min,
            });
        } else if temp > t.temp_max {
            out.push(Candidate {
                alert_type: "temp_too_high",
                severity: Severity::Warning,
                message: format!(
                    "Temperature {temp:.1}\u{b0}C exceeded max threshold of {:.1}\u{b0}C",
                    t.temp_max
                ),
                trigger_value: temp,
                threshold_value: t.temp_max,
            });
        }
    }

    if let Some(humidity) = reading.humidity {
        if humidity > t.humidity_max {
            out.push(Candidate {
                alert_type: "humidity_too_high",
                severity: Severity::Warning,
                message: format!(
                    "Humidity {humidity:.1}% exceeded max threshold of {:.1}%",
                    t.humidity_max
                ),
                trigger_value: humidity,
                threshold_value: t.humidity_max,
            });
        }
    }

    if let SignalStatus::Warning | SignalStatus::Critical =
        classify_tri(reading.pm25, t.pm25_warn, t.pm25_crit)
    {
        let pm25 = reading.pm25.unwrap();
        let critical = pm25 >= t.pm25_crit;
        out.push(Candidate {
            alert_type: "high_pm25",
            severity: if critical { Severity::Critical } else { Severity::Warning },
            message: format!(
                "PM2.5 {pm25:.1}\u{b5}g/m\u{b3} exceeded {} threshold of {:.1}\u{b5}g/m\u{b3}",
                if critical { "critical" } else { "warning" },
                if critical { t.pm25_crit } else { t.pm25_warn }
            ),
            trigger_value: pm25,
            threshold_value: if critical { t.pm25_crit } else { t.pm25_warn },
        });
    }

    if let SignalStatus::Warning | SignalStatus::Critical =
        classify_tri(reading.pm10, t.pm10_warn, t.pm10_crit)
    {
        let pm10 = reading.pm10.unwrap();
        let critical = pm10 >= t.pm10_crit;
        out.push(Candidate {
            alert_type: "high_pm10",
            severity: if critical { Severity::Critical } else { Severity::Warning },
            message: format!(
                "PM10 {pm10:.1}\u{b5}g/m\u{b3} exceeded {} threshold of {:.1}\u{b5}g/m\u{b3}",
                if critical { "critical" } else { "warning" },
                if critical { t.pm10_crit } else { t.pm10_warn }
            ),
            trigger_value: pm10,
            threshold_value: if critical { t.pm10_crit } else { t.pm10_warn },
        });
    }

    if let SignalStatus::Warning | SignalStatus::Critical =
        classify_tri(reading.iaq, t.iaq_warn, t.iaq_crit)
    {
        let iaq = reading.iaq.unwrap();
        let critical = iaq >= t.iaq_crit;
        out.push(Candidate {
            alert_type: "high_iaq",
            severity: if critical { Severity::Critical } else { Severity::Warning },
            message: format!(
                "IAQ {iaq:.1} exceeded {} threshold of {:.1}",
                if critical { "critical" } else { "warning" },
                if critical { t.iaq_crit } else { t.iaq_warn }
            ),
            trigger_value: iaq,
            threshold_value: if critical { t.iaq_crit } else { t.iaq_warn },
        });
    }

    out
}

/// Evaluate one reading and persist any alerts that survive cooldown
/// suppression, inside the caller's ingest transaction (§4.6 step 4, §5).
pub async fn evaluate_and_persist(
    db: &Database,
    tx: &mut Transaction<'_, Postgres>,
    thresholds: &ResolvedThresholds,
    reading: &Reading,
    now: DateTime<Utc>,
) -> CoreResult<Vec<Alert>> {
    let mut persisted = Vec::new();

    for c in candidates(reading, thresholds) {
        let suppressed = db
            .has_recent_unacknowledged_alert(
                Some(&reading.device_id),
                Some(reading.location_id),
                c.alert_type,
                now,
                ALERT_COOLDOWN,
            )
            .await?;
        if suppressed {
            continue;
        }

        let alert = db
            .insert_alert(
                tx,
                &NewAlert {
                    tenant_id: reading.tenant_id,
                    location_id: Some(reading.location_id),
                    device_id: Some(reading.device_id.clone()),
                    alert_type: c.alert_type.to_string(),
                    severity: c.severity,
                    message: c.message,
                    trigger_value: Some(c.trigger_value),
                    threshold_value: Some(c.threshold_value),
                },
            )
            .await?;
        persisted.push(alert);
    }

    Ok(persisted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ResolvedThresholds {
        ResolvedThresholds::resolve(&TenantThresholds::default(), &LocationThresholds::default())
    }

    fn reading(pm25: Option<f64>, humidity: Option<f64>, temperature: Option<f64>) -> Reading {
        Reading {
            id: 1,
            device_id: "ESP32-AA".into(),
            location_id: 3,
            tenant_id: 7,
            primary_sensor_type: Some("BME680".into()),
            aq_sensor_type: Some("PMS5003".into()),
            temperature,
            humidity,
            pressure: None,
            gas_resistance: None,
            iaq: None,
            iaq_accuracy: None,
            pm1: None,
            pm25,
            pm10: None,
            particles_03um: None,
            particles_05um: None,
            particles_10um: None,
            particles_25um: None,
            particles_50um: None,
            particles_100um: None,
            is_valid: true,
            validation_notes: None,
            device_timestamp: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn location_override_wins_over_tenant_default() {
        let tenant = TenantThresholds::default();
        let mut location = LocationThresholds {
            location_id: 3,
            ..Default::default()
        };
        location.pm25_warn = Some(5.0);
        let resolved = ResolvedThresholds::resolve(&tenant, &location);
        assert_eq!(resolved.pm25_warn, 5.0);
        assert_eq!(resolved.pm25_crit, tenant.pm25_crit);
    }

    #[test]
    fn pm25_warning_example_matches_scenario() {
        let r = reading(Some(14.6), Some(58.2), Some(24.5));
        let t = thresholds();
        let cands = candidates(&r, &t);
        let pm25 = cands.iter().find(|c| c.alert_type == "high_pm25").unwrap();
        assert_eq!(pm25.severity, Severity::Warning);
        assert_eq!(pm25.threshold_value, 12.0);
    }

    #[test]
    fn humidity_message_matches_spec_example_format() {
        let r = reading(None, Some(80.0), None);
        let t = thresholds();
        let cands = candidates(&r, &t);
        let humidity = cands
            .iter()
            .find(|c| c.alert_type == "humidity_too_high")
            .unwrap();
        assert_eq!(
            humidity.message,
            "Humidity 80.0% exceeded max threshold of 70.0%"
        );
    }

    #[test]
    fn pm25_critical_when_at_or_above_crit() {
        let r = reading(Some(40.0), None, None);
        let t = thresholds();
        let cands = candidates(&r, &t);
        let pm25 = cands.iter().find(|c| c.alert_type == "high_pm25").unwrap();
        assert_eq!(pm25.severity, Severity::Critical);
    }

    #[test]
    fn good_readings_raise_no_candidates() {
        let r = reading(Some(1.0), Some(50.0), Some(22.0));
        let t = thresholds();
        assert!(candidates(&r, &t).is_empty());
    }
}
