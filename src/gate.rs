//! License Gate (C4): a pure authorization decision with no I/O of its own.
//!
//! Grounded on `original_source/backend/src/services/license_service.py`'s
//! resolution order and reason strings, crossed with the teacher's
//! `is_valid`/`is_expired`-style boolean helpers on the license row.

use chrono::{DateTime, Utc};

use crate::clock::mask_license_key;
use crate::db::device::Device;
use crate::db::subscription::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    UnknownDevice,
    KeyMismatch,
    DeviceDisabled,
    DeviceSuspended,
    NoSubscription,
    SubscriptionExpired,
    SubscriptionSuspended,
    LicenseExpired,
}

impl InvalidReason {
    /// Human-readable string used as the `DISABLE` command's reason field.
    pub fn as_message(&self) -> &'static str {
        match self {
            InvalidReason::UnknownDevice => "Unknown device",
            InvalidReason::KeyMismatch => "License key mismatch",
            InvalidReason::DeviceDisabled => "Device disabled",
            InvalidReason::DeviceSuspended => "Device suspended",
            InvalidReason::NoSubscription => "No subscription on file",
            InvalidReason::SubscriptionExpired => "Subscription expired",
            InvalidReason::SubscriptionSuspended => "Subscription suspended",
            InvalidReason::LicenseExpired => "License expired",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Decision {
    Valid {
        tenant_id: i64,
        location_id: Option<i64>,
    },
    Invalid {
        reason: InvalidReason,
        device_id: Option<String>,
    },
}

impl Decision {
    pub fn is_valid(&self) -> bool {
        matches!(self, Decision::Valid { .. })
    }
}

/// Resolution order per spec §4.4, short-circuiting on the first failure.
/// Callers own both fetches (device-by-id, subscription-by-device); this
/// function performs no I/O and has no side effects.
pub fn decide(
    device: Option<&Device>,
    license_key: &str,
    subscription: Option<&Subscription>,
    now: DateTime<Utc>,
) -> Decision {
    let Some(device) = device else {
        return Decision::Invalid {
            reason: InvalidReason::UnknownDevice,
            device_id: None,
        };
    };

    tracing::debug!(
        presented = %mask_license_key(license_key),
        on_file = %device.license_key.as_deref().map(mask_license_key).unwrap_or_default(),
        "evaluating license gate"
    );

    if device.license_key.as_deref() != Some(license_key) {
        return Decision::Invalid {
            reason: InvalidReason::KeyMismatch,
            device_id: Some(device.device_id.clone()),
        };
    }

    match device.status.as_str() {
        "disabled" => {
            return Decision::Invalid {
                reason: InvalidReason::DeviceDisabled,
                device_id: Some(device.device_id.clone()),
            }
        }
        "suspended" => {
            return Decision::Invalid {
                reason: InvalidReason::DeviceSuspended,
                device_id: Some(device.device_id.clone()),
            }
        }
        _ => {}
    }

    let Some(subscription) = subscription else {
        return Decision::Invalid {
            reason: InvalidReason::NoSubscription,
            device_id: Some(device.device_id.clone()),
        };
    };

    match subscription.status.as_str() {
        "expired" => {
            return Decision::Invalid {
                reason: InvalidReason::SubscriptionExpired,
                device_id: Some(device.device_id.clone()),
            }
        }
        "suspended" => {
            return Decision::Invalid {
                reason: InvalidReason::SubscriptionSuspended,
                device_id: Some(device.device_id.clone()),
            }
        }
        _ => {}
    }

    if let Some(expires_at) = subscription.expires_at {
        if expires_at < now {
            return Decision::Invalid {
                reason: InvalidReason::LicenseExpired,
                device_id: Some(device.device_id.clone()),
            };
        }
    }

    Decision::Valid {
        tenant_id: device.tenant_id.unwrap_or(subscription.tenant_id),
        location_id: device.location_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn device(status: &str, license_key: Option<&str>) -> Device {
        Device {
            id: 1,
            device_id: "ESP32-AABBCCDDEEFF".into(),
            license_key: license_key.map(String::from),
            tenant_id: Some(7),
            location_id: Some(3),
            primary_sensor_type: Some("BME680".into()),
            aq_sensor_type: Some("PMS5003".into()),
            firmware_version: None,
            mac: None,
            ip: None,
            status: status.into(),
            is_online: false,
            last_seen: None,
            last_message: None,
            report_interval_seconds: 60,
        }
    }

    fn subscription(status: &str, expires_at: Option<DateTime<Utc>>) -> Subscription {
        Subscription {
            id: 1,
            tenant_id: 7,
            device_id: Some("ESP32-AABBCCDDEEFF".into()),
            license_key: "LIC-GOOD-GOOD-GOOD".into(),
            plan: "starter".into(),
            status: status.into(),
            monthly_fee: None,
            currency: "USD".into(),
            starts_at: None,
            expires_at,
            trial_expires_at: None,
            grace_period_days: 7,
            last_payment_at: None,
            next_payment_at: None,
        }
    }

    #[test]
    fn unknown_device_is_invalid() {
        let d = decide(None, "LIC-GOOD-GOOD-GOOD", None, Utc::now());
        assert!(matches!(
            d,
            Decision::Invalid {
                reason: InvalidReason::UnknownDevice,
                ..
            }
        ));
    }

    #[test]
    fn key_mismatch_short_circuits_before_status_checks() {
        let dev = device("disabled", Some("LIC-GOOD-GOOD-GOOD"));
        let d = decide(Some(&dev), "LIC-WRONG-WRONG-WR", None, Utc::now());
        assert!(matches!(
            d,
            Decision::Invalid {
                reason: InvalidReason::KeyMismatch,
                ..
            }
        ));
    }

    #[test]
    fn expired_license_beats_active_subscription_status() {
        let now = Utc::now();
        let dev = device("active", Some("LIC-GOOD-GOOD-GOOD"));
        let sub = subscription("active", Some(now - Duration::hours(1)));
        let d = decide(Some(&dev), "LIC-GOOD-GOOD-GOOD", Some(&sub), now);
        assert!(matches!(
            d,
            Decision::Invalid {
                reason: InvalidReason::LicenseExpired,
                ..
            }
        ));
    }

    #[test]
    fn valid_when_everything_checks_out() {
        let now = Utc::now();
        let dev = device("active", Some("LIC-GOOD-GOOD-GOOD"));
        let sub = subscription("active", Some(now + Duration::days(30)));
        let d = decide(Some(&dev), "LIC-GOOD-GOOD-GOOD", Some(&sub), now);
        match d {
            Decision::Valid {
                tenant_id,
                location_id,
            } => {
                assert_eq!(tenant_id, 7);
                assert_eq!(location_id, Some(3));
            }
            other => panic!("expected Valid, got {other:?}"),
        }
    }
}
