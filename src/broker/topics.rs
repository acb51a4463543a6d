//! Topic constants and parsing (§6: "bit-exact" broker topics).

/// Fixed subscribe set, resubscribed on every successful (re)connection.
pub const SUB_SENSORS: &str = "workshop/+/pit/+/sensors";
pub const SUB_STATUS: &str = "workshop/+/device/+/status";
pub const SUB_PROVISIONING_ANNOUNCE: &str = "provisioning/+/announce";

pub fn command_topic(tenant_id: i64, device_id: &str) -> String {
    format!("workshop/{tenant_id}/device/{device_id}/command")
}

pub fn provisioning_config_topic(device_id: &str) -> String {
    format!("provisioning/{device_id}/config")
}

/// What an inbound topic was matched against, so the dispatcher can route
/// a decoded payload without re-parsing the topic string downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundKind {
    Sensors,
    Status,
    ProvisioningAnnounce,
}

/// Match a concrete inbound topic against the fixed subscribe set and pull
/// out the device identifier segment where the topic carries one.
///
/// Returns `None` for any topic outside the three subscribed patterns —
/// `rumqttc` only ever hands the client topics it itself subscribed to, but
/// this stays defensive against a broker that echoes unrelated retained
/// messages on a shared prefix.
pub fn classify(topic: &str) -> Option<InboundKind> {
    let parts: Vec<&str> = topic.split('/').collect();
    match parts.as_slice() {
        ["workshop", _, "pit", _, "sensors"] => Some(InboundKind::Sensors),
        ["workshop", _, "device", _, "status"] => Some(InboundKind::Status),
        ["provisioning", _, "announce"] => Some(InboundKind::ProvisioningAnnounce),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_subscribed_pattern() {
        assert_eq!(
            classify("workshop/7/pit/3/sensors"),
            Some(InboundKind::Sensors)
        );
        assert_eq!(
            classify("workshop/7/device/ESP32-AA/status"),
            Some(InboundKind::Status)
        );
        assert_eq!(
            classify("provisioning/ESP32-AA/announce"),
            Some(InboundKind::ProvisioningAnnounce)
        );
    }

    #[test]
    fn rejects_unrelated_topics() {
        assert_eq!(classify("workshop/7/pit/3/other"), None);
        assert_eq!(classify("unrelated"), None);
    }

    #[test]
    fn builds_publish_topics() {
        assert_eq!(
            command_topic(7, "ESP32-AA"),
            "workshop/7/device/ESP32-AA/command"
        );
        assert_eq!(
            provisioning_config_topic("ESP32-AA"),
            "provisioning/ESP32-AA/config"
        );
    }
}
