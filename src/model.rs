use std::time::{SystemTime, UNIX_EPOCH};
use serde::{Deserialize, Serialize};

/// Identity a device announces on its retained info topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all="camelCase")]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub producer: String,
    pub software_version: String
}

impl DeviceDescriptor {
    pub fn new(device_id: impl Into<String>, producer: impl Into<String>, software_version: impl Into<String>) -> Self {
        DeviceDescriptor {
            device_id: device_id.into(),
            producer: producer.into(),
            software_version: software_version.into()
        }
    }
}

/// A single timestamped sensor reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageDescriptor {
    /// Milliseconds since the unix epoch at which the reading was taken.
    pub timestamp: i64,
    #[serde(rename="type")]
    pub kind: String,
    pub value: f64
}

impl MessageDescriptor {
    pub fn new(timestamp: i64, kind: impl Into<String>, value: f64) -> Self {
        MessageDescriptor {
            timestamp,
            kind: kind.into(),
            value
        }
    }
}

pub fn parse_device_descriptor(payload: &[u8]) -> Option<DeviceDescriptor> {
    serde_json::from_slice(payload).ok()
}

pub fn parse_message_descriptor(payload: &[u8]) -> Option<MessageDescriptor> {
    serde_json::from_slice(payload).ok()
}

pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_device_descriptor_field_names() {
        let device = DeviceDescriptor::new("dev-1", "ACME_CORPORATION", "0.1-beta");
        let json: Value = serde_json::to_value(&device).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["producer"], "ACME_CORPORATION");
        assert_eq!(json["softwareVersion"], "0.1-beta");
    }

    #[test]
    fn test_message_descriptor_field_names() {
        let msg = MessageDescriptor::new(1_600_000_000_000, "ENGINE_TEMPERATURE_SENSOR", 87.5);
        let json: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["timestamp"], 1_600_000_000_000_i64);
        assert_eq!(json["type"], "ENGINE_TEMPERATURE_SENSOR");
        assert_eq!(json["value"], 87.5);
    }

    #[test]
    fn test_parse_message_descriptor() {
        let payload = br#"{"timestamp":1602667200000,"type":"ENGINE_TEMPERATURE_SENSOR","value":91.25}"#;
        let msg = parse_message_descriptor(payload).unwrap();
        assert_eq!(msg.timestamp, 1_602_667_200_000);
        assert_eq!(msg.kind, "ENGINE_TEMPERATURE_SENSOR");
        assert_eq!(msg.value, 91.25);
    }

    #[test]
    fn test_parse_rejects_other_payloads() {
        assert!(parse_message_descriptor(b"87.123").is_none());
        assert!(parse_message_descriptor(b"not json").is_none());
        assert!(parse_message_descriptor(br#"{"deviceId":"a","producer":"b","softwareVersion":"c"}"#).is_none());
        assert!(parse_device_descriptor(br#"{"timestamp":1,"type":"T","value":1.0}"#).is_none());
    }

    #[test]
    fn test_parse_device_descriptor() {
        let payload = br#"{"deviceId":"a1","producer":"ACME_CORPORATION","softwareVersion":"0.1-beta"}"#;
        let device = parse_device_descriptor(payload).unwrap();
        assert_eq!(device, DeviceDescriptor::new("a1", "ACME_CORPORATION", "0.1-beta"));
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(current_timestamp_millis() > 1_577_836_800_000);
    }
}
