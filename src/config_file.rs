use std::collections::HashSet;
use std::fs;
use rumqttc::QoS;
use serde::Deserialize;
use crate::consts::{DEFAULT_DEVICE_PRODUCER, DEFAULT_MESSAGE_COUNT, DEFAULT_PUBLISH_INTERVAL_MILLIS, DEFAULT_SAMPLE_LIMIT, DEFAULT_SAMPLE_WINDOW_SECS, DEFAULT_SOFTWARE_VERSION, DEVICE_TOPIC, MQTT_DEFAULT_PORT, SENSOR_TOPIC};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all="snake_case")]
pub enum Role {
    SimpleProducer,
    JsonProducer,
    DeviceProducer,
    SimpleConsumer,
    JsonConsumer,
    DeviceConsumer,
    DelayStats
}

impl Role {
    pub fn is_producer(&self) -> bool {
        matches!(self, Role::SimpleProducer | Role::JsonProducer | Role::DeviceProducer)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: Option<String>,
    pub clients: Vec<ClientConfig>
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeviceSettings {
    #[serde(default = "default_device_producer")]
    pub producer: String,
    #[serde(default = "default_software_version")]
    pub software_version: String
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            producer: default_device_producer(),
            software_version: default_software_version()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub name: String,
    pub role: Role,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Prefix applied to every topic this client touches, e.g. a per-user ACL namespace.
    pub base_topic: Option<String>,
    pub topic: Option<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_message_count")]
    pub message_count: u32,
    #[serde(default = "default_publish_interval")]
    pub publish_interval_millis: u64,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
    #[serde(default = "default_sample_window")]
    pub sample_window_secs: u64,
    #[serde(default)]
    pub device: DeviceSettings
}

fn default_port() -> u16 { MQTT_DEFAULT_PORT }
fn default_message_count() -> u32 { DEFAULT_MESSAGE_COUNT }
fn default_publish_interval() -> u64 { DEFAULT_PUBLISH_INTERVAL_MILLIS }
fn default_sample_limit() -> usize { DEFAULT_SAMPLE_LIMIT }
fn default_sample_window() -> u64 { DEFAULT_SAMPLE_WINDOW_SECS }
fn default_device_producer() -> String { DEFAULT_DEVICE_PRODUCER.to_string() }
fn default_software_version() -> String { DEFAULT_SOFTWARE_VERSION.to_string() }

impl AppConfig {
    pub fn from_file(cfg_file: &str) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(cfg_file).map_err(|source| ConfigError::Read {
            path: cfg_file.to_string(),
            source
        })?;
        Self::parse(&yaml)
    }

    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.clients.is_empty() {
            return Err(ConfigError::NoClients);
        }
        let mut names = HashSet::new();
        for client in self.clients.iter() {
            if !names.insert(client.name.as_str()) {
                return Err(ConfigError::DuplicateName(client.name.clone()));
            }
            client.validate()?;
        }
        Ok(())
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            client: self.name.clone(),
            field,
            reason: reason.to_string()
        };
        if self.address.trim().is_empty() {
            return Err(invalid("address", "must not be empty"));
        }
        if self.qos > 2 {
            return Err(invalid("qos", "must be 0, 1 or 2"));
        }
        if self.sample_limit == 0 {
            return Err(invalid("sample_limit", "must be at least 1"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(invalid("password", "requires a username"));
        }
        Ok(())
    }

    pub fn qos(&self) -> QoS {
        match self.qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce
        }
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Places `topic` under `base_topic` when one is configured.
    pub fn scoped(&self, topic: &str) -> String {
        match &self.base_topic {
            None => topic.to_string(),
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), topic.trim_start_matches('/'))
        }
    }

    pub fn topic_or(&self, fallback: &str) -> String {
        self.scoped(self.topic.as_deref().unwrap_or(fallback))
    }

    pub fn telemetry_topic(&self) -> String {
        self.topic_or(SENSOR_TOPIC)
    }

    pub fn device_info_topic(&self, device_id: &str) -> String {
        self.scoped(&format!("{}/{}/info", DEVICE_TOPIC, device_id))
    }

    pub fn device_telemetry_topic(&self, device_id: &str) -> String {
        let sensor = self.topic.as_deref().unwrap_or(SENSOR_TOPIC);
        self.scoped(&format!("{}/{}/{}", DEVICE_TOPIC, device_id, sensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
log_level: debug
clients:
  - name: engine
    role: device_producer
    address: 127.0.0.1
  - name: auth-consumer
    role: simple_consumer
    address: broker.example.org
    port: 7883
    username: "000001"
    password: secret
    base_topic: /iot/user/000001/
    qos: 1
"#;

    #[test]
    fn test_parse_applies_defaults() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.clients.len(), 2);

        let engine = &cfg.clients[0];
        assert_eq!(engine.role, Role::DeviceProducer);
        assert_eq!(engine.port, 1883);
        assert_eq!(engine.message_count, 1000);
        assert_eq!(engine.publish_interval_millis, 1000);
        assert_eq!(engine.sample_limit, 10);
        assert_eq!(engine.sample_window_secs, 300);
        assert_eq!(engine.qos(), QoS::AtMostOnce);
        assert_eq!(engine.device, DeviceSettings::default());
        assert_eq!(engine.device.producer, "ACME_CORPORATION");

        let auth = &cfg.clients[1];
        assert_eq!(auth.port, 7883);
        assert_eq!(auth.username.as_deref(), Some("000001"));
        assert_eq!(auth.qos(), QoS::AtLeastOnce);
    }

    #[test]
    fn test_topic_scoping() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        let engine = &cfg.clients[0];
        assert_eq!(engine.telemetry_topic(), "sensor/temperature");
        assert_eq!(engine.device_info_topic("abc"), "device/abc/info");
        assert_eq!(engine.device_telemetry_topic("abc"), "device/abc/sensor/temperature");

        let auth = &cfg.clients[1];
        assert_eq!(auth.telemetry_topic(), "/iot/user/000001/sensor/temperature");
        assert_eq!(auth.topic_or("#"), "/iot/user/000001/#");
    }

    #[test]
    fn test_topic_override() {
        let yaml = r#"
clients:
  - name: perf
    role: json_producer
    address: localhost
    topic: /iot/performance/engine
"#;
        let cfg = AppConfig::parse(yaml).unwrap();
        assert_eq!(cfg.clients[0].telemetry_topic(), "/iot/performance/engine");
        assert!(cfg.log_level.is_none());
    }

    #[test]
    fn test_client_id_generated_when_missing() {
        let cfg = AppConfig::parse(SAMPLE).unwrap();
        let first = cfg.clients[0].client_id();
        let second = cfg.clients[0].client_id();
        assert!(uuid::Uuid::parse_str(&first).is_ok());
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejects_invalid_configs() {
        assert!(matches!(AppConfig::parse("clients: []"), Err(ConfigError::NoClients)));

        let dup = r#"
clients:
  - { name: a, role: simple_consumer, address: localhost }
  - { name: a, role: simple_producer, address: localhost }
"#;
        assert!(matches!(AppConfig::parse(dup), Err(ConfigError::DuplicateName(n)) if n == "a"));

        let qos = "clients:\n  - { name: a, role: simple_consumer, address: localhost, qos: 3 }\n";
        assert!(matches!(AppConfig::parse(qos), Err(ConfigError::Invalid { field: "qos", .. })));

        let pass = "clients:\n  - { name: a, role: simple_consumer, address: localhost, password: x }\n";
        assert!(matches!(AppConfig::parse(pass), Err(ConfigError::Invalid { field: "password", .. })));

        let limit = "clients:\n  - { name: a, role: delay_stats, address: localhost, sample_limit: 0 }\n";
        assert!(matches!(AppConfig::parse(limit), Err(ConfigError::Invalid { field: "sample_limit", .. })));

        let role = "clients:\n  - { name: a, role: broker, address: localhost }\n";
        assert!(matches!(AppConfig::parse(role), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::from_file("/nonexistent/config.yaml"),
            Err(ConfigError::Read { .. })
        ));
    }
}
