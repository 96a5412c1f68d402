pub const MQTT_KEEPALIVE_TIME: u64 = 5_u64;
pub const MQTT_THREAD_CHANNEL_CAPACITY: usize = 32_usize;
pub const MQTT_POLL_INTERVAL_MILLIS: u64 = 250_u64;
pub const MQTT_RECONNECT_DELAY_MILLIS: u64 = 1_000_u64;
pub const MQTT_CONNECTION_TIMEOUT: u64 = 10_u64;
pub const MQTT_PUBLISH_TIMEOUT: u64 = 3_u64;
pub const MQTT_DEFAULT_PORT: u16 = 1883_u16;

pub const MPSC_BUFFER_SIZE: usize = 512_usize;

pub const DEFAULT_MESSAGE_COUNT: u32 = 1000_u32;
pub const DEFAULT_PUBLISH_INTERVAL_MILLIS: u64 = 1_000_u64;
pub const DEFAULT_SAMPLE_LIMIT: usize = 10_usize;
pub const DEFAULT_SAMPLE_WINDOW_SECS: u64 = 300_u64;

pub const DEVICE_TOPIC: &str = "device";
pub const SENSOR_TOPIC: &str = "sensor/temperature";
pub const WILDCARD_TOPIC: &str = "#";
pub const PERFORMANCE_TOPIC: &str = "/iot/performance/#";

pub const ENGINE_TEMPERATURE_SENSOR: &str = "ENGINE_TEMPERATURE_SENSOR";
pub const DEFAULT_DEVICE_PRODUCER: &str = "ACME_CORPORATION";
pub const DEFAULT_SOFTWARE_VERSION: &str = "0.1-beta";
