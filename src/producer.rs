use std::time::Duration;
use rumqttc::QoS;
use tokio::sync::watch;
use tokio::time::timeout;
use crate::config_file::{ClientConfig, Role};
use crate::consts::{ENGINE_TEMPERATURE_SENSOR, MQTT_PUBLISH_TIMEOUT};
use crate::errors::MQTTError;
use crate::model::{current_timestamp_millis, DeviceDescriptor, MessageDescriptor};
use crate::mqtt_connection::MqttLink;
use crate::mqtt_poll::{disconnect, pause, wait_for_connection};
use crate::sensors::EngineTemperatureSensor;
use crate::SHUTDOWN;

pub async fn run_producer(
    cfg: &ClientConfig,
    client: &dyn MqttLink,
    mut connected: watch::Receiver<bool>,
) -> Result<(), MQTTError> {
    wait_for_connection(&cfg.name, &mut connected).await?;
    info!("{}: Connected !", cfg.name);

    let topic = match cfg.role {
        Role::DeviceProducer => {
            let device = DeviceDescriptor::new(
                uuid::Uuid::new_v4().to_string(),
                cfg.device.producer.clone(),
                cfg.device.software_version.clone()
            );
            publish_device_info(cfg, client, &connected, &device).await;
            cfg.device_telemetry_topic(&device.device_id)
        }
        _ => cfg.telemetry_topic()
    };

    let mut sensor = EngineTemperatureSensor::new();
    let interval = Duration::from_millis(cfg.publish_interval_millis);
    for sent in 0..cfg.message_count {
        if SHUTDOWN.initialized() {
            info!("{}: shutdown requested after {} messages", cfg.name, sent);
            break;
        }
        // the event loop drops its sender when it ends for good
        if connected.has_changed().is_err() {
            error!("{}: event loop ended after {} messages", cfg.name, sent);
            return Err(MQTTError::EventLoopClosed(cfg.name.clone()));
        }
        match build_payload(cfg.role, sensor.read(), current_timestamp_millis()) {
            Ok(payload) => publish_data(cfg, client, &connected, &topic, cfg.qos(), false, payload).await,
            Err(e) => error!("{}: Skipping message send, could not build payload: {e}", cfg.name)
        }
        pause(interval).await;
    }

    disconnect(&cfg.name, client).await;
    Ok(())
}

/// Renders one reading the way the role publishes it.
pub fn build_payload(role: Role, value: f64, timestamp: i64) -> Result<String, serde_json::Error> {
    match role {
        Role::SimpleProducer => Ok(format!("{:?}", value)),
        _ => serde_json::to_string(&MessageDescriptor::new(timestamp, ENGINE_TEMPERATURE_SENSOR, value))
    }
}

async fn publish_device_info(
    cfg: &ClientConfig,
    client: &dyn MqttLink,
    connected: &watch::Receiver<bool>,
    device: &DeviceDescriptor,
) {
    let payload = match serde_json::to_string(device) {
        Ok(p) => p,
        Err(e) => {
            error!("{}: Error Publishing Device Information ! Error: {e}", cfg.name);
            return;
        }
    };
    let topic = cfg.device_info_topic(&device.device_id);
    publish_data(cfg, client, connected, &topic, QoS::AtMostOnce, true, payload).await;
}

async fn publish_data(
    cfg: &ClientConfig,
    client: &dyn MqttLink,
    connected: &watch::Receiver<bool>,
    topic: &str,
    qos: QoS,
    retain: bool,
    payload: String,
) {
    debug!("{}: Publishing to Topic: {} Data: {}", cfg.name, topic, payload);
    let is_connected = *connected.borrow();
    if !is_connected {
        error!("{}: MQTT Client is not Connected, dropping message for {}", cfg.name, topic);
        return;
    }
    match timeout(
        Duration::from_secs(MQTT_PUBLISH_TIMEOUT),
        client.publish(topic, qos, retain, payload.into_bytes()),
    )
        .await
    {
        Ok(result) => match result {
            Ok(_) => {
                debug!("{}: Data Correctly Published !", cfg.name);
            }
            Err(e) => {
                error!("{}: Couldn't send message: {e}", cfg.name);
            }
        },
        Err(_e) => {
            error!("{}: Timeout trying to mqtt publish!", cfg.name)
        }
    }
}
