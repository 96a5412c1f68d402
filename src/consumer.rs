use std::time::Duration;
use rumqttc::mqttbytes::matches;
use rumqttc::QoS;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use crate::config_file::{ClientConfig, Role};
use crate::consts::{DEVICE_TOPIC, MQTT_POLL_INTERVAL_MILLIS, PERFORMANCE_TOPIC, WILDCARD_TOPIC};
use crate::delay_stats::{DelaySampler, SampleOutcome};
use crate::errors::MQTTError;
use crate::ipc::{IPCMessage, MqttMessage};
use crate::model::{parse_device_descriptor, parse_message_descriptor, DeviceDescriptor, MessageDescriptor};
use crate::mqtt_connection::MqttLink;
use crate::mqtt_poll::{disconnect, wait_for_connection};
use crate::SHUTDOWN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Raw,
    Reading,
    Device
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub filter: String,
    pub decoder: Decoder
}

impl Subscription {
    fn new(filter: String, decoder: Decoder) -> Self {
        Subscription { filter, decoder }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Raw { topic: String, text: String },
    Reading { topic: String, reading: MessageDescriptor },
    Device { topic: String, device: DeviceDescriptor }
}

pub fn subscriptions_for(cfg: &ClientConfig) -> Vec<Subscription> {
    match cfg.role {
        Role::SimpleConsumer => vec![Subscription::new(cfg.topic_or(WILDCARD_TOPIC), Decoder::Raw)],
        Role::JsonConsumer => vec![Subscription::new(cfg.topic_or(WILDCARD_TOPIC), Decoder::Reading)],
        Role::DeviceConsumer => vec![
            Subscription::new(cfg.scoped(&format!("{}/+/info", DEVICE_TOPIC)), Decoder::Device),
            Subscription::new(cfg.scoped(&format!("{}/+/sensor/#", DEVICE_TOPIC)), Decoder::Reading),
        ],
        Role::DelayStats => vec![Subscription::new(cfg.topic_or(PERFORMANCE_TOPIC), Decoder::Reading)],
        Role::SimpleProducer | Role::JsonProducer | Role::DeviceProducer => vec![]
    }
}

/// Decodes a message according to the first subscription whose filter matches
/// its topic, falling back to the raw text.
pub fn classify(subscriptions: &[Subscription], msg: &MqttMessage) -> Received {
    let decoder = subscriptions
        .iter()
        .find(|s| matches(&msg.topic, &s.filter))
        .map(|s| s.decoder)
        .unwrap_or(Decoder::Raw);
    let topic = msg.topic.clone();
    match decoder {
        Decoder::Reading => {
            if let Some(reading) = parse_message_descriptor(&msg.payload) {
                return Received::Reading { topic, reading };
            }
        }
        Decoder::Device => {
            if let Some(device) = parse_device_descriptor(&msg.payload) {
                return Received::Device { topic, device };
            }
        }
        Decoder::Raw => {}
    }
    Received::Raw { topic, text: msg.payload_text() }
}

fn log_received(name: &str, received: &Received) {
    match received {
        Received::Raw { topic, text } => {
            info!("{}: Message Received ({}) Message Received: {}", name, topic, text);
        }
        Received::Reading { topic, reading } => {
            info!("{}: MessageDescriptor Received ({}) Data -> Timestamp: {}, Type: {}, Value: {}",
                name, topic, reading.timestamp, reading.kind, reading.value);
        }
        Received::Device { topic, device } => {
            info!("{}: Device Descriptor ({}) Data -> Id: {}, Producer: {}, Software Version: {}",
                name, topic, device.device_id, device.producer, device.software_version);
        }
    }
}

async fn subscribe_all(cfg: &ClientConfig, client: &dyn MqttLink, subscriptions: &[Subscription], qos: QoS) -> Result<(), MQTTError> {
    for sub in subscriptions.iter() {
        if let Err(e) = client.subscribe(&sub.filter, qos).await {
            error!("{}: couldn't subscribe to {}: {e}", cfg.name, sub.filter);
            return Err(MQTTError::Subscribe(cfg.name.clone(), sub.filter.clone()));
        }
        info!("{}: subscribed to {}", cfg.name, sub.filter);
    }
    Ok(())
}

async fn unsubscribe_all(cfg: &ClientConfig, client: &dyn MqttLink, subscriptions: &[Subscription]) {
    for sub in subscriptions.iter() {
        if let Err(e) = client.unsubscribe(&sub.filter).await {
            warn!("{}: couldn't unsubscribe from {}: {e}", cfg.name, sub.filter);
        }
    }
}

fn finish_sampling(cfg: &ClientConfig, sampler: &DelaySampler) {
    info!("{}: Starting Statistics ...", cfg.name);
    info!("{}: Total Received Messages: {}/{}", cfg.name, sampler.received(), sampler.limit());
    match sampler.report() {
        Some(report) => {
            info!("{}: AVERAGE DELAY: {} ms (min {} ms, max {} ms, {} of {} messages decoded)",
                cfg.name, report.average_ms, report.min_ms, report.max_ms, report.delays.len(), report.received);
        }
        None => {
            warn!("{}: no decodable readings received, nothing to average", cfg.name);
        }
    }
}

pub async fn run_consumer(
    cfg: &ClientConfig,
    client: &dyn MqttLink,
    mut connected: watch::Receiver<bool>,
    mut inbound: mpsc::Receiver<IPCMessage>,
) -> Result<(), MQTTError> {
    let qos = cfg.qos();
    let subscriptions = subscriptions_for(cfg);
    let mut sampler = match cfg.role {
        Role::DelayStats => Some(DelaySampler::new(cfg.sample_limit, Duration::from_secs(cfg.sample_window_secs))),
        _ => None
    };

    wait_for_connection(&cfg.name, &mut connected).await?;
    info!("{}: Connected !", cfg.name);
    let _ = connected.borrow_and_update();
    subscribe_all(cfg, client, &subscriptions, qos).await?;

    loop {
        if SHUTDOWN.initialized() {
            break;
        }
        // clean sessions lose their subscriptions on reconnect
        let reconnected = connected.has_changed().unwrap_or(false) && *connected.borrow_and_update();
        if reconnected {
            info!("{}: reconnected, restoring subscriptions", cfg.name);
            subscribe_all(cfg, client, &subscriptions, qos).await?;
        }

        let ipcm = match timeout(Duration::from_millis(MQTT_POLL_INTERVAL_MILLIS), inbound.recv()).await {
            Err(_) => {
                if let Some(s) = sampler.as_ref() {
                    if s.window_elapsed(Instant::now()) {
                        unsubscribe_all(cfg, client, &subscriptions).await;
                        finish_sampling(cfg, s);
                        break;
                    }
                }
                continue;
            }
            Ok(None) => {
                if SHUTDOWN.initialized() {
                    break;
                }
                return Err(MQTTError::EventLoopClosed(cfg.name.clone()));
            }
            Ok(Some(m)) => m
        };

        match ipcm {
            IPCMessage::Inbound(msg) => {
                if msg.retained {
                    debug!("{}: retained message on {}", cfg.name, msg.topic);
                }
                match sampler.as_mut() {
                    Some(s) => match s.record(msg) {
                        SampleOutcome::Buffered(n) => {
                            info!("{}: Message Processed: {}", cfg.name, n);
                        }
                        SampleOutcome::Complete => {
                            unsubscribe_all(cfg, client, &subscriptions).await;
                            finish_sampling(cfg, s);
                            break;
                        }
                    },
                    None => log_received(&cfg.name, &classify(&subscriptions, &msg))
                }
            }
            IPCMessage::Error(e) => {
                return Err(e);
            }
        }
    }

    disconnect(&cfg.name, client).await;
    Ok(())
}
