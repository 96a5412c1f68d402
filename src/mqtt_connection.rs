use std::time::Duration;
use async_trait::async_trait;
use rumqttc::{AsyncClient, ClientError, EventLoop, MqttOptions, QoS};
use crate::config_file::ClientConfig;
use crate::consts::{MQTT_KEEPALIVE_TIME, MQTT_THREAD_CHANNEL_CAPACITY};

pub struct MqttConnection {
    pub client_id: String,
    pub client: AsyncClient,
    pub event_loop: EventLoop
}

impl MqttConnection {
    pub fn create(cfg: &ClientConfig) -> Self {
        let client_id = cfg.client_id();
        let mut options = MqttOptions::new(client_id.clone(), cfg.address.clone(), cfg.port);
        options
            .set_keep_alive(Duration::from_secs(MQTT_KEEPALIVE_TIME))
            .set_clean_session(true);
        if let Some(username) = &cfg.username {
            options.set_credentials(username.clone(), cfg.password.clone().unwrap_or_default());
        }
        let (client, event_loop) = AsyncClient::new(options, MQTT_THREAD_CHANNEL_CAPACITY);
        MqttConnection {
            client_id,
            client,
            event_loop
        }
    }
}

/// The requests a client role sends towards the broker.
#[async_trait]
pub trait MqttLink: Send + Sync {
    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ClientError>;
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), ClientError>;
    async fn unsubscribe(&self, filter: &str) -> Result<(), ClientError>;
    async fn disconnect(&self) -> Result<(), ClientError>;
}

#[async_trait]
impl MqttLink for AsyncClient {
    async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ClientError> {
        AsyncClient::publish(self, topic, qos, retain, payload).await
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), ClientError> {
        AsyncClient::subscribe(self, filter, qos).await
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), ClientError> {
        AsyncClient::unsubscribe(self, filter).await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        AsyncClient::disconnect(self).await
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum LinkRequest {
        Publish { topic: String, qos: QoS, retain: bool, payload: Vec<u8> },
        Subscribe(String),
        Unsubscribe(String),
        Disconnect
    }

    /// Accepts every request and remembers it in order.
    #[derive(Default)]
    pub struct RecordingLink {
        requests: Mutex<Vec<LinkRequest>>
    }

    impl RecordingLink {
        pub fn requests(&self) -> Vec<LinkRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn publishes(&self) -> Vec<LinkRequest> {
            self.requests()
                .into_iter()
                .filter(|r| matches!(r, LinkRequest::Publish { .. }))
                .collect()
        }

        fn push(&self, request: LinkRequest) -> Result<(), ClientError> {
            self.requests.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[async_trait]
    impl MqttLink for RecordingLink {
        async fn publish(&self, topic: &str, qos: QoS, retain: bool, payload: Vec<u8>) -> Result<(), ClientError> {
            self.push(LinkRequest::Publish { topic: topic.to_string(), qos, retain, payload })
        }

        async fn subscribe(&self, filter: &str, _qos: QoS) -> Result<(), ClientError> {
            self.push(LinkRequest::Subscribe(filter.to_string()))
        }

        async fn unsubscribe(&self, filter: &str) -> Result<(), ClientError> {
            self.push(LinkRequest::Unsubscribe(filter.to_string()))
        }

        async fn disconnect(&self) -> Result<(), ClientError> {
            self.push(LinkRequest::Disconnect)
        }
    }
}
