use crate::errors::MQTTError;

#[derive(Clone, Debug)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
    /// Arrival time in milliseconds since the unix epoch.
    pub received_at: i64
}

impl MqttMessage {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Clone, Debug)]
pub enum IPCMessage {
    Inbound(MqttMessage),
    Error(MQTTError)
}
