use thiserror::Error;

#[derive(Error,Clone,Debug)]
pub enum MQTTError {
    #[error("MQTT Error: {0}")]
    Misc(String),
    #[error("Received request for thread exit")]
    ExitingThread,
    #[error("{0}: no broker connection after {1}s")]
    ConnectTimeout(String, u64),
    #[error("{0}: Couldn't subscribe to {1}")]
    Subscribe(String, String),
    #[error("{0}: event loop is gone")]
    EventLoopClosed(String),
}

#[derive(Error,Debug)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error
    },
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Config has no clients")]
    NoClients,
    #[error("Duplicate client name: {0}")]
    DuplicateName(String),
    #[error("Invalid value for {field} in client {client}: {reason}")]
    Invalid {
        client: String,
        field: &'static str,
        reason: String
    }
}
