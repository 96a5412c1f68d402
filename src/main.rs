mod config_file;
mod consts;
mod consumer;
mod delay_stats;
mod errors;
mod ipc;
mod model;
mod mqtt_connection;
mod mqtt_poll;
mod producer;
mod sensors;

#[macro_use]
extern crate tracing;

use anyhow::Context;
use lazy_static::lazy_static;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing_log::LogTracer;
use tracing_subscriber::filter::EnvFilter;
use crate::config_file::AppConfig;
use crate::errors::MQTTError;
use crate::mqtt_poll::mqtt_poll_loop;

lazy_static! {
    static ref SHUTDOWN: OnceCell<bool> = OnceCell::new();
}

fn init_tracing(log_level: Option<&str>) -> anyhow::Result<()> {
    let mut filter = EnvFilter::from_default_env();
    if let Some(level) = log_level {
        filter = filter.add_directive(level.parse().with_context(|| format!("invalid value for log_level: {level}"))?);
    }
    // rumqttc reports through the `log` facade
    LogTracer::init()?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg_file = std::env::var("CONFIG_FILE_PATH").unwrap_or_else(|_e| { "./config.yaml".to_string() });
    let cfg = AppConfig::from_file(&cfg_file)?;

    init_tracing(cfg.log_level.as_deref())?;
    info!("starting up with {} clients from {}", cfg.clients.len(), cfg_file);

    ctrlc::set_handler(|| {
        info!("termination requested, stopping clients");
        let _ = SHUTDOWN.set(true);
    })?;

    let mut tasks: JoinSet<(String, Result<(), MQTTError>)> = JoinSet::new();
    for client in cfg.clients.iter().cloned() {
        tasks.spawn(async move {
            let name = client.name.clone();
            (name, mqtt_poll_loop(client).await)
        });
    }

    let mut failures = 0_usize;
    while let Some(s) = tasks.join_next().await {
        match s {
            Ok((name, rs)) => {
                match rs {
                    Ok(_) => {
                        info!("{}: client finished", name);
                    }
                    Err(e) => {
                        error!("Error in MQTT client {}: {e}", name);
                        failures += 1;
                        let _ = SHUTDOWN.set(true);
                    }
                }
            }
            Err(e) => {
                error!("Error in mqtt task: {e}");
                failures += 1;
                let _ = SHUTDOWN.set(true);
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} MQTT client(s) failed");
    }
    info!("all clients finished, shutting down");
    Ok(())
}
