use crate::config_file::ClientConfig;
use crate::consts::{MPSC_BUFFER_SIZE, MQTT_CONNECTION_TIMEOUT, MQTT_POLL_INTERVAL_MILLIS, MQTT_PUBLISH_TIMEOUT, MQTT_RECONNECT_DELAY_MILLIS};
use crate::consumer::run_consumer;
use crate::errors::MQTTError;
use crate::ipc::{IPCMessage, MqttMessage};
use crate::model::current_timestamp_millis;
use crate::mqtt_connection::{MqttConnection, MqttLink};
use crate::producer::run_producer;
use crate::SHUTDOWN;
use rumqttc::{Event, EventLoop, Incoming, Outgoing, SubscribeReasonCode};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};


/// Packet ids of QoS 1/2 publishes the broker has not acknowledged yet.
#[derive(Debug, Default)]
struct InFlight {
    pkids: Vec<u16>
}

impl InFlight {
    fn sent(&mut self, pkid: u16) {
        // QoS 0 publishes carry no packet id
        if pkid != 0 {
            self.pkids.push(pkid);
        }
    }

    fn acked(&mut self, pkid: u16) {
        self.pkids.retain(|x| *x != pkid);
    }

    /// A clean session never acks what was in flight before it.
    fn reset(&mut self) {
        if !self.pkids.is_empty() {
            debug!("dropping {} unacknowledged publishes from the previous session", self.pkids.len());
        }
        self.pkids.clear();
    }

    fn len(&self) -> usize {
        self.pkids.len()
    }

    fn is_empty(&self) -> bool {
        self.pkids.is_empty()
    }
}

/// Runs one configured client: the library event loop on its own task and the
/// client's role alongside it.
pub async fn mqtt_poll_loop(
    client: ClientConfig,
) -> Result<(), MQTTError> {
    let mqtt = MqttConnection::create(&client);
    info!("{}: starting {:?} as {} against {}:{}", client.name, client.role, mqtt.client_id, client.address, client.port);

    let (inbound_tx, inbound_rx) = mpsc::channel::<IPCMessage>(MPSC_BUFFER_SIZE);
    let (connected_tx, connected_rx) = watch::channel(false);
    let mut task: JoinHandle<Result<(), MQTTError>> = tokio::spawn(
        drive_event_loop(client.name.clone(), mqtt.event_loop, inbound_tx, connected_tx)
    );

    let outcome = if client.role.is_producer() {
        drop(inbound_rx);
        run_producer(&client, &mqtt.client, connected_rx).await
    } else {
        run_consumer(&client, &mqtt.client, connected_rx, inbound_rx).await
    };

    let event_loop_result = match timeout(Duration::from_secs(MQTT_PUBLISH_TIMEOUT), &mut task).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => Err(MQTTError::Misc(format!("{}: event loop task failed: {e}", client.name))),
        Err(_) => {
            debug!("{}: event loop still running, aborting it", client.name);
            task.abort();
            Ok(())
        }
    };

    outcome?;
    match event_loop_result {
        Err(MQTTError::ExitingThread) => Ok(()),
        r => r
    }
}

async fn drive_event_loop(
    name: String,
    mut conn: EventLoop,
    inbound_tx: mpsc::Sender<IPCMessage>,
    connected_tx: watch::Sender<bool>,
) -> Result<(), MQTTError> {
    let mut in_flight = InFlight::default();

    loop {
        if SHUTDOWN.initialized() {
            return Err(MQTTError::ExitingThread);
        }
        let notification = match conn.poll().await {
            Ok(event) => event,
            Err(e) => {
                connected_tx.send_replace(false);
                warn!("{}: Unable to poll mqtt: {e}", name);
                sleep(Duration::from_millis(MQTT_RECONNECT_DELAY_MILLIS)).await;
                continue;
            }
        };
        match notification {
            Event::Incoming(i) => {
                match i {
                    Incoming::Disconnect => {
                        error!("{}: mqtt disconnect packet received.", name);
                        connected_tx.send_replace(false);
                        return Err(MQTTError::ExitingThread);
                    }
                    Incoming::ConnAck(ca) => {
                        info!("{}: MQTT connection established ({:?}).", name, ca.code);
                        in_flight.reset();
                        connected_tx.send_replace(true);
                    }
                    Incoming::PubAck(pa) => {
                        debug!("{}: Incoming PubAck {}", name, pa.pkid);
                        in_flight.acked(pa.pkid);
                    }
                    Incoming::PubComp(pc) => {
                        debug!("{}: Incoming PubComp {}", name, pc.pkid);
                        in_flight.acked(pc.pkid);
                    }
                    Incoming::PingResp => {
                        trace!("Recv MQTT PONG");
                    }
                    Incoming::SubAck(sa) => {
                        for code in sa.return_codes.iter() {
                            match code {
                                SubscribeReasonCode::Success(qos) => {
                                    debug!("{}: subscription {} granted at {:?}", name, sa.pkid, qos);
                                }
                                SubscribeReasonCode::Failure => {
                                    let e = MQTTError::Subscribe(name.clone(), format!("packet {}", sa.pkid));
                                    let _ = inbound_tx.send(IPCMessage::Error(e.clone())).await;
                                    return Err(e);
                                }
                            }
                        }
                    }
                    Incoming::Publish(pr) => {
                        trace!("Incoming publish: {:#?}", pr);
                        let message = MqttMessage {
                            topic: pr.topic.clone(),
                            payload: pr.payload.to_vec(),
                            retained: pr.retain,
                            received_at: current_timestamp_millis()
                        };
                        if inbound_tx.send(IPCMessage::Inbound(message)).await.is_err() {
                            debug!("{}: nobody is listening for {}", name, pr.topic);
                        }
                    }
                    _ => {
                        debug!("mqtt incoming packet: {:?}", i);
                    }
                }
            }
            Event::Outgoing(o) => {
                match o {
                    Outgoing::PingReq => {
                        trace!("Sent MQTT PING");
                    }
                    Outgoing::Publish(pkid) => {
                        in_flight.sent(pkid);
                    }
                    Outgoing::Disconnect => {
                        info!("{}: Disconnected !", name);
                        connected_tx.send_replace(false);
                        return Ok(());
                    }
                    _ => {
                        trace!("outgoing mqtt packet: {:?}", o);
                    }
                }
            }
        }
        if !in_flight.is_empty() {
            trace!("{}: {} publishes awaiting ack", name, in_flight.len());
        }
    }
}

/// Waits until the event loop reports a live broker connection.
pub async fn wait_for_connection(name: &str, connected: &mut watch::Receiver<bool>) -> Result<(), MQTTError> {
    let limit = Duration::from_secs(MQTT_CONNECTION_TIMEOUT);
    match timeout(limit, connected.wait_for(|c| *c)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) => Err(MQTTError::EventLoopClosed(name.to_string())),
        Err(_) => Err(MQTTError::ConnectTimeout(name.to_string(), MQTT_CONNECTION_TIMEOUT))
    }
}

/// Sleeps for `duration`, returning early once shutdown is requested.
pub async fn pause(duration: Duration) {
    let deadline = Instant::now() + duration;
    let step = Duration::from_millis(MQTT_POLL_INTERVAL_MILLIS);
    while !SHUTDOWN.initialized() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(step.min(deadline - now)).await;
    }
}

pub async fn disconnect(name: &str, client: &dyn MqttLink) {
    if let Err(e) = client.disconnect().await {
        debug!("{}: disconnect request not delivered: {e}", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_connection_ready() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            tx.send_replace(true);
            sleep(Duration::from_millis(20)).await;
        });
        assert!(wait_for_connection("test", &mut rx).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connection_sender_gone() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(matches!(
            wait_for_connection("test", &mut rx).await,
            Err(MQTTError::EventLoopClosed(n)) if n == "test"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_times_out() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(matches!(
            wait_for_connection("test", &mut rx).await,
            Err(MQTTError::ConnectTimeout(_, 10))
        ));
    }

    #[test]
    fn test_in_flight_tracking() {
        let mut in_flight = InFlight::default();
        in_flight.sent(0);
        assert!(in_flight.is_empty());
        in_flight.sent(1);
        in_flight.sent(2);
        in_flight.acked(1);
        assert_eq!(in_flight.len(), 1);
        in_flight.sent(3);
        in_flight.reset();
        assert!(in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_waits_full_duration() {
        let before = Instant::now();
        pause(Duration::from_millis(1_100)).await;
        assert!(before.elapsed() >= Duration::from_millis(1_100));
    }
}
