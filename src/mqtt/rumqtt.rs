//! rumqttc-backed publisher.
//!
//! One client and one event-loop task per broker. The constructor waits for
//! the broker handshake so connect failures surface before any stream starts
//! publishing; keepalive and reconnects are delegated to rumqttc.

use crate::config::model::BrokerSpec;
use crate::error::TransportError;
use crate::mqtt::{BrokerConnector, Publisher};
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// MQTT 3.1.1 publisher over rumqttc.
#[derive(Debug)]
pub struct MqttPublisher {
    broker: String,
    client: AsyncClient,
    alive: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Connect to the broker and wait for its CONNACK.
    pub async fn connect(spec: &BrokerSpec) -> Result<MqttPublisher, TransportError> {
        let client_id = spec
            .client_id
            .clone()
            .unwrap_or_else(|| format!("mqtt-sim-{}", spec.name));
        let mut options = MqttOptions::new(client_id, spec.host.clone(), spec.port);
        options.set_keep_alive(Duration::from_secs(spec.keepalive));
        if let Some(username) = &spec.username {
            options.set_credentials(username.clone(), spec.password.clone().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(drive_event_loop(
            spec.name.clone(),
            event_loop,
            alive.clone(),
            ready_tx,
        ));

        let handshake = tokio::time::timeout(CONNECT_TIMEOUT, ready_rx)
            .await
            .map_err(|_| TransportError::Connect {
                broker: spec.name.clone(),
                message: format!("handshake timed out after {CONNECT_TIMEOUT:?}"),
            })?
            .map_err(|_| TransportError::Connect {
                broker: spec.name.clone(),
                message: "event loop exited before handshake".to_string(),
            })?;
        handshake.map_err(|message| TransportError::Connect {
            broker: spec.name.clone(),
            message,
        })?;

        tracing::info!(
            broker = %spec.name,
            host = %spec.host,
            port = spec.port,
            "broker connected"
        );
        Ok(MqttPublisher {
            broker: spec.name.clone(),
            client,
            alive,
        })
    }
}

/// Poll the event loop forever; report the first handshake outcome, flag the
/// publisher dead on transport errors.
async fn drive_event_loop(
    broker: String,
    mut event_loop: EventLoop,
    alive: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut ready = Some(ready);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let outcome = if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("broker rejected connect ({:?})", ack.code))
                };
                let rejected = outcome.is_err();
                if let Some(tx) = ready.take() {
                    let _ = tx.send(outcome);
                }
                if rejected {
                    alive.store(false, Ordering::SeqCst);
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(err.to_string()));
                } else {
                    tracing::warn!(broker = %broker, error = %err, "event loop stopped");
                }
                alive.store(false, Ordering::SeqCst);
                return;
            }
        }
    }
}

fn qos_level(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: u8,
        retain: bool,
    ) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed(self.broker.clone()));
        }
        self.client
            .publish(topic, qos_level(qos), retain, payload.to_vec())
            .await
            .map_err(|err| TransportError::Publish {
                topic: topic.to_string(),
                message: err.to_string(),
            })
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.alive.store(false, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|err| TransportError::Publish {
                topic: String::new(),
                message: format!("disconnect failed: {err}"),
            })
    }
}

/// Default connector: one rumqttc publisher per broker.
pub struct MqttConnector;

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self, spec: &BrokerSpec) -> Result<Arc<dyn Publisher>, TransportError> {
        Ok(Arc::new(MqttPublisher::connect(spec).await?))
    }
}
