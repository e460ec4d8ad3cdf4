//! # Broker Transport Module
//!
//! Binds the dashboard to an MQTT broker through `rumqttc`.
//!
//! This module handles:
//! - Building connection options (TCP, TLS, WebSocket, secure WebSocket)
//! - Driving the client event loop and translating it into [`TransportEvent`]s
//! - At-most-once subscribe and publish
//! - The reconnection policy: report the error, wait, then retry

pub mod binding;

pub use binding::{SessionId, TransportEvent, TransportEventSender, TransportFactory, TransportHandle};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, Transport};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{BrokerConfig, BrokerTransport};
use crate::error::{DashboardError, Result};

/// How long `close` waits for the event loop to flush the disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens MQTT connections for the configured broker
#[derive(Debug, Clone)]
pub struct MqttTransportFactory {
    config: BrokerConfig,
}

impl MqttTransportFactory {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Broker address as shown to the operator
    pub fn broker_address(&self) -> String {
        broker_address(&self.config)
    }

    /// Build client options for a new connection
    fn mqtt_options(&self, client_id: &str) -> MqttOptions {
        let config = &self.config;
        let host = match config.transport {
            BrokerTransport::Tcp | BrokerTransport::Tls => config.host.clone(),
            BrokerTransport::Ws | BrokerTransport::Wss => broker_address(config),
        };

        let mut options = MqttOptions::new(client_id, host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_s));
        options.set_clean_session(config.clean_session);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        match config.transport {
            BrokerTransport::Tcp => {}
            BrokerTransport::Tls => {
                options.set_transport(Transport::tls_with_default_config());
            }
            BrokerTransport::Ws => {
                options.set_transport(Transport::Ws);
            }
            BrokerTransport::Wss => {
                options.set_transport(Transport::wss_with_default_config());
            }
        }

        options
    }
}

impl TransportFactory for MqttTransportFactory {
    fn open(&self, client_id: &str, events: TransportEventSender) -> Result<Box<dyn TransportHandle>> {
        info!("Connecting to broker {} as {}", self.broker_address(), client_id);

        let options = self.mqtt_options(client_id);
        let (client, eventloop) = AsyncClient::new(options, self.config.request_capacity);
        let closed = Arc::new(AtomicBool::new(false));
        let reconnect_period = Duration::from_millis(self.config.reconnect_period_ms);

        let task = tokio::spawn(drive_event_loop(
            eventloop,
            events,
            closed.clone(),
            reconnect_period,
        ));

        Ok(Box::new(MqttTransport {
            client,
            closed,
            task: Mutex::new(Some(task)),
        }))
    }
}

/// An open MQTT connection
pub struct MqttTransport {
    client: AsyncClient,
    closed: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MqttTransport {
    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().ok().and_then(|mut task| task.take())
    }
}

#[async_trait]
impl TransportHandle for MqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| DashboardError::Transport(format!("Failed to subscribe to {}: {}", topic, e)))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| DashboardError::Publish(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| DashboardError::Transport(format!("Failed to disconnect: {}", e)));

        if let Some(task) = self.take_task() {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
                warn!("MQTT event loop did not stop in time, aborting");
                abort.abort();
            }
        }

        result
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }
}

/// Poll the client event loop until it is closed or gives up
async fn drive_event_loop(
    mut eventloop: EventLoop,
    events: TransportEventSender,
    closed: Arc<AtomicBool>,
    reconnect_period: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connected to MQTT broker");
                    events.emit(TransportEvent::Connected);
                } else {
                    events.emit(TransportEvent::Error(format!(
                        "Broker refused connection: {:?}",
                        ack.code
                    )));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Received on {} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                events.emit(TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload,
                });
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                debug!("Subscription acknowledged (pkid {})", ack.pkid);
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closed.load(Ordering::SeqCst) {
                    break;
                }

                error!("MQTT connection error: {}", e);
                if !events.emit(TransportEvent::Error(e.to_string())) {
                    break;
                }

                if reconnect_period.is_zero() {
                    events.emit(TransportEvent::Offline);
                    break;
                }

                tokio::time::sleep(reconnect_period).await;
                if closed.load(Ordering::SeqCst) {
                    break;
                }
                info!("Attempting to reconnect to broker");
                events.emit(TransportEvent::Reconnecting);
            }
        }
    }
}

fn broker_address(config: &BrokerConfig) -> String {
    match config.transport {
        BrokerTransport::Tcp => format!("mqtt://{}:{}", config.host, config.port),
        BrokerTransport::Tls => format!("mqtts://{}:{}", config.host, config.port),
        BrokerTransport::Ws => format!("ws://{}:{}{}", config.host, config.port, config.path),
        BrokerTransport::Wss => format!("wss://{}:{}{}", config.host, config.port, config.path),
    }
}
