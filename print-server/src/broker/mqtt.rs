//! MQTT adapter (rumqttc)
//!
//! The publisher and the subscriber use separate client sessions:
//!
//! - [`MqttPublisher`] + [`MqttDriver`]: clean session, the driver task
//!   polls the event loop and tracks connectivity for the publisher.
//! - [`MqttSubscriber`]: persistent session with manual acknowledgments,
//!   so an unacknowledged delivery survives a reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use shared::Envelope;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AckDecision, Backoff, BrokerError, DeliveryHandler, SubmissionPublisher};
use crate::core::BrokerConfig;

/// Request channel capacity between client handles and the event loop
const CLIENT_CAPACITY: usize = 64;

fn options(config: &BrokerConfig, client_id: &str, clean_session: bool) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
    opts.set_keep_alive(config.keep_alive.max(Duration::from_secs(5)));
    opts.set_clean_session(clean_session);
    opts.set_max_packet_size(config.max_packet_bytes, config.max_packet_bytes);
    opts
}

/// Publishing client used by the intake
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    connected: Arc<AtomicBool>,
    timeout: Duration,
}

/// Event loop of an [`MqttPublisher`]; must be polled for publishes to leave
pub struct MqttDriver {
    eventloop: EventLoop,
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    backoff: Backoff,
}

impl MqttPublisher {
    pub fn new(config: &BrokerConfig) -> (Self, MqttDriver) {
        let client_id = format!("{}-pub", config.client_id);
        let (client, eventloop) =
            AsyncClient::new(options(config, &client_id, true), CLIENT_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let publisher = Self {
            client: client.clone(),
            topic: config.topic.clone(),
            connected: connected.clone(),
            timeout: config.publish_timeout,
        };
        let driver = MqttDriver {
            eventloop,
            client,
            connected,
            backoff: Backoff::default(),
        };
        (publisher, driver)
    }
}

#[async_trait]
impl SubmissionPublisher for MqttPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        let payload = envelope.to_bytes()?;

        tokio::time::timeout(
            self.timeout,
            self.client
                .publish(self.topic.as_str(), QoS::AtLeastOnce, false, payload),
        )
        .await
        .map_err(|_| BrokerError::Timeout(self.timeout))?
        .map_err(|e| BrokerError::Publish(e.to_string()))?;

        debug!(identifier = %envelope.identifier, topic = %self.topic, "Envelope queued for publish");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl MqttDriver {
    /// Poll the event loop until shutdown, reconnecting with backoff
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("MQTT publisher connecting...");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code == ConnectReturnCode::Success {
                            info!("MQTT publisher connected");
                            self.connected.store(true, Ordering::Release);
                            self.backoff.reset();
                        } else {
                            warn!(code = ?ack.code, "MQTT connection refused");
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("MQTT publisher disconnected by broker");
                        self.connected.store(false, Ordering::Release);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        self.connected.store(false, Ordering::Release);
                        let delay = self.backoff.next_sleep();
                        warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "MQTT publisher connection error");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                },
            }
        }

        self.connected.store(false, Ordering::Release);
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        info!("MQTT publisher stopped");
    }
}

/// Consuming client used by the print worker
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    retry_delay: Duration,
    backoff: Backoff,
}

impl MqttSubscriber {
    pub fn new(config: &BrokerConfig, retry_delay: Duration) -> Self {
        let client_id = format!("{}-sub", config.client_id);
        let mut opts = options(config, &client_id, false);
        opts.set_manual_acks(true);
        let (client, eventloop) = AsyncClient::new(opts, CLIENT_CAPACITY);

        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            retry_delay,
            backoff: Backoff::default(),
        }
    }

    /// Process deliveries one at a time until shutdown
    ///
    /// A [`AckDecision::Redeliver`] answer leaves the publish unacknowledged
    /// and drops the connection; the persistent session makes the broker
    /// send it again after reconnecting.
    pub async fn run(mut self, handler: Arc<dyn DeliveryHandler>, shutdown: CancellationToken) {
        info!(topic = %self.topic, "MQTT subscriber connecting...");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        warn!(code = ?ack.code, "MQTT connection refused");
                        continue;
                    }
                    info!(session_present = ack.session_present, "MQTT subscriber connected");
                    self.backoff.reset();
                    if let Err(e) = self.client.subscribe(self.topic.as_str(), QoS::AtLeastOnce).await {
                        error!(error = %e, topic = %self.topic, "Subscribe request failed");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!(topic = %self.topic, "Subscribed");
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(pkid = publish.pkid, dup = publish.dup, len = publish.payload.len(), "Delivery received");
                    match handler.handle(&publish.payload).await {
                        AckDecision::Ack => {
                            if let Err(e) = self.client.ack(&publish).await {
                                error!(error = %e, pkid = publish.pkid, "Ack request failed");
                            }
                        }
                        AckDecision::Redeliver => {
                            warn!(
                                pkid = publish.pkid,
                                retry_in_ms = self.retry_delay.as_millis() as u64,
                                "Delivery left unacknowledged, reconnecting for redelivery"
                            );
                            tokio::select! {
                                _ = shutdown.cancelled() => break,
                                _ = tokio::time::sleep(self.retry_delay) => {}
                            }
                            if let Err(e) = self.client.disconnect().await {
                                debug!(error = %e, "MQTT disconnect request failed");
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let delay = self.backoff.next_sleep();
                    warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "MQTT subscriber connection error");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request failed");
        }
        info!("MQTT subscriber stopped");
    }
}
