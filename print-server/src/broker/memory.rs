//! In-process broker
//!
//! A single queue with at-least-once semantics: a received payload stays
//! in flight until it is acknowledged, and requeued payloads are delivered
//! again ahead of newer ones.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::Envelope;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{AckDecision, BrokerError, DeliveryHandler, SubmissionPublisher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
    /// Set when the payload was delivered before and not acknowledged
    pub redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    next_tag: u64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<u64, Delivery>,
    published: usize,
}

pub struct MemoryBroker {
    state: Mutex<QueueState>,
    notify: Notify,
    available: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the broker going away (publishes fail with `NotConnected`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Number of successful publishes
    pub fn published(&self) -> usize {
        self.state.lock().published
    }

    /// Payloads not yet acknowledged, in flight or waiting
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.ready.len() + state.in_flight.len()
    }

    /// Enqueue a raw payload, bypassing envelope serialization
    pub fn inject(&self, payload: Vec<u8>) -> u64 {
        let tag = {
            let mut state = self.state.lock();
            state.next_tag += 1;
            let tag = state.next_tag;
            state.ready.push_back(Delivery {
                tag,
                payload,
                redelivered: false,
            });
            tag
        };
        self.notify.notify_one();
        tag
    }

    pub fn try_receive(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        let delivery = state.ready.pop_front()?;
        state.in_flight.insert(delivery.tag, delivery.clone());
        Some(delivery)
    }

    /// Wait for the next delivery
    pub async fn receive(&self) -> Delivery {
        loop {
            if let Some(delivery) = self.try_receive() {
                return delivery;
            }
            self.notify.notified().await;
        }
    }

    /// Acknowledge a delivery. Unknown tags are ignored.
    pub fn ack(&self, tag: u64) -> bool {
        self.state.lock().in_flight.remove(&tag).is_some()
    }

    /// Put an unacknowledged delivery back at the head of the queue
    pub fn requeue(&self, tag: u64) -> bool {
        let requeued = {
            let mut state = self.state.lock();
            match state.in_flight.remove(&tag) {
                Some(mut delivery) => {
                    delivery.redelivered = true;
                    state.ready.push_front(delivery);
                    true
                }
                None => false,
            }
        };
        if requeued {
            self.notify.notify_one();
        }
        requeued
    }

    /// Feed deliveries to `handler` until shutdown
    ///
    /// Redelivered payloads wait `retry_delay` before the next attempt.
    pub async fn run_consumer(
        self: Arc<Self>,
        handler: Arc<dyn DeliveryHandler>,
        retry_delay: Duration,
        shutdown: CancellationToken,
    ) {
        tracing::info!("In-memory consumer started");
        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => break,
                delivery = self.receive() => delivery,
            };

            match handler.handle(&delivery.payload).await {
                AckDecision::Ack => {
                    self.ack(delivery.tag);
                }
                AckDecision::Redeliver => {
                    self.requeue(delivery.tag);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }
        tracing::info!("In-memory consumer stopped");
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubmissionPublisher for MemoryBroker {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        let payload = envelope.to_bytes()?;
        self.inject(payload);
        self.state.lock().published += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}
