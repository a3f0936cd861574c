//! Message broker adapters
//!
//! The intake publishes envelopes through a [`SubmissionPublisher`]; the
//! worker side hands every delivered payload to a [`DeliveryHandler`] and
//! acknowledges according to its answer.
//!
//! - [`mqtt`] - MQTT 3.1.1 (QoS 1, manual acks, persistent worker session)
//! - [`memory`] - in-process queue for tests and single-process runs

pub mod backoff;
pub mod memory;
pub mod mqtt;

pub use backoff::Backoff;
pub use memory::MemoryBroker;
pub use mqtt::{MqttDriver, MqttPublisher, MqttSubscriber};

use async_trait::async_trait;
use shared::Envelope;
use shared::error::{AppError, ErrorCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker not connected")]
    NotConnected,

    #[error("Publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Envelope serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        let code = match &err {
            BrokerError::NotConnected => ErrorCode::BrokerNotConnected,
            BrokerError::Timeout(_) => ErrorCode::TimeoutError,
            BrokerError::Publish(_) => ErrorCode::BrokerPublishFailed,
            BrokerError::Serialize(_) => ErrorCode::InternalError,
        };
        AppError::with_message(code, err.to_string())
    }
}

/// Publishing half of the broker
#[async_trait]
pub trait SubmissionPublisher: Send + Sync {
    /// Publish one envelope to the submission topic (QoS 1)
    async fn publish(&self, envelope: &Envelope) -> Result<(), BrokerError>;

    fn is_connected(&self) -> bool;
}

/// What the broker should do with a delivery once it has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    Ack,
    /// Leave unacknowledged so the broker delivers it again
    Redeliver,
}

/// Consuming half of the broker
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> AckDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_errors_map_to_service_unavailable() {
        for err in [
            BrokerError::NotConnected,
            BrokerError::Timeout(Duration::from_secs(5)),
            BrokerError::Publish("channel closed".into()),
        ] {
            let app: AppError = err.into();
            assert_eq!(app.http_status(), http::StatusCode::SERVICE_UNAVAILABLE);
            assert!(app.is_retryable());
        }
    }

    #[test]
    fn test_not_connected_code() {
        let app: AppError = BrokerError::NotConnected.into();
        assert_eq!(app.code, ErrorCode::BrokerNotConnected);
    }
}
