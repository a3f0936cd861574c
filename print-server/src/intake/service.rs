use std::sync::Arc;

use chrono::Utc;
use shared::error::AppError;
use shared::{Envelope, IdGenerator, SubmissionId};
use thiserror::Error;

use super::validation::{SubmissionRequest, SubmissionValidator, ValidationErrors};
use crate::broker::{BrokerError, SubmissionPublisher};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Validation(e) => e.into(),
            IntakeError::Broker(e) => e.into(),
        }
    }
}

/// Accepts submissions: validate, assign an identifier, publish
pub struct IntakeService {
    validator: SubmissionValidator,
    ids: IdGenerator,
    publisher: Arc<dyn SubmissionPublisher>,
}

impl IntakeService {
    pub fn new(validator: SubmissionValidator, publisher: Arc<dyn SubmissionPublisher>) -> Self {
        Self {
            validator,
            ids: IdGenerator::new(),
            publisher,
        }
    }

    pub fn broker_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Validate and publish one submission
    ///
    /// Nothing is published for a rejected submission. An identifier whose
    /// publish failed is discarded, never handed out again.
    pub async fn submit(
        &self,
        request: SubmissionRequest,
        client_address: &str,
    ) -> Result<SubmissionId, IntakeError> {
        let valid = self.validator.validate(request).map_err(|e| {
            tracing::info!(client = %client_address, errors = %e, "Submission rejected");
            e
        })?;

        let identifier = self.ids.next_id();
        let envelope = Envelope {
            identifier,
            title: valid.title,
            text: valid.text,
            image: valid.image,
            client_address: client_address.to_string(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self.publisher.publish(&envelope).await {
            tracing::warn!(identifier = %identifier, error = %e, "Submission publish failed");
            return Err(e.into());
        }

        tracing::info!(
            identifier = %identifier,
            client = %client_address,
            has_image = envelope.image.is_some(),
            "Submission accepted"
        );
        Ok(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::core::LimitsConfig;
    use std::collections::HashSet;

    fn service(broker: Arc<MemoryBroker>) -> IntakeService {
        IntakeService::new(SubmissionValidator::new(LimitsConfig::default()), broker)
    }

    fn request(text: &str) -> SubmissionRequest {
        SubmissionRequest {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_envelope() {
        let broker = Arc::new(MemoryBroker::new());
        let intake = service(broker.clone());

        let id = intake.submit(request("Hello, world!"), "10.0.0.2").await.unwrap();

        assert_eq!(broker.published(), 1);
        let delivery = broker.try_receive().unwrap();
        let envelope = Envelope::from_slice(&delivery.payload).unwrap();
        assert_eq!(envelope.identifier, id);
        assert_eq!(envelope.text, "Hello, world!");
        assert_eq!(envelope.client_address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_identifiers_are_unique() {
        let broker = Arc::new(MemoryBroker::new());
        let intake = service(broker.clone());

        let mut seen = HashSet::new();
        for i in 0..500 {
            let id = intake.submit(request(&format!("entry {i}")), "127.0.0.1").await.unwrap();
            assert!(seen.insert(id));
        }
        assert_eq!(broker.published(), 500);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_not_published() {
        let broker = Arc::new(MemoryBroker::new());
        let intake = service(broker.clone());

        let too_long = "x".repeat(LimitsConfig::default().max_text_chars + 1);
        let err = intake.submit(request(&too_long), "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, IntakeError::Validation(_)));

        let mut oversized = request("picture");
        oversized.image = Some(vec![0u8; LimitsConfig::default().max_image_bytes + 1]);
        assert!(intake.submit(oversized, "127.0.0.1").await.is_err());

        assert_eq!(broker.published(), 0);
    }

    #[tokio::test]
    async fn test_broker_down_is_retryable() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_available(false);
        let intake = service(broker.clone());

        let err = intake.submit(request("hi"), "127.0.0.1").await.unwrap_err();
        let app: AppError = err.into();
        assert_eq!(app.http_status(), http::StatusCode::SERVICE_UNAVAILABLE);

        broker.set_available(true);
        let first = intake.submit(request("hi"), "127.0.0.1").await.unwrap();
        let second = intake.submit(request("hi"), "127.0.0.1").await.unwrap();
        assert_ne!(first, second);
    }
}
