//! Print worker
//!
//! Processes one delivery at a time:
//!
//! ```text
//! payload ─► decode ─► exists? ─► insert ─► render ─► mark printed
//!              │          │          │         │
//!          malformed  duplicate  store down  device error
//!            (ack)      (ack)   (redeliver)  (alert, ack)
//! ```
//!
//! The store is the idempotence boundary: a redelivered envelope finds its
//! row and is skipped, so it is never printed twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use receipt_printer::PrintError;
use shared::Envelope;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::broker::{AckDecision, DeliveryHandler};
use crate::db::repository::{InsertOutcome, SubmissionRecord, submission};
use crate::printing::{PrinterJob, ReceiptDevice};
use crate::utils::ALERT_TARGET;

/// Pause before a delivery left unacknowledged comes back
pub const REDELIVERY_DELAY: Duration = Duration::from_secs(2);

/// What happened to one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Printed,
    Duplicate,
    Malformed,
    /// Persisted, but the device failed
    PrintFailed,
    /// Persisted, rendering skipped
    DryRun,
    /// Store unavailable; leave the delivery with the broker
    Retry,
}

impl Disposition {
    pub fn should_ack(&self) -> bool {
        !matches!(self, Disposition::Retry)
    }
}

pub struct PrintWorker {
    pool: SqlitePool,
    device: Arc<dyn ReceiptDevice>,
    render_timeout: Duration,
    dry_run: bool,
}

impl PrintWorker {
    pub fn new(
        pool: SqlitePool,
        device: Arc<dyn ReceiptDevice>,
        render_timeout: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            pool,
            device,
            render_timeout,
            dry_run,
        }
    }

    pub async fn process(&self, payload: &[u8]) -> Disposition {
        let envelope = match Envelope::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = payload.len(), "Malformed envelope discarded");
                return Disposition::Malformed;
            }
        };
        let identifier = envelope.identifier.to_string();

        match submission::exists(&self.pool, &identifier).await {
            Ok(true) => {
                info!(identifier = %identifier, "Duplicate delivery skipped");
                return Disposition::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Store lookup failed, delivery left for redelivery");
                return Disposition::Retry;
            }
        }

        let record = SubmissionRecord::from(&envelope);
        match submission::insert(&self.pool, &record).await {
            Ok(InsertOutcome::Inserted) => {
                debug!(identifier = %identifier, "Submission persisted");
            }
            Ok(InsertOutcome::AlreadyExists) => {
                info!(identifier = %identifier, "Duplicate delivery skipped at insert");
                return Disposition::Duplicate;
            }
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Persist failed, delivery left for redelivery");
                return Disposition::Retry;
            }
        }

        if self.dry_run {
            info!(identifier = %identifier, "Dry run: rendering skipped");
            return Disposition::DryRun;
        }

        let job = PrinterJob::from(envelope);
        let result = tokio::time::timeout(self.render_timeout, self.device.render(&job))
            .await
            .unwrap_or_else(|_| {
                Err(PrintError::Timeout(format!(
                    "render exceeded {} ms",
                    self.render_timeout.as_millis()
                )))
            });

        if let Err(e) = result {
            error!(
                target: ALERT_TARGET,
                identifier = %identifier,
                error = %e,
                "Receipt not printed"
            );
            return Disposition::PrintFailed;
        }

        match submission::mark_printed(&self.pool, &identifier).await {
            Ok(true) => {}
            Ok(false) => warn!(identifier = %identifier, "Printed record vanished before update"),
            Err(e) => warn!(identifier = %identifier, error = %e, "Printed flag not stored"),
        }
        Disposition::Printed
    }
}

#[async_trait]
impl DeliveryHandler for PrintWorker {
    async fn handle(&self, payload: &[u8]) -> AckDecision {
        let disposition = self.process(payload).await;
        debug!(?disposition, "Delivery processed");
        if disposition.should_ack() {
            AckDecision::Ack
        } else {
            AckDecision::Redeliver
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbService;
    use parking_lot::Mutex;
    use receipt_printer::PrintResult;
    use shared::SubmissionId;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct RecordingDevice {
        jobs: Mutex<Vec<PrinterJob>>,
    }

    #[async_trait]
    impl ReceiptDevice for RecordingDevice {
        async fn render(&self, job: &PrinterJob) -> PrintResult<()> {
            self.jobs.lock().push(job.clone());
            Ok(())
        }

        async fn is_online(&self) -> bool {
            true
        }
    }

    struct FailingDevice;

    #[async_trait]
    impl ReceiptDevice for FailingDevice {
        async fn render(&self, _job: &PrinterJob) -> PrintResult<()> {
            Err(PrintError::NotConnected("unplugged".into()))
        }

        async fn is_online(&self) -> bool {
            false
        }
    }

    struct StuckDevice;

    #[async_trait]
    impl ReceiptDevice for StuckDevice {
        async fn render(&self, _job: &PrinterJob) -> PrintResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn is_online(&self) -> bool {
            true
        }
    }

    fn payload(raw: u64, text: &str) -> Vec<u8> {
        Envelope {
            identifier: SubmissionId::from_raw(raw),
            title: Some("Hi".into()),
            text: text.to_string(),
            image: None,
            client_address: "10.0.0.9".into(),
            timestamp: chrono::Utc::now(),
        }
        .to_bytes()
        .unwrap()
    }

    async fn worker(device: Arc<dyn ReceiptDevice>) -> (PrintWorker, DbService) {
        let db = DbService::in_memory().await.unwrap();
        let worker = PrintWorker::new(db.pool.clone(), device, Duration::from_millis(200), false);
        (worker, db)
    }

    #[tokio::test]
    async fn test_prints_and_marks_printed() {
        let device = Arc::new(RecordingDevice::default());
        let (worker, db) = worker(device.clone()).await;

        assert_eq!(worker.process(&payload(1000, "Hello, world!")).await, Disposition::Printed);

        let id = SubmissionId::from_raw(1000).to_string();
        let record = submission::find(&db.pool, &id).await.unwrap().unwrap();
        assert_eq!(record.text, "Hello, world!");
        assert!(record.printed);

        let jobs = device.jobs.lock();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].footer(), format!("#{id}"));
    }

    #[tokio::test]
    async fn test_redelivery_prints_once() {
        let device = Arc::new(RecordingDevice::default());
        let (worker, db) = worker(device.clone()).await;

        let p = payload(2000, "twice");
        assert_eq!(worker.process(&p).await, Disposition::Printed);
        assert_eq!(worker.process(&p).await, Disposition::Duplicate);

        assert_eq!(submission::count(&db.pool).await.unwrap(), 1);
        assert_eq!(device.jobs.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_is_acked() {
        let device = Arc::new(RecordingDevice::default());
        let (worker, db) = worker(device.clone()).await;

        assert_eq!(worker.handle(b"{not json").await, AckDecision::Ack);
        assert_eq!(submission::count(&db.pool).await.unwrap(), 0);
        assert!(device.jobs.lock().is_empty());
    }

    #[tokio::test]
    async fn test_store_down_is_not_acked() {
        let device = Arc::new(RecordingDevice::default());
        let (worker, db) = worker(device.clone()).await;
        db.close().await;

        assert_eq!(worker.process(&payload(3000, "lost?")).await, Disposition::Retry);
        assert_eq!(worker.handle(&payload(3000, "lost?")).await, AckDecision::Redeliver);
        assert!(device.jobs.lock().is_empty());
    }

    /// One `alert` event naming the identifier and the device error
    fn alert_logged(lines: &[&str], identifier: &str, error: &str) -> Result<(), String> {
        let alerts: Vec<_> = lines
            .iter()
            .filter(|line| line.contains(" alert: ") && line.contains("Receipt not printed"))
            .collect();
        match alerts.as_slice() {
            [line] if line.contains(&format!("identifier={identifier}")) && line.contains(error) => {
                Ok(())
            }
            other => Err(format!("expected one alert for {identifier}, got {other:?}")),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_device_failure_is_acked_and_persisted() {
        let (worker, db) = worker(Arc::new(FailingDevice)).await;

        assert_eq!(worker.handle(&payload(4000, "no paper")).await, AckDecision::Ack);

        let id = SubmissionId::from_raw(4000).to_string();
        let record = submission::find(&db.pool, &id).await.unwrap().unwrap();
        assert!(!record.printed);

        logs_assert(|lines: &[&str]| {
            alert_logged(lines, &SubmissionId::from_raw(4000).to_string(), "unplugged")
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_render_timeout_is_a_print_failure() {
        let (worker, _db) = worker(Arc::new(StuckDevice)).await;
        assert_eq!(worker.process(&payload(5000, "slow")).await, Disposition::PrintFailed);

        logs_assert(|lines: &[&str]| {
            alert_logged(lines, &SubmissionId::from_raw(5000).to_string(), "render exceeded 200 ms")
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_printed_receipt_raises_no_alert() {
        let (worker, _db) = worker(Arc::new(RecordingDevice::default())).await;
        assert_eq!(worker.process(&payload(7000, "fine")).await, Disposition::Printed);
        assert!(!logs_contain("Receipt not printed"));
    }

    #[tokio::test]
    async fn test_dry_run_persists_without_rendering() {
        let device = Arc::new(RecordingDevice::default());
        let db = DbService::in_memory().await.unwrap();
        let worker = PrintWorker::new(db.pool.clone(), device.clone(), Duration::from_secs(1), true);

        assert_eq!(worker.process(&payload(6000, "dry")).await, Disposition::DryRun);
        assert_eq!(submission::count(&db.pool).await.unwrap(), 1);
        assert!(device.jobs.lock().is_empty());
    }
}
