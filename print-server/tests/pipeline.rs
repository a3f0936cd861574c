//! End-to-end pipeline tests: HTTP intake ─► in-memory broker ─► worker ─► device

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use parking_lot::Mutex;
use print_server::broker::{AckDecision, DeliveryHandler, MemoryBroker};
use print_server::core::{Config, ServerState};
use print_server::db::DbService;
use print_server::db::repository::submission;
use print_server::intake::{IntakeService, SubmissionValidator};
use print_server::printing::{PrinterJob, ReceiptDevice, ReceiptRenderer};
use print_server::worker::PrintWorker;
use receipt_printer::{PrintError, PrintResult, Pos5890};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Renders like the real device and keeps the bytes
#[derive(Default)]
struct RecordingDevice {
    printed: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl ReceiptDevice for RecordingDevice {
    async fn render(&self, job: &PrinterJob) -> PrintResult<()> {
        let data = ReceiptRenderer::new(Arc::new(Pos5890)).render(job);
        self.printed.lock().push(data);
        Ok(())
    }

    async fn is_online(&self) -> bool {
        true
    }
}

struct UnpluggedDevice;

#[async_trait]
impl ReceiptDevice for UnpluggedDevice {
    async fn render(&self, _job: &PrinterJob) -> PrintResult<()> {
        Err(PrintError::NotConnected("no device".into()))
    }

    async fn is_online(&self) -> bool {
        false
    }
}

struct Pipeline {
    app: Router,
    broker: Arc<MemoryBroker>,
    db: DbService,
    worker: Arc<PrintWorker>,
}

async fn pipeline(device: Arc<dyn ReceiptDevice>) -> Pipeline {
    let config = Config::from_lookup(|key| match key {
        "BROKER" => Some("memory".into()),
        "PRINTER_TRANSPORT" => Some("dry-run".into()),
        "PRINTER_PROFILE" => Some("POS-5890".into()),
        "MAX_TEXT_CHARS" => Some("200".into()),
        "MAX_IMAGE_BYTES" => Some("1024".into()),
        _ => None,
    })
    .unwrap();

    let broker = Arc::new(MemoryBroker::new());
    let db = DbService::in_memory().await.unwrap();
    let intake = IntakeService::new(SubmissionValidator::new(config.limits.clone()), broker.clone());
    let worker = Arc::new(PrintWorker::new(
        db.pool.clone(),
        device,
        config.printer.render_timeout,
        false,
    ));

    let state = ServerState::new(config, Some(Arc::new(intake)), Some(db.clone()));
    Pipeline {
        app: print_server::api::build_app(state),
        broker,
        db,
        worker,
    }
}

async fn submit(app: &Router, body: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::post("/api/submissions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[tokio::test]
async fn test_hello_world_end_to_end() {
    let device = Arc::new(RecordingDevice::default());
    let p = pipeline(device.clone()).await;

    let (status, json) = submit(&p.app, r#"{"text":"Hello, world!"}"#).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let identifier = json["data"]["identifier"].as_str().unwrap().to_string();

    let delivery = p.broker.try_receive().unwrap();
    assert_eq!(p.worker.handle(&delivery.payload).await, AckDecision::Ack);
    assert!(p.broker.ack(delivery.tag));

    let record = submission::find(&p.db.pool, &identifier).await.unwrap().unwrap();
    assert_eq!(record.text, "Hello, world!");
    assert!(record.printed);

    let printed = device.printed.lock();
    assert_eq!(printed.len(), 1);
    assert!(contains(&printed[0], b"Hello, world!"));
    assert!(contains(&printed[0], format!("#{identifier}").as_bytes()));
}

#[tokio::test]
async fn test_redelivered_envelope_prints_once() {
    let device = Arc::new(RecordingDevice::default());
    let p = pipeline(device.clone()).await;

    submit(&p.app, r#"{"text":"only once"}"#).await;
    let delivery = p.broker.try_receive().unwrap();

    assert_eq!(p.worker.handle(&delivery.payload).await, AckDecision::Ack);
    assert_eq!(p.worker.handle(&delivery.payload).await, AckDecision::Ack);

    assert_eq!(submission::count(&p.db.pool).await.unwrap(), 1);
    assert_eq!(device.printed.lock().len(), 1);
}

#[tokio::test]
async fn test_store_down_keeps_envelope_for_redelivery() {
    let device = Arc::new(RecordingDevice::default());
    let p = pipeline(device.clone()).await;

    submit(&p.app, r#"{"text":"keep me"}"#).await;
    p.db.close().await;

    let delivery = p.broker.try_receive().unwrap();
    assert_eq!(p.worker.handle(&delivery.payload).await, AckDecision::Redeliver);
    assert!(p.broker.requeue(delivery.tag));

    assert_eq!(p.broker.pending(), 1);
    let again = p.broker.try_receive().unwrap();
    assert!(again.redelivered);
    assert_eq!(again.payload, delivery.payload);
    assert!(device.printed.lock().is_empty());
}

#[tokio::test]
async fn test_unplugged_printer_still_persists_and_acks() {
    let p = pipeline(Arc::new(UnpluggedDevice)).await;

    let (_, json) = submit(&p.app, r#"{"title":"Hi","text":"paper jam"}"#).await;
    let identifier = json["data"]["identifier"].as_str().unwrap().to_string();

    let delivery = p.broker.try_receive().unwrap();
    assert_eq!(p.worker.handle(&delivery.payload).await, AckDecision::Ack);

    let record = submission::find(&p.db.pool, &identifier).await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Hi"));
    assert!(!record.printed);
}

#[tokio::test]
async fn test_oversized_submissions_are_rejected_without_publish() {
    let p = pipeline(Arc::new(RecordingDevice::default())).await;

    let long = "x".repeat(201);
    let (status, json) = submit(&p.app, &format!(r#"{{"text":"{long}"}}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["details"]["text"].is_string());

    // 1500 zero bytes, base64 encoded
    let image = "AAAA".repeat(500);
    let (status, json) = submit(&p.app, &format!(r#"{{"text":"ok","image":"{image}"}}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["details"]["image"].is_string());

    assert_eq!(p.broker.published(), 0);
}

#[tokio::test]
async fn test_broker_down_returns_503_and_nothing_is_queued() {
    let p = pipeline(Arc::new(RecordingDevice::default())).await;
    p.broker.set_available(false);

    let (status, json) = submit(&p.app, r#"{"text":"later"}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_ne!(json["code"], 0);
    assert_eq!(p.broker.pending(), 0);
}

#[tokio::test]
async fn test_consumer_loop_drains_the_queue() {
    let device = Arc::new(RecordingDevice::default());
    let p = pipeline(device.clone()).await;

    for i in 0..3 {
        let (status, _) = submit(&p.app, &format!(r#"{{"text":"entry {i}"}}"#)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let shutdown = CancellationToken::new();
    let handler: Arc<dyn DeliveryHandler> = p.worker.clone();
    let consumer = tokio::spawn(p.broker.clone().run_consumer(
        handler,
        Duration::from_millis(10),
        shutdown.clone(),
    ));

    tokio::time::timeout(Duration::from_secs(5), async {
        while device.printed.lock().len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    consumer.await.unwrap();

    assert_eq!(p.broker.pending(), 0);
    assert_eq!(submission::count(&p.db.pool).await.unwrap(), 3);
}
