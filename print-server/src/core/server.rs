//! Server Implementation
//!
//! Wires the components of one run mode together and drives them until
//! Ctrl-C:
//!
//! | mode | HTTP | publisher | subscriber + worker |
//! |------|------|-----------|---------------------|
//! | intake | yes | yes | - |
//! | worker | - | - | yes |
//! | all | yes | yes | yes |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::broker::{DeliveryHandler, MemoryBroker, MqttPublisher, MqttSubscriber, SubmissionPublisher};
use crate::core::{BackgroundTasks, BrokerKind, Config, Result, ServerState, TaskKind};
use crate::db::DbService;
use crate::intake::{IntakeService, SubmissionValidator};
use crate::printing::{EscPosDevice, ReceiptDevice};
use crate::utils::logger::periodic_cleanup;
use crate::worker::{PrintWorker, REDELIVERY_DELAY};

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config;
        let mode = config.run_mode;
        let mut tasks = BackgroundTasks::new();
        let shutdown = tasks.shutdown_token();

        let db = if mode.runs_worker() {
            let db = DbService::new(&config.database_path).await?;
            tracing::info!(path = %config.database_path, "Submission store opened");
            Some(db)
        } else {
            None
        };

        let device: Option<Arc<dyn ReceiptDevice>> = if db.is_some() {
            let device = EscPosDevice::from_config(&config.printer)?;
            Some(Arc::new(device) as Arc<dyn ReceiptDevice>)
        } else {
            None
        };

        let worker: Option<Arc<dyn DeliveryHandler>> = match (&db, &device) {
            (Some(db), Some(device)) => {
                if config.printer.dry_run {
                    tracing::warn!("Dry run: submissions are stored but never printed");
                }
                let worker = PrintWorker::new(
                    db.pool.clone(),
                    device.clone(),
                    config.printer.render_timeout,
                    config.printer.dry_run,
                );
                Some(Arc::new(worker) as Arc<dyn DeliveryHandler>)
            }
            _ => None,
        };

        let publisher: Option<Arc<dyn SubmissionPublisher>> = match config.broker.kind {
            BrokerKind::Memory => {
                let broker = Arc::new(MemoryBroker::new());
                if let Some(worker) = worker {
                    tasks.spawn(
                        "memory_consumer",
                        TaskKind::Worker,
                        broker.clone().run_consumer(worker, REDELIVERY_DELAY, shutdown.clone()),
                    );
                }
                tracing::info!("Using in-process broker");
                mode.runs_intake().then(|| broker as Arc<dyn SubmissionPublisher>)
            }
            BrokerKind::Mqtt => {
                if let Some(worker) = worker {
                    let subscriber = MqttSubscriber::new(&config.broker, REDELIVERY_DELAY);
                    tasks.spawn(
                        "mqtt_subscriber",
                        TaskKind::Worker,
                        subscriber.run(worker, shutdown.clone()),
                    );
                }
                if mode.runs_intake() {
                    let (publisher, driver) = MqttPublisher::new(&config.broker);
                    tasks.spawn("mqtt_publisher", TaskKind::Listener, driver.run(shutdown.clone()));
                    Some(Arc::new(publisher) as Arc<dyn SubmissionPublisher>)
                } else {
                    None
                }
            }
        };

        if let Some(dir) = &config.log.dir {
            tasks.spawn(
                "log_cleanup",
                TaskKind::Periodic,
                periodic_cleanup(PathBuf::from(dir), shutdown.clone()),
            );
        }

        tasks.log_summary();

        let served = match publisher {
            Some(publisher) => {
                let validator = SubmissionValidator::new(config.limits.clone());
                let intake = IntakeService::new(validator, publisher);
                let port = config.http_port;
                let mut state = ServerState::new(config, Some(Arc::new(intake)), db.clone());
                if let Some(device) = device {
                    state = state.with_device(device);
                }
                serve(state, port).await
            }
            None => {
                tracing::info!(mode = %mode, "Running without HTTP server");
                wait_for_ctrl_c().await;
                Ok(())
            }
        };

        tasks.shutdown().await;
        if let Some(db) = db {
            db.close().await;
        }
        tracing::info!("Print server stopped");
        served
    }
}

async fn serve(state: ServerState, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Print server listening on http://{}", addr);

    let app = crate::api::build_app(state);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(wait_for_ctrl_c())
        .await?;
    Ok(())
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down..."),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
