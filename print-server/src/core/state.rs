use std::sync::Arc;
use std::time::Instant;

use shared::error::{AppError, ErrorCode};

use crate::core::Config;
use crate::db::DbService;
use crate::intake::IntakeService;
use crate::printing::ReceiptDevice;

/// Handles shared by every HTTP handler
///
/// Cloning is cheap; every field is reference counted.
///
/// | field | present when |
/// |-------|--------------|
/// | intake | the process runs the intake (`intake`, `all`) |
/// | db | the process owns the store (`worker`, `all`) |
/// | device | the process prints (`worker`, `all`) |
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub intake: Option<Arc<IntakeService>>,
    pub db: Option<DbService>,
    pub device: Option<Arc<dyn ReceiptDevice>>,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(config: Config, intake: Option<Arc<IntakeService>>, db: Option<DbService>) -> Self {
        Self {
            config: Arc::new(config),
            intake,
            db,
            device: None,
            started_at: Instant::now(),
        }
    }

    /// Report this receipt device in `/health`
    pub fn with_device(mut self, device: Arc<dyn ReceiptDevice>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn intake(&self) -> Result<&IntakeService, AppError> {
        self.intake.as_deref().ok_or_else(|| {
            AppError::with_message(
                ErrorCode::BrokerNotConnected,
                "This process does not accept submissions",
            )
        })
    }

    pub fn db(&self) -> Result<&DbService, AppError> {
        self.db
            .as_ref()
            .ok_or_else(|| AppError::new(ErrorCode::StoreUnavailable))
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
