//! Health check route
//!
//! | path | method | notes |
//! |------|--------|-------|
//! | /health | GET | liveness, version, broker, store and printer status |
//!
//! ```json
//! {
//!   "status": "healthy",
//!   "version": "0.1.0",
//!   "run_mode": "all",
//!   "uptime_seconds": 42,
//!   "checks": {
//!     "broker": { "status": "ok" },
//!     "database": { "status": "ok", "latency_ms": 0 },
//!     "printer": { "status": "error", "code": 9201, "message": "Printer not available" }
//!   }
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shared::error::ErrorCode;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// healthy | degraded
    status: &'static str,
    version: &'static str,
    run_mode: &'static str,
    uptime_seconds: u64,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    #[serde(skip_serializing_if = "Option::is_none")]
    broker: Option<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    printer: Option<CheckResult>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// ok | error
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl CheckResult {
    fn ok() -> Self {
        Self {
            status: "ok",
            latency_ms: None,
            code: None,
            message: None,
        }
    }

    fn ok_with_latency(latency_ms: u64) -> Self {
        Self {
            latency_ms: Some(latency_ms),
            ..Self::ok()
        }
    }

    fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            latency_ms: None,
            code: Some(code),
            message: Some(message.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let broker = state.intake.as_ref().map(|intake| {
        if intake.broker_connected() {
            CheckResult::ok()
        } else {
            CheckResult::error(ErrorCode::BrokerNotConnected, "Broker not connected")
        }
    });

    let database = match &state.db {
        Some(db) => {
            let started = std::time::Instant::now();
            let check = match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&db.pool).await {
                Ok(_) => CheckResult::ok_with_latency(started.elapsed().as_millis() as u64),
                Err(e) => CheckResult::error(ErrorCode::DatabaseError, format!("Database error: {e}")),
            };
            Some(check)
        }
        None => None,
    };

    let printer = match &state.device {
        Some(device) => Some(if device.is_online().await {
            CheckResult::ok()
        } else {
            CheckResult::error(
                ErrorCode::PrinterNotAvailable,
                ErrorCode::PrinterNotAvailable.message(),
            )
        }),
        None => None,
    };

    let all_ok = [&broker, &database, &printer]
        .into_iter()
        .all(|check| check.as_ref().is_none_or(CheckResult::is_ok));

    Json(HealthResponse {
        status: if all_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        run_mode: state.config.run_mode.as_str(),
        uptime_seconds: state.uptime_seconds(),
        checks: HealthChecks {
            broker,
            database,
            printer,
        },
    })
}
