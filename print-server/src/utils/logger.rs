//! Logging Infrastructure
//!
//! Structured logging for console and, optionally, files:
//! - Daily rotating application logs (deleted after 14 days)
//! - Daily rotating alert logs for device failures (kept)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, prelude::*};

/// Target of operational alerts, routed to their own file
pub const ALERT_TARGET: &str = "alert";

const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
///
/// ```ignore
/// // Development (console only)
/// init_logger_with_file("debug", false, None)?;
///
/// // Production (JSON console + files)
/// init_logger_with_file("info", true, Some(Path::new("/var/log/print-server")))?;
/// ```
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if json_format {
        layers.push(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
        );
    }

    if let Some(dir) = log_dir {
        let app_log_dir = dir.join("app");
        let alert_log_dir = dir.join("alert");
        fs::create_dir_all(&app_log_dir)?;
        fs::create_dir_all(&alert_log_dir)?;

        let app_log = RollingFileAppender::new(Rotation::DAILY, app_log_dir, "app");
        let alert_log = RollingFileAppender::new(Rotation::DAILY, alert_log_dir, "alert");

        // Alerts also land in the app log so it stays complete
        layers.push(file_layer(json_format, std::sync::Mutex::new(app_log)));
        layers.push(
            file_layer(json_format, std::sync::Mutex::new(alert_log))
                .with_filter(filter_fn(|meta| meta.target() == ALERT_TARGET))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

fn file_layer<W>(json_format: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(writer);
    if json_format {
        layer.json().with_current_span(true).boxed()
    } else {
        layer.boxed()
    }
}

/// Delete `app.YYYY-MM-DD` files older than the retention window
///
/// Alert logs are never deleted.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<usize> {
    let app_log_dir = log_dir.join("app");
    if !app_log_dir.exists() {
        return Ok(0);
    }

    let cutoff = chrono::Utc::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);
    let mut removed = 0;

    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // RollingFileAppender names files `app.YYYY-MM-DD`
        let Some(date_part) = name.strip_prefix("app.") else {
            continue;
        };
        if let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            && date < cutoff
        {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
            removed += 1;
        }
    }

    Ok(removed)
}

/// Run [`cleanup_old_logs`] every hour until shutdown
pub async fn periodic_cleanup(log_dir: PathBuf, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = cleanup_old_logs(&log_dir) {
                    tracing::warn!(error = %e, "Log cleanup failed");
                }
            }
        }
    }
}
