//! Utilities

pub mod logger;

pub use logger::{ALERT_TARGET, init_logger_with_file};
