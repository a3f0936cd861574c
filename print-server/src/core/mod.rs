//! Core server infrastructure
//!
//! - [`config`] - environment configuration
//! - [`error`] - startup errors
//! - [`state`] - shared handles injected into handlers
//! - [`server`] - process lifecycle per run mode
//! - [`tasks`] - background task management

pub mod config;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{
    BrokerConfig, BrokerKind, Config, LimitsConfig, LogConfig, PrinterConfig, PrinterTransport,
    RunMode,
};
pub use error::{Result, ServerError};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
