//! Receipt printing for the worker side

pub mod device;
pub mod renderer;
pub mod types;

pub use device::{EscPosDevice, ReceiptDevice, build_printer};
pub use renderer::ReceiptRenderer;
pub use types::PrinterJob;
