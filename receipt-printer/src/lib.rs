//! # receipt-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - GBK and Windows-1252 text conversion
//! - Printer profiles (paper width, code page, finishing)
//! - USB, device-file, network and dry-run transports
//! - Raster image processing
//!
//! What goes on a guestbook receipt is decided by the print server.
//!
//! ## Example
//!
//! ```ignore
//! use receipt_printer::{dialect_by_name, EscPosBuilder, NetworkPrinter, Printer};
//!
//! let dialect = dialect_by_name("TM-T88")?;
//! let mut builder = EscPosBuilder::new(dialect.columns());
//! builder.center().bold().line("Hello").bold_off();
//! dialect.finish(&mut builder);
//!
//! let printer = NetworkPrinter::from_addr("192.168.1.100:9100")?;
//! printer.print(&builder.build(dialect.encoding())).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod printer;
mod profile;
#[cfg(feature = "usb")]
mod usb;

// Re-exports
pub use encoding::{
    TextEncoding, convert_to_cp1252, convert_to_gbk, gbk_width, printable_text, wrap_text,
};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use printer::{AnyPrinter, DryRunPrinter, FilePrinter, NetworkPrinter, Printer};
pub use profile::{Dialect, Nt5890k, PROFILE_NAMES, Pos5890, TmT88, dialect_by_name};

#[cfg(feature = "image")]
pub use escpos::raster_image;

#[cfg(feature = "usb")]
pub use usb::{PaperStatus, UsbConfig, UsbPrinter, parse_paper_status};
