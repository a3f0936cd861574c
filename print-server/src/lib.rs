//! Guestbook print server
//!
//! Accepts guestbook submissions over HTTP, queues them on an MQTT topic and
//! prints them on a thermal receipt printer.
//!
//! ```text
//! client ──► intake (validate, id) ──► broker topic ──► worker (store, render) ──► printer
//! ```
//!
//! # Modules
//!
//! ```text
//! print-server/src/
//! ├── core/       # config, state, server lifecycle, background tasks
//! ├── api/        # HTTP routes and handlers
//! ├── intake/     # validation and publishing
//! ├── broker/     # MQTT and in-memory adapters
//! ├── worker/     # delivery processing
//! ├── printing/   # receipt layout and device
//! ├── db/         # SQLite store
//! └── utils/      # logging
//! ```

pub mod api;
pub mod broker;
pub mod core;
pub mod db;
pub mod intake;
pub mod printing;
pub mod utils;
pub mod worker;

pub use core::{Config, RunMode, Server, ServerState};
pub use utils::logger::{cleanup_old_logs, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    ____       _       __
   / __ \_____(_)___  / /_
  / /_/ / ___/ / __ \/ __/
 / ____/ /  / / / / / /_
/_/   /_/  /_/_/ /_/\__/   guestbook print server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
