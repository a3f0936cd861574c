//! Shared types for the guestbook print pipeline
//!
//! Types used by both the intake side and the print worker: the wire
//! envelope that travels over the broker, the submission identifier and its
//! generator, and the unified error/response structures of the HTTP API.

pub mod error;
pub mod submission;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
pub use submission::{Envelope, IdGenerator, SubmissionId};
