//! Submission intake
//!
//! HTTP-independent half of the intake: validation and publishing. The
//! axum handlers in [`crate::api::submissions`] only decode requests.

pub mod service;
pub mod validation;

pub use service::{IntakeError, IntakeService};
pub use validation::{
    FieldError, SubmissionRequest, SubmissionValidator, ValidSubmission, ValidationErrors,
};
