//! Unified error codes for the print pipeline
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Submission errors (text and image validation)
//! - 9xxx: System errors (store, broker, printer)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values so the web client can
/// switch on them without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Request body exceeds the configured cap
    PayloadTooLarge = 6,

    // ==================== 1xxx: Submission ====================
    /// Text is empty after trimming
    TextEmpty = 1001,
    /// Text exceeds the maximum length
    TextTooLong = 1002,
    /// Title exceeds the maximum length
    TitleTooLong = 1003,
    /// Text or title contains control characters
    InvalidCharacters = 1004,
    /// Image exceeds the maximum byte size
    ImageTooLarge = 1101,
    /// Image format is not one of the accepted formats
    ImageUnsupportedFormat = 1102,
    /// Image header could not be decoded
    ImageInvalid = 1103,
    /// Image pixel dimensions exceed the maximum
    ImageDimensionsTooLarge = 1104,
    /// Image payload is empty
    ImageEmpty = 1105,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Timeout error
    TimeoutError = 9004,
    /// Submission store is not available in this run mode
    StoreUnavailable = 9006,
    /// Broker is not connected
    BrokerNotConnected = 9101,
    /// Broker publish failed or timed out
    BrokerPublishFailed = 9102,
    /// Printer does not answer the health probe
    PrinterNotAvailable = 9201,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::PayloadTooLarge => "Request body is too large",

            // Submission
            ErrorCode::TextEmpty => "Text must not be empty",
            ErrorCode::TextTooLong => "Text is too long",
            ErrorCode::TitleTooLong => "Title is too long",
            ErrorCode::InvalidCharacters => "Control characters are not allowed",
            ErrorCode::ImageTooLarge => "Image exceeds maximum size",
            ErrorCode::ImageUnsupportedFormat => "Unsupported image format",
            ErrorCode::ImageInvalid => "Invalid image file",
            ErrorCode::ImageDimensionsTooLarge => "Image dimensions exceed maximum",
            ErrorCode::ImageEmpty => "Image is empty",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::StoreUnavailable => "Submission store is not available",
            ErrorCode::BrokerNotConnected => "Message broker is not connected",
            ErrorCode::BrokerPublishFailed => "Failed to publish submission",
            ErrorCode::PrinterNotAvailable => "Printer not available",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::PayloadTooLarge),

            // Submission
            1001 => Ok(ErrorCode::TextEmpty),
            1002 => Ok(ErrorCode::TextTooLong),
            1003 => Ok(ErrorCode::TitleTooLong),
            1004 => Ok(ErrorCode::InvalidCharacters),
            1101 => Ok(ErrorCode::ImageTooLarge),
            1102 => Ok(ErrorCode::ImageUnsupportedFormat),
            1103 => Ok(ErrorCode::ImageInvalid),
            1104 => Ok(ErrorCode::ImageDimensionsTooLarge),
            1105 => Ok(ErrorCode::ImageEmpty),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9006 => Ok(ErrorCode::StoreUnavailable),
            9101 => Ok(ErrorCode::BrokerNotConnected),
            9102 => Ok(ErrorCode::BrokerPublishFailed),
            9201 => Ok(ErrorCode::PrinterNotAvailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
