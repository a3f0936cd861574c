//! Submission validation
//!
//! Every field is checked and all problems are reported together, so a
//! client can fix a form in one round trip.

use std::fmt;
use std::io::Cursor;

use image::{ImageFormat, ImageReader};
use shared::error::{AppError, ErrorCode};

use crate::core::LimitsConfig;

/// Formats accepted for the optional picture
const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Raw submission as received over HTTP
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub title: Option<String>,
    pub text: String,
    pub image: Option<Vec<u8>>,
}

/// Submission that passed every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub title: Option<String>,
    pub text: String,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub code: ErrorCode,
    pub message: String,
}

/// All field errors of a rejected submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn has(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<ValidationErrors> for AppError {
    fn from(errs: ValidationErrors) -> Self {
        errs.errors.into_iter().fold(
            AppError::validation("Submission rejected"),
            |err, field| err.with_detail(field.field, field.message),
        )
    }
}

/// Anything the printer could read as a command byte. Line breaks and tabs
/// are ordinary text; browsers submit textareas with `\r\n`.
fn has_control_chars(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
}

#[derive(Debug, Clone)]
pub struct SubmissionValidator {
    limits: LimitsConfig,
}

impl SubmissionValidator {
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    pub fn validate(&self, request: SubmissionRequest) -> Result<ValidSubmission, ValidationErrors> {
        let mut errors = Vec::new();

        let text = request.text.trim();
        if has_control_chars(text) {
            errors.push(FieldError {
                field: "text",
                code: ErrorCode::InvalidCharacters,
                message: "must not contain control characters".into(),
            });
        } else if text.is_empty() {
            errors.push(FieldError {
                field: "text",
                code: ErrorCode::TextEmpty,
                message: "must not be empty".into(),
            });
        } else if text.chars().count() > self.limits.max_text_chars {
            errors.push(FieldError {
                field: "text",
                code: ErrorCode::TextTooLong,
                message: format!("must be at most {} characters", self.limits.max_text_chars),
            });
        }

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if let Some(title) = title {
            if has_control_chars(title) || title.contains(['\n', '\r']) {
                errors.push(FieldError {
                    field: "title",
                    code: ErrorCode::InvalidCharacters,
                    message: "must be a single line without control characters".into(),
                });
            } else if title.chars().count() > self.limits.max_title_chars {
                errors.push(FieldError {
                    field: "title",
                    code: ErrorCode::TitleTooLong,
                    message: format!("must be at most {} characters", self.limits.max_title_chars),
                });
            }
        }

        if let Some(image) = &request.image
            && let Err(e) = self.check_image(image)
        {
            errors.push(e);
        }

        if !errors.is_empty() {
            return Err(ValidationErrors { errors });
        }

        Ok(ValidSubmission {
            title: title.map(str::to_string),
            text: text.to_string(),
            image: request.image,
        })
    }

    fn check_image(&self, bytes: &[u8]) -> Result<(), FieldError> {
        let fail = |code: ErrorCode, message: String| FieldError {
            field: "image",
            code,
            message,
        };

        if bytes.is_empty() {
            return Err(fail(ErrorCode::ImageEmpty, "must not be empty".into()));
        }
        if bytes.len() > self.limits.max_image_bytes {
            return Err(fail(
                ErrorCode::ImageTooLarge,
                format!("must be at most {} bytes", self.limits.max_image_bytes),
            ));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| fail(ErrorCode::ImageInvalid, format!("unreadable: {e}")))?;

        match reader.format() {
            Some(format) if ACCEPTED_FORMATS.contains(&format) => {}
            _ => {
                return Err(fail(
                    ErrorCode::ImageUnsupportedFormat,
                    "must be PNG, JPEG, GIF, WebP or BMP".into(),
                ));
            }
        }

        // Header only; the worker decodes the pixels when it prints
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| fail(ErrorCode::ImageInvalid, format!("cannot be decoded: {e}")))?;

        if width == 0 || height == 0 {
            return Err(fail(ErrorCode::ImageInvalid, "has no pixels".into()));
        }
        if width > self.limits.max_image_width || height > self.limits.max_image_height {
            return Err(fail(
                ErrorCode::ImageDimensionsTooLarge,
                format!(
                    "{}x{} exceeds {}x{} pixels",
                    width, height, self.limits.max_image_width, self.limits.max_image_height
                ),
            ));
        }
        Ok(())
    }
}
