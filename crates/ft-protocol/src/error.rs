//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding protocol messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload is not a `key value` line set at all
    #[error("Malformed payload: no newline or no space")]
    Malformed,

    /// A required field is absent from the decoded payload
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A field was present but could not be parsed
    #[error("Invalid value for field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// Payload exceeds the single-read frame limit
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload is not valid UTF-8
    #[error("Payload is not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
}
