//! Error taxonomy for one export request.
//!
//! Every failure inside the pipeline is terminal for the request. Errors carry
//! the object key and the 1-based line number so a failing request can be
//! traced back to the exact capture line.
use std::io;
use thiserror::Error;

/// A capture line that cannot be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported line type: {0}")]
    UnknownLineType(String),
    #[error("malformed field '{field}': {reason}")]
    MalformedField { field: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn missing(field: &'static str) -> Self {
        DecodeError::MalformedField { field, reason: "missing".into() }
    }
}

/// Raised by a formatter for a payload it claims to support but cannot read.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FormatError {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FormatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), source: None }
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(e: serde_json::Error) -> Self {
        Self { message: format!("json: {e}"), source: Some(Box::new(e)) }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before any object is touched.
    #[error("parameter: {0}")]
    Parameter(String),

    #[error("{key}:{line}: {source}")]
    Decode { key: String, line: u64, #[source] source: DecodeError },

    /// Open, decompress or read failure on a backing object.
    #[error("{key}: {source}")]
    Resource { key: String, #[source] source: io::Error },

    #[error("{key}:{line}: formatting channel '{channel}': {source}")]
    Format { key: String, line: u64, channel: String, #[source] source: FormatError },

    /// Accounted bytes disagree with the response length. Always a defect.
    #[error("usage accounting mismatch: accounted {accounted} bytes, wrote {written}")]
    Consistency { accounted: u64, written: u64 },

    #[error("{key}: close: {source}{}", .original.as_ref().map(|e| format!(", originally: {e}")).unwrap_or_default())]
    Close { key: String, #[source] source: io::Error, original: Option<Box<Error>> },
}

pub type Result<T> = std::result::Result<T, Error>;
