//! Error types shared by every pipeline stage.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::DatasetId;

/// Validation errors raised while building domain values or configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record key cannot be empty")]
    EmptyKey,

    #[error("unknown dataset '{value}'")]
    UnknownDataset { value: String },

    #[error("timestamp must be RFC3339: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("year must be four digits (YYYY): '{value}'")]
    InvalidYear { value: String },

    #[error("invalid region '{value}', expected one of west, east, central, south, north")]
    InvalidRegion { value: String },

    #[error("invalid flat type '{value}', expected one of 2 ROOM, 3 ROOM, 4 ROOM, 5 ROOM, EXECUTIVE")]
    InvalidFlatType { value: String },

    #[error("invalid search field '{value}', expected one of degree, university, school")]
    InvalidSearchField { value: String },

    #[error("environment variable {name} must be a non-negative integer: '{value}'")]
    InvalidEnvNumber { name: &'static str, value: String },

    #[error("field '{field}' must be finite and non-negative")]
    InvalidWeight { field: &'static str },

    #[error("distribution weights must not all be zero")]
    ZeroWeights,

    #[error("request id must be at least 8 characters")]
    InvalidRequestId,

    #[error("schema version must look like vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },

    #[error("error code cannot be empty")]
    EmptyErrorCode,

    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Machine-distinguishable failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Upstream did not answer within the configured timeout.
    Timeout,
    /// Upstream rejected the request (4xx or an API-level error code).
    Request,
    /// Transient failures persisted after every retry.
    Unavailable,
    /// Payload (or a record) is missing its identifying key or expected shape.
    Schema,
    /// Response body could not be decoded as JSON.
    Decode,
    /// Caller supplied a malformed query parameter.
    InvalidArgument,
}

impl SourceErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Request => "request",
            Self::Unavailable => "unavailable",
            Self::Schema => "schema",
            Self::Decode => "decode",
            Self::InvalidArgument => "invalid_argument",
        }
    }
}

impl Display for SourceErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured pipeline error carrying enough context to render a precise message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
    dataset: Option<DatasetId>,
    key: Option<String>,
    status: Option<u16>,
}

impl SourceError {
    fn new(kind: SourceErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
            dataset: None,
            key: None,
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Timeout, message, true)
    }

    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Request, message, false).with_status(status)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Unavailable, message, true)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Schema, message, false)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::Decode, message, false)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(SourceErrorKind::InvalidArgument, message, false)
    }

    pub fn with_dataset(mut self, dataset: DatasetId) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn dataset(&self) -> Option<DatasetId> {
        self.dataset
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::Request => "source.request",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Schema => "source.schema",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::InvalidArgument => "source.invalid_argument",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(dataset) = self.dataset {
            write!(f, "[{dataset}] ")?;
        }
        f.write_str(&self.message)?;
        if let Some(key) = &self.key {
            write!(f, " (key '{key}')")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status {status})")?;
        }
        write!(f, " ({})", self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_argument(error.to_string())
    }
}
