use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::CacheLookup;
use crate::dataset::DatasetId;
use crate::{SourceError, UtcDateTime, ValidationError};

pub const SCHEMA_VERSION: &str = "v1.0.0";

/// Standard response envelope for every query operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub meta: EnvelopeMeta,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
}

impl<T> Envelope<T> {
    pub fn success(meta: EnvelopeMeta, data: T) -> Self {
        Self {
            meta,
            data,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(
        meta: EnvelopeMeta,
        data: T,
        errors: Vec<EnvelopeError>,
    ) -> Result<Self, ValidationError> {
        meta.validate_schema_compliance()?;
        for error in &errors {
            error.validate()?;
        }

        Ok(Self { meta, data, errors })
    }

    pub fn push_error(&mut self, error: EnvelopeError) -> Result<(), ValidationError> {
        error.validate()?;
        self.errors.push(error);
        Ok(())
    }

    /// Same provenance, different payload.
    pub fn map<U>(self, transform: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            meta: self.meta,
            data: transform(self.data),
            errors: self.errors,
        }
    }
}

/// Provenance attached to every envelope.
///
/// When a result draws on more than one snapshot the flags combine
/// pessimistically: `stale` if any input was stale, `complete` only if all
/// were, `fetched_at` the oldest fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub schema_version: String,
    pub generated_at: UtcDateTime,
    pub datasets: Vec<DatasetId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<UtcDateTime>,
    pub stale: bool,
    pub degraded: bool,
    pub complete: bool,
    pub cache_hit: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnvelopeMeta {
    pub fn new(request_id: impl Into<String>) -> Result<Self, ValidationError> {
        let meta = Self {
            request_id: request_id.into(),
            schema_version: String::from(SCHEMA_VERSION),
            generated_at: UtcDateTime::now(),
            datasets: Vec::new(),
            fetched_at: None,
            source_timestamp: None,
            stale: false,
            degraded: false,
            complete: true,
            cache_hit: true,
            latency_ms: 0,
            warnings: Vec::new(),
        };
        meta.validate_schema_compliance()?;
        Ok(meta)
    }

    /// Meta with a fresh v4 request id.
    pub fn generate() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            schema_version: String::from(SCHEMA_VERSION),
            generated_at: UtcDateTime::now(),
            datasets: Vec::new(),
            fetched_at: None,
            source_timestamp: None,
            stale: false,
            degraded: false,
            complete: true,
            cache_hit: true,
            latency_ms: 0,
            warnings: Vec::new(),
        }
    }

    /// Folds the provenance of one cache lookup into this meta.
    pub fn record_lookup(&mut self, dataset: DatasetId, lookup: &CacheLookup) {
        if !self.datasets.contains(&dataset) {
            self.datasets.push(dataset);
        }

        let snapshot = &lookup.snapshot;
        self.fetched_at = Some(match self.fetched_at {
            Some(existing) => existing.min(snapshot.fetched_at),
            None => snapshot.fetched_at,
        });
        self.source_timestamp = match (self.source_timestamp, snapshot.source_timestamp) {
            (Some(existing), Some(incoming)) => Some(existing.max(incoming)),
            (existing, incoming) => existing.or(incoming),
        };
        self.stale |= lookup.stale;
        self.complete &= snapshot.complete;
        self.cache_hit &= lookup.cache_hit;

        if !snapshot.complete {
            self.push_warning(format!(
                "{dataset}: only part of the source was retrieved ({} of {} records)",
                snapshot.len(),
                snapshot
                    .reported_total
                    .map_or_else(|| String::from("unknown"), |total| total.to_string())
            ));
        }
        if !snapshot.rejected.is_empty() {
            self.push_warning(format!(
                "{dataset}: {} record(s) skipped for a missing key",
                snapshot.rejected.len()
            ));
        }
        if let Some(error) = &lookup.refresh_error {
            self.push_warning(format!("{dataset}: serving stale data, refresh failed: {error}"));
        }
    }

    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        self.degraded = true;
        self.push_warning(reason);
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn finish(mut self, started: Instant) -> Self {
        self.latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn validate_schema_compliance(&self) -> Result<(), ValidationError> {
        if self.request_id.trim().len() < 8 {
            return Err(ValidationError::InvalidRequestId);
        }

        if !is_valid_schema_version(&self.schema_version) {
            return Err(ValidationError::InvalidSchemaVersion {
                value: self.schema_version.clone(),
            });
        }

        Ok(())
    }
}

/// Structured error entry for partial responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetId>,
}

impl EnvelopeError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let error = Self {
            code: code.into(),
            message: message.into(),
            retryable: None,
            dataset: None,
        };
        error.validate()?;
        Ok(error)
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetId) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.trim().is_empty() {
            return Err(ValidationError::EmptyErrorCode);
        }

        if self.message.trim().is_empty() {
            return Err(ValidationError::EmptyErrorMessage);
        }

        Ok(())
    }
}

impl From<&SourceError> for EnvelopeError {
    fn from(error: &SourceError) -> Self {
        Self {
            code: String::from(error.code()),
            message: error.to_string(),
            retryable: Some(error.retryable()),
            dataset: error.dataset(),
        }
    }
}

fn is_valid_schema_version(value: &str) -> bool {
    let Some(version) = value.strip_prefix('v') else {
        return false;
    };

    let mut parts = version.split('.');
    let segments = [parts.next(), parts.next(), parts.next()];
    if parts.next().is_some() {
        return false;
    }

    segments.iter().all(|part| {
        part.is_some_and(|segment| {
            !segment.is_empty() && segment.chars().all(|ch| ch.is_ascii_digit())
        })
    })
}
