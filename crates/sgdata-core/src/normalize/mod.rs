//! Conversion of decoded upstream payloads into canonical records.
//!
//! Each dataset has one normalizer. Payloads whose overall shape is wrong
//! fail with `Schema`; individual records missing their identifying key are
//! skipped and reported in [`Normalized::rejected`] while the rest are kept.

mod datastore;
mod geojson;
mod realtime;
pub mod values;

use serde_json::Value;

use crate::dataset::DatasetId;
use crate::domain::{RecordSet, SchemaIssue, Snapshot};
use crate::fetcher::RawPayload;
use crate::{SourceError, UtcDateTime};

/// Output of one normalizer run.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub records: RecordSet,
    pub rejected: Vec<SchemaIssue>,
    pub source_timestamp: Option<UtcDateTime>,
}

/// Normalizes every page of a payload for `dataset`.
pub fn normalize(dataset: DatasetId, pages: &[Value]) -> Result<Normalized, SourceError> {
    let normalized = match dataset {
        DatasetId::CarparkInfo => datastore::carpark_info(pages),
        DatasetId::GraduateEmployment => datastore::graduates(pages),
        DatasetId::HdbResale => datastore::resale(pages),
        DatasetId::CarparkAvailability => realtime::carpark_availability(pages),
        DatasetId::AirTemperature | DatasetId::RelativeHumidity => realtime::stations(pages),
        DatasetId::Psi => realtime::air_quality(pages),
        DatasetId::UvIndex => realtime::uv(pages),
        DatasetId::DengueClusters => geojson::dengue(pages),
    };
    normalized.map_err(|error| error.with_dataset(dataset))
}

/// Normalizes a fetched payload into an immutable snapshot.
pub fn into_snapshot(dataset: DatasetId, payload: RawPayload) -> Result<Snapshot, SourceError> {
    let normalized = normalize(dataset, &payload.pages)?;
    for issue in &normalized.rejected {
        log::warn!("{dataset}: skipped record: {}", issue.message);
    }

    Ok(Snapshot {
        dataset,
        records: normalized.records,
        fetched_at: payload.fetched_at,
        source_timestamp: normalized.source_timestamp,
        reported_total: payload.reported_total,
        complete: payload.complete,
        rejected: normalized.rejected,
    })
}

/// Accepted records plus the issues of the rejected ones.
#[derive(Debug)]
struct Collector<R> {
    records: Vec<R>,
    rejected: Vec<SchemaIssue>,
    index: usize,
}

impl<R> Collector<R> {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
            index: 0,
        }
    }

    /// Records the outcome of the next raw record.
    fn push(&mut self, outcome: Result<R, &str>) {
        match outcome {
            Ok(record) => self.records.push(record),
            Err(key_field) => self.rejected.push(SchemaIssue::missing_key(self.index, key_field)),
        }
        self.index += 1;
    }
}

fn shape_error(message: impl Into<String>) -> SourceError {
    SourceError::schema(message)
}
