use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetId;
use crate::domain::{
    CarparkAvailability, CarparkInfo, DengueCluster, GraduateOutcome, RegionalAirQuality,
    ResaleTransaction, StationReading, UtcDateTime, UvReading,
};
use crate::{SourceError, ValidationError};

/// Non-empty identifying key of a record, stable across fetches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RecordKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordKey> for String {
    fn from(value: RecordKey) -> Self {
        value.0
    }
}

/// Value of a named field as seen by the query engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Number(f64),
    Unavailable,
}

impl<'a> FieldValue<'a> {
    pub fn text(value: Option<&'a str>) -> Self {
        value.map_or(Self::Unavailable, Self::Text)
    }

    pub fn number(value: Option<f64>) -> Self {
        match value {
            Some(number) if number.is_finite() => Self::Number(number),
            _ => Self::Unavailable,
        }
    }

    pub fn as_number(self) -> Option<f64> {
        match self {
            Self::Number(number) => Some(number),
            Self::Text(_) | Self::Unavailable => None,
        }
    }

    pub fn as_text(self) -> Option<&'a str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) | Self::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
}

/// Declared queryable field of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
        }
    }

    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
        }
    }
}

/// Canonical per-dataset record.
pub trait Record: Clone + Send + Sync + 'static {
    const FIELDS: &'static [FieldSpec];

    fn key(&self) -> &RecordKey;

    /// Value of `name`; unknown names read as unavailable.
    fn field(&self, name: &str) -> FieldValue<'_>;

    fn from_set(set: &RecordSet) -> Option<&[Self]>;

    fn into_set(records: Vec<Self>) -> RecordSet;
}

/// Looks up `name` in `R::FIELDS` and checks it has the expected kind.
pub fn require_field<R: Record>(name: &str, kind: FieldKind) -> Result<FieldSpec, SourceError> {
    let spec = R::FIELDS
        .iter()
        .find(|spec| spec.name == name)
        .copied()
        .ok_or_else(|| {
            let known = R::FIELDS
                .iter()
                .map(|spec| spec.name)
                .collect::<Vec<_>>()
                .join(", ");
            SourceError::invalid_argument(format!("unknown field '{name}', expected one of {known}"))
        })?;

    if spec.kind != kind {
        return Err(SourceError::invalid_argument(format!(
            "field '{name}' is {:?}, expected {kind:?}",
            spec.kind
        )));
    }
    Ok(spec)
}

/// Closed set of normalized record collections, one variant per record type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum RecordSet {
    CarparkInfo(Vec<CarparkInfo>),
    CarparkAvailability(Vec<CarparkAvailability>),
    Graduates(Vec<GraduateOutcome>),
    Resale(Vec<ResaleTransaction>),
    Stations(Vec<StationReading>),
    AirQuality(Vec<RegionalAirQuality>),
    Uv(Vec<UvReading>),
    Dengue(Vec<DengueCluster>),
}

impl RecordSet {
    pub fn len(&self) -> usize {
        match self {
            Self::CarparkInfo(records) => records.len(),
            Self::CarparkAvailability(records) => records.len(),
            Self::Graduates(records) => records.len(),
            Self::Resale(records) => records.len(),
            Self::Stations(records) => records.len(),
            Self::AirQuality(records) => records.len(),
            Self::Uv(records) => records.len(),
            Self::Dengue(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Record that could not be normalized because its key was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Position of the raw record in the upstream payload.
    pub index: usize,
    pub key_field: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn missing_key(index: usize, key_field: impl Into<String>) -> Self {
        let key_field = key_field.into();
        Self {
            index,
            message: format!("record {index} is missing its identifying key '{key_field}'"),
            key_field,
        }
    }

    pub fn to_error(&self, dataset: DatasetId) -> SourceError {
        SourceError::schema(self.message.clone())
            .with_dataset(dataset)
            .with_key(self.key_field.clone())
    }
}

/// Immutable, timestamped set of normalized records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub dataset: DatasetId,
    pub records: RecordSet,
    pub fetched_at: UtcDateTime,
    /// Timestamp the source attached to the data, when it reports one.
    pub source_timestamp: Option<UtcDateTime>,
    pub reported_total: Option<u64>,
    /// True only if every expected page was retrieved.
    pub complete: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<SchemaIssue>,
}

impl Snapshot {
    pub fn records<R: Record>(&self) -> Result<&[R], SourceError> {
        R::from_set(&self.records).ok_or_else(|| {
            SourceError::schema("snapshot holds a different record type").with_dataset(self.dataset)
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

macro_rules! record_set_variant {
    ($variant:ident) => {
        fn from_set(set: &$crate::domain::RecordSet) -> Option<&[Self]> {
            match set {
                $crate::domain::RecordSet::$variant(records) => Some(records.as_slice()),
                _ => None,
            }
        }

        fn into_set(records: Vec<Self>) -> $crate::domain::RecordSet {
            $crate::domain::RecordSet::$variant(records)
        }
    };
}

pub(crate) use record_set_variant;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keys_are_trimmed_and_non_empty() {
        assert_eq!(RecordKey::new("  ACB ").map(|key| key.to_string()), Ok(String::from("ACB")));
        assert_eq!(RecordKey::new("   "), Err(ValidationError::EmptyKey));
    }

    #[test]
    fn non_finite_numbers_read_as_unavailable() {
        assert_eq!(FieldValue::number(Some(f64::NAN)), FieldValue::Unavailable);
        assert_eq!(FieldValue::number(Some(2.5)).as_number(), Some(2.5));
        assert_eq!(FieldValue::text(None), FieldValue::Unavailable);
    }

    #[test]
    fn schema_issue_names_key_field() {
        let issue = SchemaIssue::missing_key(3, "car_park_no");
        let error = issue.to_error(DatasetId::CarparkInfo);
        assert_eq!(error.key(), Some("car_park_no"));
        assert!(error.message().contains("record 3"));
    }
}
