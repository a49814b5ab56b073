//! Dataset identifiers and their upstream endpoint descriptions.
//!
//! | Dataset | Class | Upstream |
//! |---------|-------|----------|
//! | `carpark_info` | reference | CKAN datastore `d_23f946fa557947f93a8043bbef41dd09` |
//! | `carpark_availability` | real-time | `v1/transport/carpark-availability` |
//! | `graduate_employment` | reference | CKAN datastore `d_3c55210de27fcccda2ed0c63fdd2b352` |
//! | `hdb_resale` | reference | CKAN datastore `d_8b84c4ee58e3cfc0ece0d773c8ca6abc` |
//! | `air_temperature` | real-time | `v2/real-time/api/air-temperature` |
//! | `relative_humidity` | real-time | `v2/real-time/api/relative-humidity` |
//! | `psi` | real-time | `v2/real-time/api/psi` |
//! | `uv_index` | real-time | `v2/real-time/api/uv` |
//! | `dengue_clusters` | real-time | v1 public `poll-download` → GeoJSON |

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ValidationError;

const DATASTORE_SEARCH_URL: &str = "https://data.gov.sg/api/action/datastore_search";
const REALTIME_BASE_URL: &str = "https://api-open.data.gov.sg/v2/real-time/api";
const POLL_DOWNLOAD_BASE_URL: &str = "https://api-open.data.gov.sg/v1/public/api/datasets";
const CARPARK_AVAILABILITY_URL: &str = "https://api.data.gov.sg/v1/transport/carpark-availability";

/// Every dataset the pipeline knows how to fetch and normalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    CarparkInfo,
    CarparkAvailability,
    GraduateEmployment,
    HdbResale,
    AirTemperature,
    RelativeHumidity,
    Psi,
    UvIndex,
    DengueClusters,
}

impl DatasetId {
    pub const ALL: [Self; 9] = [
        Self::CarparkInfo,
        Self::CarparkAvailability,
        Self::GraduateEmployment,
        Self::HdbResale,
        Self::AirTemperature,
        Self::RelativeHumidity,
        Self::Psi,
        Self::UvIndex,
        Self::DengueClusters,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CarparkInfo => "carpark_info",
            Self::CarparkAvailability => "carpark_availability",
            Self::GraduateEmployment => "graduate_employment",
            Self::HdbResale => "hdb_resale",
            Self::AirTemperature => "air_temperature",
            Self::RelativeHumidity => "relative_humidity",
            Self::Psi => "psi",
            Self::UvIndex => "uv_index",
            Self::DengueClusters => "dengue_clusters",
        }
    }

    /// Staleness class deciding which TTL applies.
    pub const fn class(self) -> DatasetClass {
        match self {
            Self::CarparkInfo | Self::GraduateEmployment | Self::HdbResale => {
                DatasetClass::Reference
            }
            Self::CarparkAvailability
            | Self::AirTemperature
            | Self::RelativeHumidity
            | Self::Psi
            | Self::UvIndex
            | Self::DengueClusters => DatasetClass::RealTime,
        }
    }

    /// Upstream retrieval description for this dataset.
    pub fn endpoint(self) -> Endpoint {
        match self {
            Self::CarparkInfo => Endpoint::datastore("d_23f946fa557947f93a8043bbef41dd09", 100),
            Self::GraduateEmployment => {
                Endpoint::datastore("d_3c55210de27fcccda2ed0c63fdd2b352", 100)
            }
            Self::HdbResale => Endpoint::datastore("d_8b84c4ee58e3cfc0ece0d773c8ca6abc", 1_000)
                .with_param("sort", "month desc"),
            Self::CarparkAvailability => Endpoint {
                url: String::from(CARPARK_AVAILABILITY_URL),
                params: Vec::new(),
                envelope: ResponseEnvelope::Plain,
                pagination: Pagination::Single,
                retrieval: Retrieval::Direct,
                stop: None,
            },
            Self::AirTemperature => Endpoint::realtime("air-temperature"),
            Self::RelativeHumidity => Endpoint::realtime("relative-humidity"),
            Self::Psi => Endpoint::realtime("psi"),
            Self::UvIndex => Endpoint::realtime("uv"),
            Self::DengueClusters => Endpoint {
                url: format!("{POLL_DOWNLOAD_BASE_URL}/d_dbfabf16158d1b0e1c420627c0819168/poll-download"),
                params: Vec::new(),
                envelope: ResponseEnvelope::OpenApi,
                pagination: Pagination::Single,
                retrieval: Retrieval::PollDownload,
                stop: None,
            },
        }
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownDataset {
                value: value.to_owned(),
            })
    }
}

/// Real-time data changes by the minute; reference data changes rarely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetClass {
    RealTime,
    Reference,
}

/// Wrapper shape the upstream puts around the useful payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEnvelope {
    /// `{"success": bool, "result": {...}}` from the CKAN datastore API.
    Ckan,
    /// `{"code": 0, "errorMsg": ..., "data": {...}}` from the open-data v1/v2 APIs.
    OpenApi,
    /// Payload is returned as-is.
    Plain,
}

/// How additional pages are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    Single,
    /// CKAN `offset`/`limit` with `result.total`.
    Offset { page_size: u32 },
    /// v2 `paginationToken` continuation cursor inside `data`.
    Cursor,
}

/// Whether the payload is served directly or through a signed download link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    Direct,
    /// First response carries `data.url`; the payload lives behind it.
    PollDownload,
}

/// Early end of offset pagination over a source sorted descending on `field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStop {
    pub field: String,
    /// Text values strictly below this bound are past the wanted range.
    pub below: String,
}

impl PageStop {
    pub(crate) fn is_past(&self, record: &Value) -> bool {
        record
            .get(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|value| value < self.below.as_str())
    }
}

/// Fully described upstream location for one dataset fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub envelope: ResponseEnvelope,
    pub pagination: Pagination,
    pub retrieval: Retrieval,
    /// Only honoured by offset pagination.
    pub stop: Option<PageStop>,
}

impl Endpoint {
    fn datastore(resource_id: &str, page_size: u32) -> Self {
        Self {
            url: String::from(DATASTORE_SEARCH_URL),
            params: vec![(String::from("resource_id"), resource_id.to_owned())],
            envelope: ResponseEnvelope::Ckan,
            pagination: Pagination::Offset { page_size },
            retrieval: Retrieval::Direct,
            stop: None,
        }
    }

    fn realtime(path: &str) -> Self {
        Self {
            url: format!("{REALTIME_BASE_URL}/{path}"),
            params: Vec::new(),
            envelope: ResponseEnvelope::OpenApi,
            pagination: Pagination::Cursor,
            retrieval: Retrieval::Direct,
            stop: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Stops paging once a page ends on a record whose `field` sorts below `bound`.
    pub fn with_stop_below(mut self, field: impl Into<String>, bound: impl Into<String>) -> Self {
        self.stop = Some(PageStop {
            field: field.into(),
            below: bound.into(),
        });
        self
    }

    /// Overrides the page size of offset-paginated endpoints.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        if let Pagination::Offset { .. } = self.pagination {
            self.pagination = Pagination::Offset { page_size };
        }
        self
    }
}
