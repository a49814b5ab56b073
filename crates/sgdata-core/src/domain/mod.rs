//! # Domain Models
//!
//! Canonical record types produced by the normalizer.
//!
//! Every record carries a non-empty [`RecordKey`] that stays stable across
//! fetches of the same entity. Values the source does not report are `None`;
//! they are never coerced to zero or an empty string.
//!
//! | Type | Dataset | Key |
//! |------|---------|-----|
//! | [`CarparkInfo`] | `carpark_info` | `car_park_no` |
//! | [`CarparkAvailability`] | `carpark_availability` | `carpark_number` |
//! | [`GraduateOutcome`] | `graduate_employment` | `year\|university\|school\|degree` |
//! | [`ResaleTransaction`] | `hdb_resale` | datastore `_id` |
//! | [`StationReading`] | `air_temperature`, `relative_humidity` | station id |
//! | [`RegionalAirQuality`] | `psi` | region |
//! | [`UvReading`] | `uv_index` | hour |
//! | [`DengueCluster`] | `dengue_clusters` | locality |
//!
//! Query operations reach fields by name through the [`Record`] trait; each
//! type declares its queryable fields in [`Record::FIELDS`] so unknown names
//! are rejected before any record is touched.

mod air_quality;
mod carpark;
mod dengue;
mod geo;
mod graduate;
pub(crate) mod record;
mod resale;
mod timestamp;
mod uv;
mod weather;

pub use air_quality::{parse_region, PsiStatus, RegionalAirQuality, PSI_REGIONS};
pub use carpark::{CarparkAvailability, CarparkInfo, LotAvailability};
pub use dengue::DengueCluster;
pub use geo::{GeoPoint, Geometry};
pub use graduate::{DegreeBase, GraduateEstimateTable, GraduateOutcome, UniversityMultiplier};
pub use record::{
    require_field, FieldKind, FieldSpec, FieldValue, Record, RecordKey, RecordSet, SchemaIssue,
    Snapshot,
};
pub use resale::{parse_flat_type, ResaleTransaction, FLAT_TYPES, HDB_LEASE_YEARS};
pub use timestamp::UtcDateTime;
pub use uv::{UvReading, UvRisk};
pub use weather::{ComfortLevel, StationReading};
