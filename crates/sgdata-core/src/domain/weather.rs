use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, GeoPoint, Record, RecordKey, UtcDateTime};

/// Latest reading of one weather station (air temperature or relative humidity).
///
/// Stations listed by the source without a reading keep `value = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    pub station_id: RecordKey,
    pub device_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<GeoPoint>,
    pub value: Option<f64>,
    pub reading_type: Option<String>,
    pub unit: Option<String>,
    pub timestamp: Option<UtcDateTime>,
}

impl Record for StationReading {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("station_id"),
        FieldSpec::text("name"),
        FieldSpec::number("value"),
        FieldSpec::number("latitude"),
        FieldSpec::number("longitude"),
    ];

    fn key(&self) -> &RecordKey {
        &self.station_id
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "station_id" => FieldValue::Text(self.station_id.as_str()),
            "name" => FieldValue::text(self.name.as_deref()),
            "value" => FieldValue::number(self.value),
            "latitude" => FieldValue::number(self.location.map(|point| point.latitude)),
            "longitude" => FieldValue::number(self.location.map(|point| point.longitude)),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(Stations);
}

/// Relative humidity comfort band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComfortLevel {
    VeryDry,
    Dry,
    Comfortable,
    SlightlyHumid,
    Humid,
    VeryHumid,
}

impl ComfortLevel {
    pub fn from_humidity(percent: f64) -> Self {
        match percent {
            p if p < 30.0 => Self::VeryDry,
            p if p < 40.0 => Self::Dry,
            p if p < 60.0 => Self::Comfortable,
            p if p < 70.0 => Self::SlightlyHumid,
            p if p < 80.0 => Self::Humid,
            _ => Self::VeryHumid,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::VeryDry => "Very Dry",
            Self::Dry => "Dry",
            Self::Comfortable => "Comfortable",
            Self::SlightlyHumid => "Slightly Humid",
            Self::Humid => "Humid",
            Self::VeryHumid => "Very Humid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfort_bands_use_exclusive_upper_bounds() {
        assert_eq!(ComfortLevel::from_humidity(29.9), ComfortLevel::VeryDry);
        assert_eq!(ComfortLevel::from_humidity(40.0), ComfortLevel::Comfortable);
        assert_eq!(ComfortLevel::from_humidity(79.9), ComfortLevel::Humid);
        assert_eq!(ComfortLevel::from_humidity(80.0).label(), "Very Humid");
    }
}
