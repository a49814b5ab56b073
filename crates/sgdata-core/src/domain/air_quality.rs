use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, GeoPoint, Record, RecordKey, UtcDateTime};
use crate::ValidationError;

/// Reporting regions accepted by region filters.
pub const PSI_REGIONS: [&str; 5] = ["west", "east", "central", "south", "north"];

/// Validates a caller-supplied region name (case-insensitive).
pub fn parse_region(value: &str) -> Result<&'static str, ValidationError> {
    let normalized = value.trim().to_ascii_lowercase();
    PSI_REGIONS
        .into_iter()
        .find(|region| *region == normalized)
        .ok_or_else(|| ValidationError::InvalidRegion {
            value: value.to_owned(),
        })
}

/// Latest pollutant readings for one reporting region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalAirQuality {
    pub region: RecordKey,
    pub location: Option<GeoPoint>,
    pub psi_24h: Option<f64>,
    pub pm25_24h: Option<f64>,
    pub pm10_24h: Option<f64>,
    pub o3_8h_max: Option<f64>,
    pub no2_1h_max: Option<f64>,
    pub so2_24h: Option<f64>,
    pub co_8h_max: Option<f64>,
    pub timestamp: Option<UtcDateTime>,
    pub updated_at: Option<UtcDateTime>,
}

impl RegionalAirQuality {
    pub fn status(&self) -> Option<PsiStatus> {
        self.psi_24h.map(PsiStatus::from_psi)
    }
}

impl Record for RegionalAirQuality {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("region"),
        FieldSpec::number("psi_24h"),
        FieldSpec::number("pm25_24h"),
        FieldSpec::number("pm10_24h"),
        FieldSpec::number("o3_8h_max"),
        FieldSpec::number("no2_1h_max"),
        FieldSpec::number("so2_24h"),
        FieldSpec::number("co_8h_max"),
    ];

    fn key(&self) -> &RecordKey {
        &self.region
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "region" => FieldValue::Text(self.region.as_str()),
            "psi_24h" => FieldValue::number(self.psi_24h),
            "pm25_24h" => FieldValue::number(self.pm25_24h),
            "pm10_24h" => FieldValue::number(self.pm10_24h),
            "o3_8h_max" => FieldValue::number(self.o3_8h_max),
            "no2_1h_max" => FieldValue::number(self.no2_1h_max),
            "so2_24h" => FieldValue::number(self.so2_24h),
            "co_8h_max" => FieldValue::number(self.co_8h_max),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(AirQuality);
}

/// PSI health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsiStatus {
    Good,
    Moderate,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl PsiStatus {
    pub fn from_psi(psi: f64) -> Self {
        match psi {
            p if p <= 50.0 => Self::Good,
            p if p <= 100.0 => Self::Moderate,
            p if p <= 200.0 => Self::Unhealthy,
            p if p <= 300.0 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }
}
