use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, Record, RecordKey, UtcDateTime};

/// UV index for one hour of the latest daily record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvReading {
    /// The hour formatted as RFC3339 UTC.
    pub key: RecordKey,
    pub hour: UtcDateTime,
    pub value: Option<f64>,
    pub date: Option<String>,
    pub updated_at: Option<UtcDateTime>,
}

impl UvReading {
    pub fn risk(&self) -> Option<UvRisk> {
        self.value.map(UvRisk::from_index)
    }
}

impl Record for UvReading {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::text("hour"), FieldSpec::number("value")];

    fn key(&self) -> &RecordKey {
        &self.key
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "hour" => FieldValue::Text(self.key.as_str()),
            "value" => FieldValue::number(self.value),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(Uv);
}

/// UV exposure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvRisk {
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl UvRisk {
    pub fn from_index(index: f64) -> Self {
        match index {
            i if i <= 2.0 => Self::Low,
            i if i <= 5.0 => Self::Moderate,
            i if i <= 7.0 => Self::High,
            i if i <= 10.0 => Self::VeryHigh,
            _ => Self::Extreme,
        }
    }

    /// Band used for peak-time reporting: High from 7, Very High from 8,
    /// Extreme from 11. Values below 7 are not peaks.
    pub fn peak_band(index: f64) -> Option<Self> {
        match index {
            i if i >= 11.0 => Some(Self::Extreme),
            i if i >= 8.0 => Some(Self::VeryHigh),
            i if i >= 7.0 => Some(Self::High),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Moderate => "Moderate",
            Self::High => "High",
            Self::VeryHigh => "Very High",
            Self::Extreme => "Extreme",
        }
    }

    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::Low => "No protection needed. You can safely enjoy being outside.",
            Self::Moderate => {
                "Some protection required. Seek shade during midday hours, wear sun protective \
                 clothing, a wide-brimmed hat and UV-blocking sunglasses."
            }
            Self::High => {
                "Protection required. Reduce time in the sun between 10am and 4pm. Wear sun \
                 protective clothing, a wide-brimmed hat, UV-blocking sunglasses and SPF30+ sunscreen."
            }
            Self::VeryHigh => {
                "Extra protection required. Avoid the sun between 10am and 4pm, seek shade and \
                 wear full protection with SPF30+ sunscreen."
            }
            Self::Extreme => {
                "Extreme protection required. Avoid the sun between 10am and 4pm and wear full \
                 body covering with SPF50+ sunscreen."
            }
        }
    }

    pub const fn protection(self) -> &'static str {
        match self {
            Self::Low => "No protection needed",
            Self::Moderate => "Basic protection (hat, sunglasses)",
            Self::High => "Standard protection (SPF30+, hat, sunglasses, shade)",
            Self::VeryHigh => "High protection (avoid sun 10am-4pm, SPF30+, full coverage)",
            Self::Extreme => "Maximum protection (avoid sun, SPF50+, full body coverage)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_bands_match_published_thresholds() {
        assert_eq!(UvRisk::from_index(2.0), UvRisk::Low);
        assert_eq!(UvRisk::from_index(6.0), UvRisk::High);
        assert_eq!(UvRisk::from_index(10.0), UvRisk::VeryHigh);
        assert_eq!(UvRisk::from_index(11.0), UvRisk::Extreme);
    }

    #[test]
    fn peak_bands_start_at_seven() {
        assert_eq!(UvRisk::peak_band(6.9), None);
        assert_eq!(UvRisk::peak_band(7.0), Some(UvRisk::High));
        assert_eq!(UvRisk::peak_band(8.0), Some(UvRisk::VeryHigh));
        assert_eq!(UvRisk::peak_band(12.0), Some(UvRisk::Extreme));
    }
}
