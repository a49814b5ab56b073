use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// RFC3339 timestamp normalized to UTC.
///
/// Upstream timestamps arrive in Singapore local time (`+08:00`); they are
/// converted on parse so ordering and equality never depend on the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input.trim(), &Rfc3339)
            .map(Self::from_offset_datetime)
            .map_err(|_| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })
    }

    /// Like [`Self::parse`], but reads offset-less local timestamps
    /// (`2024-07-01T08:30:00`) as Singapore time.
    pub fn parse_local(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        Self::parse(trimmed).or_else(|_| {
            Self::parse(&format!("{trimmed}+08:00")).map_err(|_| ValidationError::InvalidTimestamp {
                value: input.to_owned(),
            })
        })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Self {
        Self(value.to_offset(UtcOffset::UTC))
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn format_rfc3339(self) -> String {
        // Only years outside 0..=9999 fail to format.
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn converts_singapore_offset_to_utc() {
        let parsed = UtcDateTime::parse("2024-07-01T08:30:00+08:00").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-07-01T00:30:00Z");
        assert_eq!(parsed.year(), 2024);
    }

    #[test]
    fn offsetless_local_timestamps_are_singapore_time() {
        let parsed = UtcDateTime::parse_local("2024-07-01T08:30:00").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-07-01T00:30:00Z");
    }

    #[test]
    fn rejects_non_rfc3339_input() {
        let err = UtcDateTime::parse("2024-07-01 08:30").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidTimestamp { .. }));
    }
}
