use serde::Serialize;

use crate::dataset::DatasetId;
use crate::domain::{UtcDateTime, UvReading, UvRisk};
use crate::envelope::Envelope;
use crate::query::Summary;
use crate::services::{query, Pipeline};
use crate::SourceError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvCurrent {
    pub reading: UvReading,
    pub risk: UvRisk,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvSummary {
    /// Most recent hourly index.
    pub current: f64,
    pub peak: f64,
    pub peak_hours: Vec<UtcDateTime>,
    pub peak_risk: UvRisk,
    pub min: f64,
    pub mean: f64,
    pub hours: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvPeak {
    pub reading: UvReading,
    pub band: UvRisk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtectionSlot {
    pub hour: UtcDateTime,
    pub value: Option<f64>,
    pub risk: Option<UvRisk>,
    pub protection: Option<&'static str>,
}

/// Hourly UV index of the current day.
#[derive(Debug, Clone, Copy)]
pub struct UvService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> UvService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Latest hour with a reported index.
    pub async fn current(&self) -> Result<Envelope<Option<UvCurrent>>, SourceError> {
        self.run(|records| {
            Ok(latest_reported(records).and_then(|reading| {
                let risk = reading.risk()?;
                Some(UvCurrent {
                    reading: reading.clone(),
                    risk,
                    recommendation: risk.recommendation(),
                })
            }))
        })
        .await
    }

    /// Every hour of the day so far, oldest first.
    pub async fn hourly(&self) -> Result<Envelope<Vec<UvReading>>, SourceError> {
        self.run(|records| Ok(records.to_vec())).await
    }

    pub async fn summary(&self) -> Result<Envelope<Option<UvSummary>>, SourceError> {
        self.run(|records| {
            let Some(stats) = Summary::from_values(records.iter().filter_map(|reading| reading.value)) else {
                return Ok(None);
            };
            let peak_hours = records
                .iter()
                .filter(|reading| reading.value == Some(stats.max))
                .map(|reading| reading.hour)
                .collect();
            Ok(Some(UvSummary {
                current: latest_reported(records).and_then(|reading| reading.value).unwrap_or(stats.max),
                peak: stats.max,
                peak_hours,
                peak_risk: UvRisk::from_index(stats.max),
                min: stats.min,
                mean: stats.mean,
                hours: stats.count,
            }))
        })
        .await
    }

    /// Hours at High (7) or above, each with its band.
    pub async fn peak_times(&self) -> Result<Envelope<Vec<UvPeak>>, SourceError> {
        self.run(|records| {
            Ok(records
                .iter()
                .filter_map(|reading| {
                    let band = UvRisk::peak_band(reading.value?)?;
                    Some(UvPeak {
                        reading: reading.clone(),
                        band,
                    })
                })
                .collect())
        })
        .await
    }

    pub async fn protection_schedule(&self) -> Result<Envelope<Vec<ProtectionSlot>>, SourceError> {
        self.run(|records| {
            Ok(records
                .iter()
                .map(|reading| {
                    let risk = reading.risk();
                    ProtectionSlot {
                        hour: reading.hour,
                        value: reading.value,
                        risk,
                        protection: risk.map(UvRisk::protection),
                    }
                })
                .collect())
        })
        .await
    }

    async fn run<T>(
        &self,
        run: impl FnOnce(&[UvReading]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        query(self.pipeline, DatasetId::UvIndex, run).await
    }
}

fn latest_reported(records: &[UvReading]) -> Option<&UvReading> {
    records.iter().rev().find(|reading| reading.value.is_some())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http_client::FixtureHttpClient;
    use crate::services::testing::{pipeline, realtime};

    fn client() -> FixtureHttpClient {
        let body = realtime(json!({
            "records": [{
                "date": "2024-07-01",
                "timestamp": "2024-07-01T13:00:00+08:00",
                "updatedTimestamp": "2024-07-01T13:05:00+08:00",
                "index": [
                    {"hour": "2024-07-01T13:00:00+08:00", "value": 9},
                    {"hour": "2024-07-01T12:00:00+08:00", "value": 11},
                    {"hour": "2024-07-01T11:00:00+08:00", "value": 11},
                    {"hour": "2024-07-01T10:00:00+08:00", "value": 6},
                    {"hour": "2024-07-01T09:00:00+08:00", "value": 1}
                ]
            }]
        }));
        FixtureHttpClient::new().respond_json("real-time/api/uv", &body)
    }

    #[tokio::test]
    async fn current_reading_is_the_latest_hour() {
        let client = client();
        let pipeline = pipeline(&client);

        let current = pipeline.uv().current().await.expect("query").data.expect("reported");
        assert_eq!(current.reading.value, Some(9.0));
        assert_eq!(current.risk, UvRisk::VeryHigh);

        let summary = pipeline.uv().summary().await.expect("query").data.expect("reported");
        assert_eq!(summary.peak, 11.0);
        assert_eq!(summary.peak_hours.len(), 2);
        assert_eq!(summary.peak_risk, UvRisk::Extreme);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.mean, 7.6);
        assert_eq!(client.request_count("real-time/api/uv"), 1);
    }

    #[tokio::test]
    async fn peaks_and_schedule_cover_the_day() {
        let client = client();
        let pipeline = pipeline(&client);

        let peaks = pipeline.uv().peak_times().await.expect("query").data;
        let bands: Vec<UvRisk> = peaks.iter().map(|peak| peak.band).collect();
        assert_eq!(bands, vec![UvRisk::Extreme, UvRisk::Extreme, UvRisk::VeryHigh]);

        let schedule = pipeline.uv().protection_schedule().await.expect("query").data;
        assert_eq!(schedule.len(), 5);
        assert_eq!(schedule[0].protection, Some("No protection needed"));
        assert!(schedule.windows(2).all(|pair| pair[0].hour < pair[1].hour));
    }
}
