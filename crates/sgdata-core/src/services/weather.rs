use serde::Serialize;

use crate::cache::{CacheKey, CacheMode};
use crate::dataset::DatasetId;
use crate::domain::{ComfortLevel, GeoPoint, StationReading, UtcDateTime};
use crate::envelope::Envelope;
use crate::query::{extremum, Order, Scored, Summary};
use crate::services::{query, require_text, Pipeline, Provenance};
use crate::SourceError;

/// Relative humidity across the station network.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumiditySummary {
    pub stations: usize,
    /// Stations with a current reading.
    pub reporting: usize,
    pub summary: Option<Summary>,
    /// Comfort level of the network-wide mean.
    pub comfort: Option<ComfortLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationComfort {
    pub station_id: String,
    pub name: Option<String>,
    pub humidity: f64,
    pub comfort: ComfortLevel,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationLocation {
    pub station_id: String,
    pub name: Option<String>,
    pub device_id: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HumidityExtremes {
    pub lowest: Option<StationReading>,
    pub highest: Option<StationReading>,
    /// Reporting stations, least humid first.
    pub readings: Vec<StationReading>,
}

/// Air temperature and relative humidity station readings.
#[derive(Debug, Clone, Copy)]
pub struct WeatherService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> WeatherService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Latest temperature per station, optionally for a past `date`
    /// (`YYYY-MM-DD` or `YYYY-MM-DDTHH:mm:ss`).
    pub async fn air_temperatures(
        &self,
        date: Option<&str>,
    ) -> Result<Envelope<Vec<StationReading>>, SourceError> {
        let Some(date) = date else {
            return query(self.pipeline, DatasetId::AirTemperature, |records: &[StationReading]| {
                Ok(records.to_vec())
            })
            .await;
        };

        let date = require_date(date)?;
        let dataset = DatasetId::AirTemperature;
        let mut provenance = Provenance::start();
        let lookup = self
            .pipeline
            .load(
                CacheKey::shaped(dataset, format!("date={date}")),
                dataset.endpoint().with_param("date", date),
                CacheMode::Use,
            )
            .await?;
        provenance.record(&lookup);
        Ok(provenance.finish(lookup.snapshot.records::<StationReading>()?.to_vec()))
    }

    pub async fn highest_temperature(
        &self,
    ) -> Result<Envelope<Option<Scored<StationReading>>>, SourceError> {
        self.extreme(DatasetId::AirTemperature, Order::Descending).await
    }

    pub async fn lowest_temperature(
        &self,
    ) -> Result<Envelope<Option<Scored<StationReading>>>, SourceError> {
        self.extreme(DatasetId::AirTemperature, Order::Ascending).await
    }

    pub async fn humidity_summary(&self) -> Result<Envelope<HumiditySummary>, SourceError> {
        self.humidity(|records| {
            let summary = Summary::from_values(records.iter().filter_map(|record| record.value));
            Ok(HumiditySummary {
                stations: records.len(),
                reporting: summary.map_or(0, |summary| summary.count),
                comfort: summary.map(|summary| ComfortLevel::from_humidity(summary.mean)),
                summary,
            })
        })
        .await
    }

    /// Readings of one station (matched on its id, case-insensitively) or of
    /// every station when `station_id` is `None`.
    pub async fn humidity_by_station(
        &self,
        station_id: Option<&str>,
    ) -> Result<Envelope<Vec<StationReading>>, SourceError> {
        let station_id = station_id
            .map(|id| require_text("station id", id).map(str::to_ascii_uppercase))
            .transpose()?;
        self.humidity(move |records| {
            Ok(records
                .iter()
                .filter(|record| {
                    station_id
                        .as_deref()
                        .map_or(true, |id| record.station_id.as_str().eq_ignore_ascii_case(id))
                })
                .cloned()
                .collect())
        })
        .await
    }

    /// Comfort level of every reporting station.
    pub async fn humidity_comfort(&self) -> Result<Envelope<Vec<StationComfort>>, SourceError> {
        self.humidity(|records| {
            Ok(records
                .iter()
                .filter_map(|record| {
                    let humidity = record.value?;
                    Some(StationComfort {
                        station_id: record.station_id.to_string(),
                        name: record.name.clone(),
                        humidity,
                        comfort: ComfortLevel::from_humidity(humidity),
                        location: record.location,
                    })
                })
                .collect())
        })
        .await
    }

    pub async fn station_locations(&self) -> Result<Envelope<Vec<StationLocation>>, SourceError> {
        self.humidity(|records| {
            Ok(records
                .iter()
                .map(|record| StationLocation {
                    station_id: record.station_id.to_string(),
                    name: record.name.clone(),
                    device_id: record.device_id.clone(),
                    location: record.location,
                })
                .collect())
        })
        .await
    }

    pub async fn humidity_extremes(&self) -> Result<Envelope<HumidityExtremes>, SourceError> {
        self.humidity(|records| {
            let mut readings: Vec<StationReading> = records
                .iter()
                .filter(|record| record.value.is_some_and(f64::is_finite))
                .cloned()
                .collect();
            readings.sort_by(|left, right| {
                let left_value = left.value.unwrap_or_default();
                let right_value = right.value.unwrap_or_default();
                left_value
                    .total_cmp(&right_value)
                    .then_with(|| left.station_id.cmp(&right.station_id))
            });
            Ok(HumidityExtremes {
                lowest: readings.first().cloned(),
                highest: readings.last().cloned(),
                readings,
            })
        })
        .await
    }

    async fn extreme(
        &self,
        dataset: DatasetId,
        order: Order,
    ) -> Result<Envelope<Option<Scored<StationReading>>>, SourceError> {
        query(self.pipeline, dataset, |records: &[StationReading]| {
            Ok(extremum(records, "value", order)?.map(|entry| entry.to_scored()))
        })
        .await
    }

    async fn humidity<T>(
        &self,
        run: impl FnOnce(&[StationReading]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        query(self.pipeline, DatasetId::RelativeHumidity, run).await
    }
}

fn require_date(raw: &str) -> Result<&str, SourceError> {
    let date = require_text("date", raw)?;
    let parsed = if date.len() == 10 {
        UtcDateTime::parse_local(&format!("{date}T00:00:00"))
    } else {
        UtcDateTime::parse_local(date)
    };
    parsed?;
    Ok(date)
}
