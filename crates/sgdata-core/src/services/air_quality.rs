use serde::Serialize;

use crate::dataset::DatasetId;
use crate::domain::{parse_region, GeoPoint, PsiStatus, RegionalAirQuality};
use crate::envelope::Envelope;
use crate::query::{mean, top_n, Order, Scored};
use crate::services::{query, Pipeline};
use crate::SourceError;

/// 24-hour PSI across regions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsiSummary {
    pub highest: Option<Scored<RegionalAirQuality>>,
    pub lowest: Option<Scored<RegionalAirQuality>>,
    pub average: Option<f64>,
    pub regions_reporting: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStatus {
    pub region: String,
    pub psi: Option<f64>,
    pub status: Option<PsiStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AirQualityStatus {
    /// Band of the worst region.
    pub overall: Option<PsiStatus>,
    pub max_psi: Option<f64>,
    pub regions: Vec<RegionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionLocation {
    pub region: String,
    pub location: Option<GeoPoint>,
}

/// Pollutant Standards Index queries over the latest reading.
#[derive(Debug, Clone, Copy)]
pub struct AirQualityService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> AirQualityService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn summary(&self) -> Result<Envelope<PsiSummary>, SourceError> {
        self.run(|records| {
            let ranked = top_n(records, "psi_24h", Order::Descending, records.len().max(1))?;
            Ok(PsiSummary {
                highest: ranked.first().map(|entry| entry.to_scored()),
                lowest: ranked.last().map(|entry| entry.to_scored()),
                average: mean(ranked.iter().map(|entry| Some(entry.value))),
                regions_reporting: ranked.len(),
            })
        })
        .await
    }

    /// Readings of one region, or of every region when `region` is `None`.
    pub async fn by_region(
        &self,
        region: Option<&str>,
    ) -> Result<Envelope<Vec<RegionalAirQuality>>, SourceError> {
        let region = region.map(parse_region).transpose()?;
        self.run(move |records| {
            Ok(records
                .iter()
                .filter(|record| region.map_or(true, |region| record.region.as_str() == region))
                .cloned()
                .collect())
        })
        .await
    }

    pub async fn status(&self) -> Result<Envelope<AirQualityStatus>, SourceError> {
        self.run(|records| {
            let max_psi = records
                .iter()
                .filter_map(|record| record.psi_24h)
                .max_by(f64::total_cmp);
            Ok(AirQualityStatus {
                overall: max_psi.map(PsiStatus::from_psi),
                max_psi,
                regions: records
                    .iter()
                    .map(|record| RegionStatus {
                        region: record.region.to_string(),
                        psi: record.psi_24h,
                        status: record.status(),
                    })
                    .collect(),
            })
        })
        .await
    }

    pub async fn region_metadata(&self) -> Result<Envelope<Vec<RegionLocation>>, SourceError> {
        self.run(|records| {
            Ok(records
                .iter()
                .map(|record| RegionLocation {
                    region: record.region.to_string(),
                    location: record.location,
                })
                .collect())
        })
        .await
    }

    async fn run<T>(
        &self,
        run: impl FnOnce(&[RegionalAirQuality]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        query(self.pipeline, DatasetId::Psi, run).await
    }
}
