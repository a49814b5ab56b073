use crate::cache::{CacheKey, CacheLookup, CacheMode};
use crate::dataset::DatasetId;
use crate::domain::{CarparkAvailability, CarparkInfo, Record, UtcDateTime};
use crate::envelope::Envelope;
use crate::merge::{degradation, merge, MergedRecord};
use crate::query::{require_limit, search, top_n, Order, Scored};
use crate::services::{query, require_text, Pipeline, Provenance};
use crate::SourceError;

pub const DEFAULT_AVAILABILITY_RESULTS: usize = 50;

/// Reference details of a carpark joined with its live lot counts.
pub type CarparkStatus = MergedRecord<CarparkInfo, CarparkAvailability>;

/// HDB carpark details and live lot availability.
#[derive(Debug, Clone, Copy)]
pub struct CarparkService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> CarparkService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn info(&self, number: &str) -> Result<Envelope<Option<CarparkInfo>>, SourceError> {
        let number = carpark_number(number)?;
        query(self.pipeline, DatasetId::CarparkInfo, |records: &[CarparkInfo]| {
            Ok(find(records, &number).cloned())
        })
        .await
    }

    pub async fn availability(
        &self,
        number: &str,
    ) -> Result<Envelope<Option<CarparkAvailability>>, SourceError> {
        self.availability_at(number, None).await
    }

    /// Availability as of `date_time` (`YYYY-MM-DDTHH:mm:ss`, Singapore time).
    pub async fn availability_at(
        &self,
        number: &str,
        date_time: Option<&str>,
    ) -> Result<Envelope<Option<CarparkAvailability>>, SourceError> {
        let number = carpark_number(number)?;
        let mut provenance = Provenance::start();
        let lookup = self.live(date_time).await?;
        provenance.record(&lookup);
        let records = lookup.snapshot.records::<CarparkAvailability>()?;
        Ok(provenance.finish(find(records, &number).cloned()))
    }

    /// Reference details merged with live availability. A failed or empty
    /// live fetch still answers, flagged as degraded.
    pub async fn complete_info(&self, number: &str) -> Result<Envelope<Option<CarparkStatus>>, SourceError> {
        let number = carpark_number(number)?;
        let mut provenance = Provenance::start();
        let info = self.pipeline.snapshot(DatasetId::CarparkInfo).await?;
        provenance.record(&info);

        let Some(record) = find(info.snapshot.records::<CarparkInfo>()?, &number).cloned() else {
            return Ok(provenance.finish(None));
        };
        let merged = self.merge_live(&mut provenance, vec![record]).await;
        Ok(provenance.finish(merged.into_iter().next()))
    }

    /// Carparks whose address contains `keyword`.
    pub async fn search_by_area(
        &self,
        keyword: &str,
        include_availability: bool,
        max_results: usize,
    ) -> Result<Envelope<Vec<CarparkStatus>>, SourceError> {
        self.search_field("address", keyword, include_availability, max_results)
            .await
    }

    /// Carparks whose number contains `keyword`.
    pub async fn search_by_name(
        &self,
        keyword: &str,
        include_availability: bool,
        max_results: usize,
    ) -> Result<Envelope<Vec<CarparkStatus>>, SourceError> {
        self.search_field("car_park_no", keyword, include_availability, max_results)
            .await
    }

    pub async fn all_availability(
        &self,
        max_results: usize,
    ) -> Result<Envelope<Vec<CarparkAvailability>>, SourceError> {
        let max_results = require_limit("max_results", max_results)?;
        let mut provenance = Provenance::start();
        let lookup = self.live(None).await?;
        provenance.record(&lookup);
        let records = lookup.snapshot.records::<CarparkAvailability>()?;
        Ok(provenance.finish(records.iter().take(max_results).cloned().collect()))
    }

    /// Carparks with the most available lots across all lot types.
    pub async fn most_available(
        &self,
        limit: usize,
    ) -> Result<Envelope<Vec<Scored<CarparkAvailability>>>, SourceError> {
        let mut provenance = Provenance::start();
        let lookup = self.live(None).await?;
        provenance.record(&lookup);
        let records = lookup.snapshot.records::<CarparkAvailability>()?;
        let ranked = top_n(records, "lots_available", Order::Descending, limit)?;
        Ok(provenance.finish(ranked.iter().map(|entry| entry.to_scored()).collect()))
    }

    async fn search_field(
        &self,
        field: &str,
        keyword: &str,
        include_availability: bool,
        max_results: usize,
    ) -> Result<Envelope<Vec<CarparkStatus>>, SourceError> {
        let mut provenance = Provenance::start();
        let info = self.pipeline.snapshot(DatasetId::CarparkInfo).await?;
        provenance.record(&info);

        let found: Vec<CarparkInfo> = search(info.snapshot.records::<CarparkInfo>()?, &[field], keyword, max_results)?
            .into_iter()
            .cloned()
            .collect();

        let statuses = if include_availability && !found.is_empty() {
            self.merge_live(&mut provenance, found).await
        } else {
            merge::<CarparkInfo, CarparkAvailability>(&found, None, false).records
        };
        Ok(provenance.finish(statuses))
    }

    async fn merge_live(&self, provenance: &mut Provenance, records: Vec<CarparkInfo>) -> Vec<CarparkStatus> {
        match self.live(None).await {
            Ok(lookup) => {
                provenance.record(&lookup);
                if let Some(reason) = degradation(Some(&lookup.snapshot)) {
                    provenance.degraded(format!("{}: {reason}", DatasetId::CarparkAvailability));
                }
                let live = lookup.snapshot.records::<CarparkAvailability>().ok();
                merge(&records, live, live.is_none()).records
            }
            Err(error) => {
                log::warn!("carpark availability unavailable, answering without it: {error}");
                provenance.record_failure(DatasetId::CarparkAvailability, &error);
                provenance.degraded(format!("{}: live data unavailable", DatasetId::CarparkAvailability));
                merge::<CarparkInfo, CarparkAvailability>(&records, None, true).records
            }
        }
    }

    async fn live(&self, date_time: Option<&str>) -> Result<CacheLookup, SourceError> {
        let dataset = DatasetId::CarparkAvailability;
        match date_time {
            None => self.pipeline.snapshot(dataset).await,
            Some(raw) => {
                let raw = require_text("date_time", raw)?;
                UtcDateTime::parse_local(raw)?;
                self.pipeline
                    .load(
                        CacheKey::shaped(dataset, format!("date_time={raw}")),
                        dataset.endpoint().with_param("date_time", raw),
                        CacheMode::Use,
                    )
                    .await
            }
        }
    }
}

fn carpark_number(number: &str) -> Result<String, SourceError> {
    Ok(require_text("carpark number", number)?.to_ascii_uppercase())
}

fn find<'r, R: Record>(records: &'r [R], key: &str) -> Option<&'r R> {
    records.iter().find(|record| record.key().as_str() == key)
}
