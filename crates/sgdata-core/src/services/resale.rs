use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, CacheLookup, CacheMode};
use crate::dataset::{DatasetId, Endpoint};
use crate::domain::{parse_flat_type, RecordSet, ResaleTransaction, Snapshot, UtcDateTime};
use crate::envelope::Envelope;
use crate::query::{
    bucket_stats, extremum, group_by, require_limit, top_n, Boundaries, BucketStats, Order, Scored,
    Summary,
};
use crate::services::{require_text, require_year, Pipeline, Provenance};
use crate::SourceError;

pub const DEFAULT_MIN_LEASE_YEARS: u32 = 90;
pub const DEFAULT_LEASE_RESULTS: usize = 50;
pub const MAX_LEASE_RESULTS: usize = 200;

/// Narrows resale transactions to one sale year, optionally one flat type
/// and one town. The year defaults to the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResaleFilter {
    pub year: Option<i32>,
    pub flat_type: Option<String>,
    pub town: Option<String>,
}

impl ResaleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_flat_type(mut self, flat_type: impl Into<String>) -> Self {
        self.flat_type = Some(flat_type.into());
        self
    }

    pub fn with_town(mut self, town: impl Into<String>) -> Self {
        self.town = Some(town.into());
        self
    }

    fn resolve(&self) -> Result<ResolvedFilter, SourceError> {
        let year = require_year(self.year.unwrap_or_else(|| UtcDateTime::now().year()))?;
        let flat_type = self.flat_type.as_deref().map(parse_flat_type).transpose()?;
        let town = self
            .town
            .as_deref()
            .map(|town| require_text("town", town).map(str::to_ascii_uppercase))
            .transpose()?;
        Ok(ResolvedFilter {
            year,
            flat_type,
            town,
        })
    }
}

struct ResolvedFilter {
    year: i32,
    flat_type: Option<&'static str>,
    town: Option<String>,
}

impl ResolvedFilter {
    /// Datastore `filters` object, keys sorted.
    fn api_filters(&self) -> Result<Option<String>, SourceError> {
        let mut filters: BTreeMap<&str, &str> = BTreeMap::new();
        if let Some(flat_type) = self.flat_type {
            filters.insert("flat_type", flat_type);
        }
        if let Some(town) = &self.town {
            filters.insert("town", town);
        }
        if filters.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(&filters)
            .map(Some)
            .map_err(|error| SourceError::invalid_argument(format!("unencodable resale filters: {error}")))
    }

    fn cache_key(&self, filters: Option<&str>) -> CacheKey {
        CacheKey::shaped(
            DatasetId::HdbResale,
            format!("year={};filters={}", self.year, filters.unwrap_or("{}")),
        )
    }

    fn endpoint(&self, filters: Option<&str>) -> Endpoint {
        let endpoint = DatasetId::HdbResale
            .endpoint()
            .with_stop_below("month", format!("{}-01", self.year));
        match filters {
            Some(filters) => endpoint.with_param("filters", filters),
            None => endpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaCount {
    pub town: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaPrice {
    pub town: String,
    pub average_price: f64,
    /// Transactions of the town that report a price.
    pub transactions: usize,
}

/// Remaining-lease distribution of the filtered transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaseStatistics {
    pub buckets: Vec<BucketStats>,
    pub overall: Option<Summary>,
}

/// HDB resale transaction queries.
#[derive(Debug, Clone, Copy)]
pub struct ResaleService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> ResaleService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Most expensive transaction matching `filter`; `None` when nothing matches.
    pub async fn highest_price(
        &self,
        filter: &ResaleFilter,
    ) -> Result<Envelope<Option<Scored<ResaleTransaction>>>, SourceError> {
        self.price_extreme(filter, Order::Descending).await
    }

    pub async fn lowest_price(
        &self,
        filter: &ResaleFilter,
    ) -> Result<Envelope<Option<Scored<ResaleTransaction>>>, SourceError> {
        self.price_extreme(filter, Order::Ascending).await
    }

    /// Towns ranked by number of transactions in `year`.
    pub async fn transaction_areas(
        &self,
        year: Option<i32>,
        order: Order,
        limit: usize,
    ) -> Result<Envelope<Vec<AreaCount>>, SourceError> {
        let limit = require_limit("limit", limit)?;
        let filter = ResaleFilter {
            year,
            ..ResaleFilter::default()
        };
        self.run(&filter, |records| {
            let mut areas: Vec<AreaCount> = group_by(records, "town", &[])?
                .into_iter()
                .map(|group| AreaCount {
                    town: group.key,
                    count: group.count,
                })
                .collect();
            areas.sort_by(|left, right| {
                let by_count = match order {
                    Order::Ascending => left.count.cmp(&right.count),
                    Order::Descending => right.count.cmp(&left.count),
                };
                by_count.then_with(|| left.town.cmp(&right.town))
            });
            areas.truncate(limit);
            Ok(areas)
        })
        .await
    }

    /// Towns ranked by mean resale price in `year`.
    pub async fn average_price_areas(
        &self,
        year: Option<i32>,
        order: Order,
        limit: usize,
        flat_type: Option<&str>,
    ) -> Result<Envelope<Vec<AreaPrice>>, SourceError> {
        let limit = require_limit("limit", limit)?;
        let filter = ResaleFilter {
            year,
            flat_type: flat_type.map(str::to_owned),
            town: None,
        };
        self.run(&filter, |records| {
            let mut areas: Vec<AreaPrice> = group_by(records, "town", &["resale_price"])?
                .into_iter()
                .filter_map(|group| {
                    let (average_price, transactions) =
                        group.stats("resale_price").map(|price| (price.mean, price.count))?;
                    Some(AreaPrice {
                        town: group.key,
                        average_price,
                        transactions,
                    })
                })
                .collect();
            areas.sort_by(|left, right| {
                let by_price = left.average_price.total_cmp(&right.average_price);
                let by_price = match order {
                    Order::Ascending => by_price,
                    Order::Descending => by_price.reverse(),
                };
                by_price.then_with(|| left.town.cmp(&right.town))
            });
            areas.truncate(limit);
            Ok(areas)
        })
        .await
    }

    /// Transactions with at least `min_years` of lease left, most remaining first.
    pub async fn flats_by_lease_remaining(
        &self,
        min_years: Option<u32>,
        filter: &ResaleFilter,
        limit: Option<usize>,
    ) -> Result<Envelope<Vec<ResaleTransaction>>, SourceError> {
        let min_years = min_years.unwrap_or(DEFAULT_MIN_LEASE_YEARS);
        if !(1..=99).contains(&min_years) {
            return Err(SourceError::invalid_argument(format!(
                "min_years must be between 1 and 99, got {min_years}"
            )));
        }
        let limit = require_limit("limit", limit.unwrap_or(DEFAULT_LEASE_RESULTS))?;
        if limit > MAX_LEASE_RESULTS {
            return Err(SourceError::invalid_argument(format!(
                "limit must not exceed {MAX_LEASE_RESULTS}, got {limit}"
            )));
        }

        self.run(filter, |records| {
            let qualifying: Vec<ResaleTransaction> = records
                .iter()
                .filter(|record| record.lease_remaining_years.is_some_and(|years| years >= min_years))
                .cloned()
                .collect();
            Ok(top_n(&qualifying, "lease_remaining_years", Order::Descending, limit)?
                .into_iter()
                .map(|entry| entry.record.clone())
                .collect())
        })
        .await
    }

    pub async fn lease_statistics(
        &self,
        filter: &ResaleFilter,
    ) -> Result<Envelope<LeaseStatistics>, SourceError> {
        self.run(filter, |records| {
            Ok(LeaseStatistics {
                buckets: bucket_stats(records, "lease_remaining_years", &Boundaries::default())?,
                overall: Summary::from_values(
                    records
                        .iter()
                        .filter_map(|record| record.lease_remaining_years.map(f64::from)),
                ),
            })
        })
        .await
    }

    async fn price_extreme(
        &self,
        filter: &ResaleFilter,
        order: Order,
    ) -> Result<Envelope<Option<Scored<ResaleTransaction>>>, SourceError> {
        self.run(filter, |records| {
            if records.is_empty() {
                return Ok(None);
            }
            Ok(extremum(records, "resale_price", order)?.map(|entry| entry.to_scored()))
        })
        .await
    }

    async fn run<T>(
        &self,
        filter: &ResaleFilter,
        run: impl FnOnce(&[ResaleTransaction]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        let mut provenance = Provenance::start();
        let lookup = self.load(filter).await?;
        provenance.record(&lookup);
        let data = run(lookup.snapshot.records::<ResaleTransaction>()?)?;
        Ok(provenance.finish(data))
    }

    async fn load(&self, filter: &ResaleFilter) -> Result<CacheLookup, SourceError> {
        let resolved = filter.resolve()?;
        let filters = resolved.api_filters()?;
        let year = resolved.year;
        self.pipeline
            .load_with(
                resolved.cache_key(filters.as_deref()),
                resolved.endpoint(filters.as_deref()),
                CacheMode::Use,
                move |snapshot| Ok(retain_year(snapshot, year)),
            )
            .await
    }
}

fn retain_year(mut snapshot: Snapshot, year: i32) -> Snapshot {
    if let RecordSet::Resale(records) = &mut snapshot.records {
        let before = records.len();
        records.retain(|record| record.sale_year == Some(year));
        log::debug!("kept {} of {before} resale transactions sold in {year}", records.len());
    }
    snapshot
}
