//! # Services
//!
//! [`Pipeline`] owns the fetcher, the cache and the configuration; each
//! dataset family is queried through a thin service borrowed from it.
//!
//! | Accessor | Service | Datasets |
//! |----------|---------|----------|
//! | [`Pipeline::carparks`] | [`CarparkService`] | `carpark_info`, `carpark_availability` |
//! | [`Pipeline::graduates`] | [`GraduateService`] | `graduate_employment` |
//! | [`Pipeline::resale`] | [`ResaleService`] | `hdb_resale` |
//! | [`Pipeline::weather`] | [`WeatherService`] | `air_temperature`, `relative_humidity` |
//! | [`Pipeline::air_quality`] | [`AirQualityService`] | `psi` |
//! | [`Pipeline::uv`] | [`UvService`] | `uv_index` |
//! | [`Pipeline::dengue`] | [`DengueService`] | `dengue_clusters` |
//!
//! Every operation returns an [`Envelope`] whose meta records where the data
//! came from and how fresh it is.

mod air_quality;
mod carparks;
mod dengue;
mod graduates;
mod resale;
mod uv;
mod weather;

pub use air_quality::{AirQualityService, AirQualityStatus, PsiSummary, RegionLocation, RegionStatus};
pub use carparks::{CarparkService, CarparkStatus, DEFAULT_AVAILABILITY_RESULTS};
pub use dengue::{ClusterCoordinates, DengueCount, DengueService};
pub use graduates::{
    DegreeTotal, DistributionEntry, GraduateEstimate, GraduateService, SearchField,
};
pub use resale::{
    AreaCount, AreaPrice, LeaseStatistics, ResaleFilter, ResaleService, DEFAULT_LEASE_RESULTS,
    DEFAULT_MIN_LEASE_YEARS, MAX_LEASE_RESULTS,
};
pub use uv::{ProtectionSlot, UvCurrent, UvPeak, UvService, UvSummary};
pub use weather::{HumidityExtremes, HumiditySummary, StationComfort, StationLocation, WeatherService};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{CacheKey, CacheLookup, CacheMode, CacheStore};
use crate::config::PipelineConfig;
use crate::dataset::{DatasetId, Endpoint};
use crate::domain::Snapshot;
use crate::envelope::{Envelope, EnvelopeError, EnvelopeMeta};
use crate::fetcher::Fetcher;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize::into_snapshot;
use crate::{SourceError, ValidationError};

struct PipelineInner {
    fetcher: Fetcher,
    cache: CacheStore,
    config: PipelineConfig,
}

/// Entry point: fetch, cache, normalize and query every dataset.
///
/// Cloning is cheap and clones share one cache.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("fetcher", &self.inner.fetcher)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Pipeline`].
///
/// ```rust,ignore
/// use sgdata_core::{Pipeline, PipelineConfig};
///
/// let pipeline = Pipeline::builder()
///     .with_config(PipelineConfig::from_env()?)
///     .build()?;
/// let status = pipeline.carparks().complete_info("ACB").await?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    client: Option<Arc<dyn HttpClient>>,
    cache: Option<CacheStore>,
}

impl PipelineBuilder {
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the reqwest transport, e.g. with a fixture client in tests.
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Shares an existing cache instead of creating one.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Pipeline, ValidationError> {
        self.config.validate()?;

        let client = self
            .client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let fetcher = Fetcher::new(client, self.config.fetch.clone(), self.config.retry.clone())
            .with_api_key(self.config.api_key.clone());
        let cache = self.cache.unwrap_or_else(|| {
            let cache = CacheStore::new(self.config.stale_grace());
            match self.config.wait_limit() {
                Some(limit) => cache.with_wait_limit(limit),
                None => cache,
            }
        });

        Ok(Pipeline {
            inner: Arc::new(PipelineInner {
                fetcher,
                cache,
                config: self.config,
            }),
        })
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn new(config: PipelineConfig) -> Result<Self, ValidationError> {
        Self::builder().with_config(config).build()
    }

    /// Pipeline configured from `SGDATA_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::new(PipelineConfig::from_env()?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn carparks(&self) -> CarparkService<'_> {
        CarparkService::new(self)
    }

    pub fn graduates(&self) -> GraduateService<'_> {
        GraduateService::new(self)
    }

    pub fn resale(&self) -> ResaleService<'_> {
        ResaleService::new(self)
    }

    pub fn weather(&self) -> WeatherService<'_> {
        WeatherService::new(self)
    }

    pub fn air_quality(&self) -> AirQualityService<'_> {
        AirQualityService::new(self)
    }

    pub fn uv(&self) -> UvService<'_> {
        UvService::new(self)
    }

    pub fn dengue(&self) -> DengueService<'_> {
        DengueService::new(self)
    }

    /// Cached snapshot of the dataset's "all entities" key.
    pub async fn snapshot(&self, dataset: DatasetId) -> Result<CacheLookup, SourceError> {
        self.load(CacheKey::all(dataset), dataset.endpoint(), CacheMode::Use)
            .await
    }

    /// Fetches `dataset` now, replacing the cached snapshot on success.
    pub async fn refresh(&self, dataset: DatasetId) -> Result<CacheLookup, SourceError> {
        self.load(CacheKey::all(dataset), dataset.endpoint(), CacheMode::Refresh)
            .await
    }

    pub(crate) async fn load(
        &self,
        key: CacheKey,
        endpoint: Endpoint,
        mode: CacheMode,
    ) -> Result<CacheLookup, SourceError> {
        self.load_with(key, endpoint, mode, Ok::<Snapshot, SourceError>).await
    }

    /// Like [`Self::load`], with `refine` applied to the fresh snapshot
    /// before it is cached.
    pub(crate) async fn load_with<F>(
        &self,
        key: CacheKey,
        endpoint: Endpoint,
        mode: CacheMode,
        refine: F,
    ) -> Result<CacheLookup, SourceError>
    where
        F: FnOnce(Snapshot) -> Result<Snapshot, SourceError> + Send + 'static,
    {
        let dataset = key.dataset;
        let ttl = self.inner.config.ttl.ttl_for(dataset.class());
        let fetcher = self.inner.fetcher.clone();
        self.inner
            .cache
            .get_or_fetch(key, ttl, mode, move || fetch_snapshot(fetcher, dataset, endpoint, refine))
            .await
    }
}

fn fetch_snapshot<F>(
    fetcher: Fetcher,
    dataset: DatasetId,
    endpoint: Endpoint,
    refine: F,
) -> impl Future<Output = Result<Snapshot, SourceError>> + Send + 'static
where
    F: FnOnce(Snapshot) -> Result<Snapshot, SourceError> + Send + 'static,
{
    async move {
        let payload = fetcher.fetch(dataset, &endpoint).await?;
        refine(into_snapshot(dataset, payload)?)
    }
}

/// Collects provenance while an operation loads its snapshots.
pub(crate) struct Provenance {
    started: Instant,
    meta: EnvelopeMeta,
    errors: Vec<EnvelopeError>,
}

impl Provenance {
    pub(crate) fn start() -> Self {
        Self {
            started: Instant::now(),
            meta: EnvelopeMeta::generate(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, lookup: &CacheLookup) {
        self.meta.record_lookup(lookup.snapshot.dataset, lookup);
        if let Some(error) = &lookup.refresh_error {
            self.errors.push(EnvelopeError::from(error));
        }
    }

    /// Records a secondary dataset that could not be loaded at all.
    pub(crate) fn record_failure(&mut self, dataset: DatasetId, error: &SourceError) {
        if !self.meta.datasets.contains(&dataset) {
            self.meta.datasets.push(dataset);
        }
        self.meta.complete = false;
        self.errors.push(EnvelopeError::from(error).with_dataset(dataset));
    }

    pub(crate) fn degraded(&mut self, reason: impl Into<String>) {
        self.meta.mark_degraded(reason);
    }

    pub(crate) fn finish<T>(self, data: T) -> Envelope<T> {
        Envelope {
            meta: self.meta.finish(self.started),
            data,
            errors: self.errors,
        }
    }
}

/// Loads one dataset and runs a synchronous query over its records.
pub(crate) async fn query<R, T>(
    pipeline: &Pipeline,
    dataset: DatasetId,
    run: impl FnOnce(&[R]) -> Result<T, SourceError>,
) -> Result<Envelope<T>, SourceError>
where
    R: crate::domain::Record,
{
    let mut provenance = Provenance::start();
    let lookup = pipeline.snapshot(dataset).await?;
    provenance.record(&lookup);
    let data = run(lookup.snapshot.records::<R>()?)?;
    Ok(provenance.finish(data))
}

/// Trimmed, non-empty caller text.
pub(crate) fn require_text<'a>(name: &str, value: &'a str) -> Result<&'a str, SourceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SourceError::invalid_argument(format!("{name} cannot be empty")));
    }
    Ok(trimmed)
}

/// Four-digit calendar year.
pub(crate) fn require_year(year: i32) -> Result<i32, SourceError> {
    if !(1000..=9999).contains(&year) {
        return Err(ValidationError::InvalidYear {
            value: year.to_string(),
        }
        .into());
    }
    Ok(year)
}
