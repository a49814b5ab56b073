//! # sgdata Core
//!
//! Fetch, cache, normalize and query pipeline over Singapore open-government
//! datasets.
//!
//! ## Overview
//!
//! - **Fetcher** retrieving CKAN datastore, real-time and poll-download
//!   endpoints with pagination, timeouts and retries
//! - **TTL cache** serving snapshots with single-flight refresh and a
//!   stale-on-error fallback
//! - **Normalizer** mapping raw payloads onto canonical, keyed records
//! - **Merger** joining reference data with live data
//! - **Query engine** for search, ranking, grouping, scoring and buckets
//! - **Response envelope** recording provenance and freshness
//!
//! ## Datasets
//!
//! | Dataset | Class | Service |
//! |---------|-------|---------|
//! | `carpark_info` | reference | [`CarparkService`] |
//! | `carpark_availability` | real-time | [`CarparkService`] |
//! | `graduate_employment` | reference | [`GraduateService`] |
//! | `hdb_resale` | reference | [`ResaleService`] |
//! | `air_temperature` | real-time | [`WeatherService`] |
//! | `relative_humidity` | real-time | [`WeatherService`] |
//! | `psi` | real-time | [`AirQualityService`] |
//! | `uv_index` | real-time | [`UvService`] |
//! | `dengue_clusters` | real-time | [`DengueService`] |
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Process-wide TTL snapshot store |
//! | [`config`] | Pipeline configuration and `SGDATA_*` overrides |
//! | [`dataset`] | Dataset identifiers and upstream endpoints |
//! | [`domain`] | Canonical record types |
//! | [`envelope`] | Response envelope with provenance metadata |
//! | [`error`] | Error types |
//! | [`fetcher`] | Paginated, retrying upstream fetches |
//! | [`http_client`] | HTTP client abstraction |
//! | [`merge`] | Reference/live left join |
//! | [`normalize`] | Raw payload to record conversion |
//! | [`query`] | Synchronous query operations |
//! | [`retry`] | Backoff policy |
//! | [`services`] | Pipeline and per-dataset services |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sgdata_core::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::from_env()?;
//!
//!     let status = pipeline.carparks().complete_info("ACB").await?;
//!     if let Some(carpark) = &status.data {
//!         println!("{} degraded={}", carpark.key, status.meta.degraded);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Service query   │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Cache Store     │────▶│ Fetcher          │
//! │ (TTL, 1 flight) │     │ (pages, retries) │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          │                       ▼
//!          │              ┌──────────────────┐
//!          │              │ Normalizer       │
//!          │              └────────┬─────────┘
//!          ▼                       │
//! ┌─────────────────┐              │
//! │ Snapshot        │◀─────────────┘
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Query Engine    │────▶│ Envelope         │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns `Result<Envelope<T>, SourceError>`:
//!
//! ```rust
//! use sgdata_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::Timeout | SourceErrorKind::Unavailable => {
//!             // Retry later
//!         }
//!         SourceErrorKind::InvalidArgument => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Secondary data that fails to load does not fail the operation; the
//! envelope is flagged `degraded` and carries the error instead.
//!
//! ## Security
//!
//! - The API key is read from `SGDATA_API_KEY` and never logged
//! - All HTTP requests use TLS via rustls

pub mod cache;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod merge;
pub mod normalize;
pub mod query;
pub mod retry;
pub mod services;

// Caching
pub use cache::{CacheKey, CacheLookup, CacheMode, CacheStore, TtlPolicy};

// Configuration
pub use config::PipelineConfig;

// Datasets
pub use dataset::{DatasetClass, DatasetId, Endpoint, PageStop};

// Domain models
pub use domain::{
    CarparkAvailability, CarparkInfo, ComfortLevel, DengueCluster, GeoPoint, Geometry,
    GraduateOutcome, PsiStatus, Record, RecordKey, RegionalAirQuality, ResaleTransaction, Snapshot,
    StationReading, UtcDateTime, UvReading, UvRisk,
};

// Envelope types
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};

// Error types
pub use error::{SourceError, SourceErrorKind, ValidationError};

// Fetching
pub use fetcher::{FetchConfig, Fetcher, RawPayload};

// HTTP client types
pub use http_client::{
    FixtureHttpClient, HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse,
    ReqwestHttpClient,
};

// Merging
pub use merge::{Merged, MergedRecord};

// Query engine
pub use query::{Boundaries, DistributionWeights, Order, Scored, Summary};

// Retry logic
pub use retry::{Backoff, RetryConfig};

// Services
pub use services::{
    AirQualityService, CarparkService, DengueService, GraduateService, Pipeline, PipelineBuilder,
    ResaleFilter, ResaleService, UvService, WeatherService,
};
