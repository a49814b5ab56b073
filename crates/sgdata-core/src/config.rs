//! Pipeline configuration.
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SGDATA_API_KEY` | `api_key` |
//! | `SGDATA_TIMEOUT_MS` | `fetch.timeout_ms` |
//! | `SGDATA_MAX_PAGES` | `fetch.max_pages` |
//! | `SGDATA_REALTIME_TTL_SECS` | `ttl.realtime_secs` |
//! | `SGDATA_REFERENCE_TTL_SECS` | `ttl.reference_secs` (`0` disables expiry) |

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlPolicy;
use crate::domain::GraduateEstimateTable;
use crate::fetcher::FetchConfig;
use crate::query::DistributionWeights;
use crate::retry::RetryConfig;
use crate::ValidationError;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sent as `x-api-key` on every upstream request when set.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub ttl: TtlPolicy,
    pub stale_grace_secs: u64,
    /// Upper bound on how long a query waits for a fetch; unset waits for the
    /// fetch's own timeout and retries.
    pub wait_limit_ms: Option<u64>,
    pub distribution_weights: DistributionWeights,
    pub graduate_estimate: GraduateEstimateTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            fetch: FetchConfig::default(),
            retry: RetryConfig::default(),
            ttl: TtlPolicy::default(),
            stale_grace_secs: 30,
            wait_limit_ms: None,
            distribution_weights: DistributionWeights::default(),
            graduate_estimate: GraduateEstimateTable::default(),
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("fetch", &self.fetch)
            .field("retry", &self.retry)
            .field("ttl", &self.ttl)
            .field("stale_grace_secs", &self.stale_grace_secs)
            .field("wait_limit_ms", &self.wait_limit_ms)
            .field("distribution_weights", &self.distribution_weights)
            .finish_non_exhaustive()
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `SGDATA_*` environment variables.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::default().overlay(|name| env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ValidationError> {
        if let Some(api_key) = lookup("SGDATA_API_KEY").filter(|key| !key.trim().is_empty()) {
            self.api_key = Some(api_key.trim().to_owned());
        }
        if let Some(timeout_ms) = env_number(&lookup, "SGDATA_TIMEOUT_MS")? {
            self.fetch.timeout_ms = timeout_ms;
        }
        if let Some(max_pages) = env_number(&lookup, "SGDATA_MAX_PAGES")? {
            self.fetch.max_pages = u32::try_from(max_pages).map_err(|_| ValidationError::InvalidEnvNumber {
                name: "SGDATA_MAX_PAGES",
                value: max_pages.to_string(),
            })?;
        }
        if let Some(realtime_secs) = env_number(&lookup, "SGDATA_REALTIME_TTL_SECS")? {
            self.ttl.realtime_secs = realtime_secs;
        }
        if let Some(reference_secs) = env_number(&lookup, "SGDATA_REFERENCE_TTL_SECS")? {
            self.ttl.reference_secs = (reference_secs > 0).then_some(reference_secs);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.distribution_weights.validate()
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    pub fn wait_limit(&self) -> Option<Duration> {
        self.wait_limit_ms.map(Duration::from_millis)
    }
}

fn env_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ValidationError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidEnvNumber { name, value: raw }),
    }
}
