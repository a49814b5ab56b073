//! Bounded-timeout, retrying, paginating upstream fetcher.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dataset::{DatasetId, Endpoint, Pagination, ResponseEnvelope, Retrieval};
use crate::http_client::{HttpAuth, HttpClient, HttpErrorKind, HttpRequest, ReqwestHttpClient};
use crate::retry::RetryConfig;
use crate::{SourceError, SourceErrorKind, UtcDateTime};

/// Transport limits applied to every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt deadline covering connect, headers and body.
    pub timeout_ms: u64,
    /// Safety cutoff for paginated sources.
    pub max_pages: u32,
    /// Overrides the per-dataset page size of offset-paginated sources.
    pub page_size: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_pages: 200,
            page_size: None,
        }
    }
}

/// Decoded payload pages with the envelope already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub pages: Vec<Value>,
    /// False when pagination stopped at the cutoff or failed part-way.
    pub complete: bool,
    pub reported_total: Option<u64>,
    pub fetched_at: UtcDateTime,
}

/// Issues upstream requests for a dataset endpoint.
#[derive(Clone)]
pub struct Fetcher {
    client: Arc<dyn HttpClient>,
    config: FetchConfig,
    retry: RetryConfig,
    auth: HttpAuth,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(
            Arc::new(ReqwestHttpClient::new()),
            FetchConfig::default(),
            RetryConfig::default(),
        )
    }
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpClient>, config: FetchConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            config,
            retry,
            auth: HttpAuth::None,
        }
    }

    /// Attaches `x-api-key` to every request; `None` leaves requests anonymous.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.auth = match api_key {
            Some(key) if !key.trim().is_empty() => HttpAuth::api_key(key.trim()),
            _ => HttpAuth::None,
        };
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub async fn fetch(&self, dataset: DatasetId, endpoint: &Endpoint) -> Result<RawPayload, SourceError> {
        let result = match (endpoint.retrieval, endpoint.pagination) {
            (Retrieval::PollDownload, _) => self.fetch_poll_download(dataset, endpoint).await,
            (Retrieval::Direct, Pagination::Single) => {
                let page = self.fetch_page(dataset, endpoint, &[]).await?;
                Ok(single_page(page))
            }
            (Retrieval::Direct, Pagination::Offset { page_size }) => {
                let page_size = self.config.page_size.unwrap_or(page_size).max(1);
                self.fetch_offset_pages(dataset, endpoint, page_size).await
            }
            (Retrieval::Direct, Pagination::Cursor) => self.fetch_cursor_pages(dataset, endpoint).await,
        };

        match &result {
            Ok(payload) => log::info!(
                "fetched {dataset}: {} page(s), complete={}",
                payload.pages.len(),
                payload.complete
            ),
            Err(error) => log::debug!("fetch of {dataset} failed: {error}"),
        }
        result
    }

    async fn fetch_offset_pages(
        &self,
        dataset: DatasetId,
        endpoint: &Endpoint,
        page_size: u32,
    ) -> Result<RawPayload, SourceError> {
        let mut pages = Vec::new();
        let mut reported_total = None;
        let mut offset: u64 = 0;

        loop {
            if pages.len() >= self.max_pages() {
                log::warn!(
                    "{dataset}: stopped after {} page(s) at offset {offset} of {reported_total:?}",
                    pages.len()
                );
                return Ok(partial(pages, reported_total));
            }

            let query = [
                (String::from("offset"), offset.to_string()),
                (String::from("limit"), page_size.to_string()),
            ];
            let page = match self.fetch_page(dataset, endpoint, &query).await {
                Ok(page) => page,
                Err(error) if !pages.is_empty() => {
                    log::warn!("{dataset}: page at offset {offset} failed, keeping partial result: {error}");
                    return Ok(partial(pages, reported_total));
                }
                Err(error) => return Err(error),
            };

            let records = page.get("records").and_then(Value::as_array);
            let received = records.map_or(0, Vec::len) as u64;
            let past_bound = endpoint
                .stop
                .as_ref()
                .zip(records.and_then(|records| records.last()))
                .is_some_and(|(stop, last)| stop.is_past(last));
            reported_total = page.get("total").and_then(Value::as_u64).or(reported_total);
            pages.push(page);
            offset += received;
            log::debug!("{dataset}: {offset} record(s) received of {reported_total:?}");

            if past_bound {
                log::debug!("{dataset}: page at offset {offset} sorts past the stop bound");
                return Ok(complete(pages, reported_total));
            }
            match reported_total {
                Some(total) if offset >= total => return Ok(complete(pages, reported_total)),
                // Upstream claims more rows than it will serve.
                Some(total) if received == 0 => {
                    log::warn!("{dataset}: empty page at offset {offset} of {total}, keeping partial result");
                    return Ok(partial(pages, reported_total));
                }
                Some(_) => {}
                None if received < u64::from(page_size) => return Ok(complete(pages, None)),
                None => {}
            }
        }
    }

    async fn fetch_cursor_pages(
        &self,
        dataset: DatasetId,
        endpoint: &Endpoint,
    ) -> Result<RawPayload, SourceError> {
        let mut pages: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            if pages.len() >= self.max_pages() {
                log::warn!("{dataset}: stopped following pagination tokens after {} page(s)", pages.len());
                return Ok(partial(pages, None));
            }

            let query = cursor
                .take()
                .map(|token| vec![(String::from("paginationToken"), token)])
                .unwrap_or_default();
            let page = match self.fetch_page(dataset, endpoint, &query).await {
                Ok(page) => page,
                Err(error) if !pages.is_empty() => {
                    log::warn!("{dataset}: continuation page failed, keeping partial result: {error}");
                    return Ok(partial(pages, None));
                }
                Err(error) => return Err(error),
            };

            cursor = page
                .get("paginationToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_owned);
            pages.push(page);

            if cursor.is_none() {
                return Ok(complete(pages, None));
            }
            log::debug!("{dataset}: following pagination token after page {}", pages.len());
        }
    }

    async fn fetch_poll_download(
        &self,
        dataset: DatasetId,
        endpoint: &Endpoint,
    ) -> Result<RawPayload, SourceError> {
        let descriptor = self.fetch_page(dataset, endpoint, &[]).await?;
        let url = descriptor
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                SourceError::schema("poll-download response has no download url")
                    .with_dataset(dataset)
                    .with_key("url")
            })?;

        let download = Endpoint {
            url: url.to_owned(),
            params: Vec::new(),
            envelope: ResponseEnvelope::Plain,
            pagination: Pagination::Single,
            retrieval: Retrieval::Direct,
            stop: None,
        };
        let page = self.fetch_page(dataset, &download, &[]).await?;
        Ok(single_page(page))
    }

    /// One logical page: retried request, decoded body, envelope stripped.
    async fn fetch_page(
        &self,
        dataset: DatasetId,
        endpoint: &Endpoint,
        extra_query: &[(String, String)],
    ) -> Result<Value, SourceError> {
        let mut request = HttpRequest::get(endpoint.url.as_str())
            .with_timeout_ms(self.config.timeout_ms)
            .with_auth(&self.auth);
        for (name, value) in endpoint.params.iter().chain(extra_query) {
            request = request.with_query(name.as_str(), value.as_str());
        }

        let (status, body) = self.execute_with_retry(dataset, request).await?;
        let decoded: Value = serde_json::from_str(&body).map_err(|e| {
            SourceError::decode(format!("response body is not valid JSON: {e}")).with_dataset(dataset)
        })?;
        unwrap_envelope(dataset, endpoint.envelope, status, decoded)
    }

    async fn execute_with_retry(
        &self,
        dataset: DatasetId,
        request: HttpRequest,
    ) -> Result<(u16, String), SourceError> {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::time::timeout(deadline, self.client.execute(request.clone())).await;
            let (error, retryable) = match outcome {
                Err(_) => (
                    SourceError::timeout(format!(
                        "no response within {} ms",
                        self.config.timeout_ms
                    )),
                    self.retry.retry_on_timeout,
                ),
                Ok(Err(http_error)) => {
                    let retryable = self.retry.should_retry_error(&http_error);
                    let error = match http_error.kind() {
                        HttpErrorKind::Timeout => SourceError::timeout(http_error.message()),
                        HttpErrorKind::Connect | HttpErrorKind::Other => {
                            SourceError::unavailable(http_error.message())
                        }
                    };
                    (error, retryable)
                }
                Ok(Ok(response)) if response.is_success() => {
                    return Ok((response.status, response.body));
                }
                Ok(Ok(response)) if self.retry.should_retry_status(response.status) => (
                    SourceError::unavailable(format!(
                        "upstream answered {}: {}",
                        response.status,
                        excerpt(&response.body)
                    ))
                    .with_status(response.status),
                    true,
                ),
                Ok(Ok(response)) => {
                    return Err(SourceError::request(
                        response.status,
                        format!("upstream rejected the request: {}", excerpt(&response.body)),
                    )
                    .with_dataset(dataset));
                }
            };

            if !retryable || !self.retry.allows_retry(attempt) {
                let error = if attempt > 0 && error.kind() != SourceErrorKind::Timeout {
                    exhausted(error, attempt + 1)
                } else {
                    error
                };
                return Err(error.with_dataset(dataset));
            }

            let delay = self.retry.delay_for_attempt(attempt);
            log::warn!(
                "{dataset}: attempt {} failed ({}), retrying in {} ms",
                attempt + 1,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn max_pages(&self) -> usize {
        usize::try_from(self.config.max_pages.max(1)).unwrap_or(usize::MAX)
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("authenticated", &(self.auth != HttpAuth::None))
            .finish()
    }
}

fn exhausted(error: SourceError, attempts: u32) -> SourceError {
    let status = error.status();
    let error = SourceError::unavailable(format!("{} (after {attempts} attempts)", error.message()));
    match status {
        Some(status) => error.with_status(status),
        None => error,
    }
}

fn single_page(page: Value) -> RawPayload {
    complete(vec![page], None)
}

fn complete(pages: Vec<Value>, reported_total: Option<u64>) -> RawPayload {
    RawPayload {
        pages,
        complete: true,
        reported_total,
        fetched_at: UtcDateTime::now(),
    }
}

fn partial(pages: Vec<Value>, reported_total: Option<u64>) -> RawPayload {
    RawPayload {
        pages,
        complete: false,
        reported_total,
        fetched_at: UtcDateTime::now(),
    }
}

fn unwrap_envelope(
    dataset: DatasetId,
    envelope: ResponseEnvelope,
    status: u16,
    mut decoded: Value,
) -> Result<Value, SourceError> {
    match envelope {
        ResponseEnvelope::Plain => Ok(decoded),
        ResponseEnvelope::Ckan => {
            if decoded.get("success").and_then(Value::as_bool) == Some(false) {
                let message = decoded
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("datastore reported failure");
                return Err(SourceError::request(status, message.to_owned()).with_dataset(dataset));
            }
            take_field(dataset, &mut decoded, "result")
        }
        ResponseEnvelope::OpenApi => {
            let code = decoded.get("code").and_then(Value::as_i64);
            if code.is_some_and(|code| code != 0) {
                let message = ["errorMsg", "errMsg", "message"]
                    .into_iter()
                    .find_map(|field| decoded.get(field).and_then(Value::as_str))
                    .unwrap_or("api reported a non-zero code");
                return Err(SourceError::request(status, message.to_owned()).with_dataset(dataset));
            }
            take_field(dataset, &mut decoded, "data")
        }
    }
}

fn take_field(dataset: DatasetId, decoded: &mut Value, field: &str) -> Result<Value, SourceError> {
    match decoded.get_mut(field).map(Value::take) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(SourceError::schema(format!("response envelope has no '{field}'"))
            .with_dataset(dataset)
            .with_key(field)),
    }
}

fn excerpt(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{FixtureHttpClient, HttpError, HttpResponse};
    use serde_json::json;

    fn fetcher(client: &FixtureHttpClient, config: FetchConfig) -> Fetcher {
        Fetcher::new(
            Arc::new(client.clone()),
            config,
            RetryConfig::fixed(Duration::from_millis(1), 2),
        )
    }

    fn ckan_page(records: Vec<Value>, total: u64) -> Value {
        json!({"success": true, "result": {"records": records, "total": total}})
    }

    #[tokio::test]
    async fn offset_pagination_runs_until_total_is_reached() {
        let client = FixtureHttpClient::new()
            .respond_json("datastore_search", &ckan_page(vec![json!({"_id": 1}), json!({"_id": 2})], 3))
            .respond_json("datastore_search", &ckan_page(vec![json!({"_id": 3})], 3));
        let endpoint = DatasetId::HdbResale.endpoint().with_page_size(2);

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::HdbResale, &endpoint)
            .await
            .expect("fetch should succeed");

        assert!(payload.complete);
        assert_eq!(payload.pages.len(), 2);
        assert_eq!(payload.reported_total, Some(3));
        let requests = client.requests();
        assert_eq!(requests[1].query_value("offset"), Some("2"));
        assert_eq!(requests[1].query_value("sort"), Some("month desc"));
    }

    #[tokio::test]
    async fn short_page_below_reported_total_keeps_paging() {
        let client = FixtureHttpClient::new()
            .respond_json("datastore_search", &ckan_page(vec![json!({"_id": 1}), json!({"_id": 2})], 5000))
            .respond_json("datastore_search", &ckan_page(vec![json!({"_id": 3})], 5000))
            .respond_json("datastore_search", &ckan_page(Vec::new(), 5000));
        let endpoint = DatasetId::HdbResale.endpoint().with_page_size(100);

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::HdbResale, &endpoint)
            .await
            .expect("partial result is still a result");

        assert!(!payload.complete);
        assert_eq!(payload.reported_total, Some(5000));
        assert_eq!(payload.pages.len(), 3);
        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].query_value("offset"), Some("2"));
        assert_eq!(requests[2].query_value("offset"), Some("3"));
    }

    #[tokio::test]
    async fn short_page_without_total_ends_the_dataset() {
        let client = FixtureHttpClient::new().respond_json(
            "datastore_search",
            &json!({"success": true, "result": {"records": [{"_id": 1}]}}),
        );
        let endpoint = DatasetId::HdbResale.endpoint().with_page_size(100);

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::HdbResale, &endpoint)
            .await
            .expect("fetch should succeed");

        assert!(payload.complete);
        assert_eq!(payload.reported_total, None);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn stop_bound_ends_sorted_pagination_early() {
        let month = |month: &str| json!({"month": month});
        let client = FixtureHttpClient::new()
            .respond_json("datastore_search", &ckan_page(vec![month("2024-06"), month("2024-01")], 9))
            .respond_json("datastore_search", &ckan_page(vec![month("2024-01"), month("2023-12")], 9))
            .respond_json("datastore_search", &ckan_page(vec![month("2023-11"), month("2023-10")], 9));
        let endpoint = DatasetId::HdbResale
            .endpoint()
            .with_page_size(2)
            .with_stop_below("month", "2024-01");

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::HdbResale, &endpoint)
            .await
            .expect("fetch should succeed");

        assert!(payload.complete);
        assert_eq!(payload.pages.len(), 2);
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn page_cutoff_returns_incomplete_payload() {
        let client = FixtureHttpClient::new()
            .respond_json("datastore_search", &ckan_page(vec![json!({"_id": 1})], 10));
        let config = FetchConfig {
            max_pages: 2,
            page_size: Some(1),
            ..FetchConfig::default()
        };

        let payload = fetcher(&client, config)
            .fetch(DatasetId::CarparkInfo, &DatasetId::CarparkInfo.endpoint())
            .await
            .expect("partial result is still a result");

        assert!(!payload.complete);
        assert_eq!(payload.pages.len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = FixtureHttpClient::new()
            .respond("datastore_search", HttpResponse::with_status(404, "{\"error\":\"nope\"}"));

        let error = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::GraduateEmployment, &DatasetId::GraduateEmployment.endpoint())
            .await
            .expect_err("404 must fail");

        assert_eq!(error.kind(), SourceErrorKind::Request);
        assert_eq!(error.status(), Some(404));
        assert_eq!(client.request_count("datastore_search"), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_then_succeed() {
        let client = FixtureHttpClient::new()
            .respond("psi", HttpResponse::with_status(503, "busy"))
            .fail("psi", HttpError::connect("connection reset"))
            .respond_json("psi", &json!({"code": 0, "data": {"items": []}}));

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::Psi, &DatasetId::Psi.endpoint())
            .await
            .expect("third attempt succeeds");

        assert_eq!(payload.pages, vec![json!({"items": []})]);
        assert_eq!(client.request_count("psi"), 3);
    }

    #[tokio::test]
    async fn persistent_rate_limiting_becomes_unavailable() {
        let client = FixtureHttpClient::new().respond("uv", HttpResponse::with_status(429, "slow down"));

        let error = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::UvIndex, &DatasetId::UvIndex.endpoint())
            .await
            .expect_err("429 persists");

        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert_eq!(error.status(), Some(429));
        assert!(error.retryable());
        assert_eq!(client.request_count("uv"), 3);
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let client = FixtureHttpClient::new().respond_after(
            "air-temperature",
            Duration::from_millis(500),
            HttpResponse::ok_json("{}"),
        );
        let config = FetchConfig {
            timeout_ms: 20,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(Arc::new(client), config, RetryConfig::no_retry());

        let error = fetcher
            .fetch(DatasetId::AirTemperature, &DatasetId::AirTemperature.endpoint())
            .await
            .expect_err("must time out");

        assert_eq!(error.kind(), SourceErrorKind::Timeout);
        assert_eq!(error.dataset(), Some(DatasetId::AirTemperature));
    }

    #[tokio::test]
    async fn cursor_pagination_follows_tokens() {
        let client = FixtureHttpClient::new()
            .respond_json("paginationToken=abc", &json!({"code": 0, "data": {"readings": [2]}}))
            .respond_json(
                "relative-humidity",
                &json!({"code": 0, "data": {"readings": [1], "paginationToken": "abc"}}),
            );

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::RelativeHumidity, &DatasetId::RelativeHumidity.endpoint())
            .await
            .expect("fetch should succeed");

        assert!(payload.complete);
        assert_eq!(payload.pages.len(), 2);
    }

    #[tokio::test]
    async fn api_level_error_codes_surface_as_request_errors() {
        let client = FixtureHttpClient::new()
            .respond_json("psi", &json!({"code": 4, "errorMsg": "Invalid date", "data": null}));

        let error = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::Psi, &DatasetId::Psi.endpoint())
            .await
            .expect_err("non-zero code");

        assert_eq!(error.kind(), SourceErrorKind::Request);
        assert!(error.message().contains("Invalid date"));
    }

    #[tokio::test]
    async fn poll_download_follows_the_signed_url() {
        let client = FixtureHttpClient::new()
            .respond_json(
                "poll-download",
                &json!({"code": 0, "data": {"url": "https://s3.test/dengue.geojson"}}),
            )
            .respond_json("dengue.geojson", &json!({"type": "FeatureCollection", "features": []}));

        let payload = fetcher(&client, FetchConfig::default())
            .fetch(DatasetId::DengueClusters, &DatasetId::DengueClusters.endpoint())
            .await
            .expect("fetch should succeed");

        assert_eq!(payload.pages[0]["type"], "FeatureCollection");
    }

    #[tokio::test]
    async fn api_key_is_attached_when_configured() {
        let client = FixtureHttpClient::new().respond_json("uv", &json!({"code": 0, "data": {}}));
        let fetcher = fetcher(&client, FetchConfig::default()).with_api_key(Some(String::from("k-1")));

        fetcher
            .fetch(DatasetId::UvIndex, &DatasetId::UvIndex.endpoint())
            .await
            .expect("fetch should succeed");

        assert_eq!(
            client.requests()[0].headers.get("x-api-key").map(String::as_str),
            Some("k-1")
        );
    }
}
