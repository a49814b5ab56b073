//! Behavior-driven tests for error handling and input validation
//!
//! These tests verify HOW failures surface to callers: upstream timeouts and
//! rejections, malformed payloads, records missing their key, invalid query
//! arguments, and the handling of the API key.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sgdata_core::{
    services::SearchField, DatasetId, FetchConfig, FixtureHttpClient, HttpError, HttpResponse,
    Order, Pipeline, PipelineConfig, ResaleFilter, RetryConfig, SourceErrorKind,
    ValidationError,
};

const CARPARK_INFO: &str = "d_23f946fa557947f93a8043bbef41dd09";

fn config() -> PipelineConfig {
    PipelineConfig {
        retry: RetryConfig::fixed(Duration::from_millis(1), 2),
        ..PipelineConfig::default()
    }
}

fn pipeline_with(client: &FixtureHttpClient, config: PipelineConfig) -> Pipeline {
    Pipeline::builder()
        .with_config(config)
        .with_http_client(Arc::new(client.clone()))
        .build()
        .expect("config should be valid")
}

// =============================================================================
// Error Handling: Upstream Failures
// =============================================================================

#[tokio::test]
async fn when_upstream_is_too_slow_the_query_times_out() {
    // Given: A UV endpoint slower than the fetch timeout, without retries
    let client = FixtureHttpClient::new().respond_after(
        "real-time/api/uv",
        Duration::from_millis(500),
        HttpResponse::ok_json("{}"),
    );
    let pipeline = pipeline_with(
        &client,
        PipelineConfig {
            fetch: FetchConfig {
                timeout_ms: 20,
                ..FetchConfig::default()
            },
            retry: RetryConfig::no_retry(),
            ..PipelineConfig::default()
        },
    );

    // When: The current UV index is requested
    let error = pipeline.uv().current().await.expect_err("must time out");

    // Then: A timeout error names the dataset and is retryable
    assert_eq!(error.kind(), SourceErrorKind::Timeout);
    assert_eq!(error.dataset(), Some(DatasetId::UvIndex));
    assert!(error.retryable());
}

#[tokio::test]
async fn when_upstream_rejects_the_request_it_is_not_retried() {
    // Given: The carpark datastore answers 400
    let client = FixtureHttpClient::new().respond(
        CARPARK_INFO,
        HttpResponse::with_status(400, "{\"success\":false}"),
    );
    let pipeline = pipeline_with(&client, config());

    // When: A carpark is looked up
    let error = pipeline.carparks().info("ACB").await.expect_err("rejected");

    // Then: The rejection surfaces after a single attempt
    assert_eq!(error.kind(), SourceErrorKind::Request);
    assert_eq!(error.status(), Some(400));
    assert!(!error.retryable());
    assert_eq!(client.request_count(CARPARK_INFO), 1);
}

#[tokio::test]
async fn when_connection_fails_transiently_the_fetch_is_retried() {
    // Given: One connection failure followed by a good response
    let client = FixtureHttpClient::new()
        .fail("real-time/api/psi", HttpError::connect("connection reset"))
        .respond_json(
            "real-time/api/psi",
            &json!({"code": 0, "data": {"items": [{
                "timestamp": "2024-07-01T08:00:00+08:00",
                "readings": {"psi_twenty_four_hourly": {"east": 42}}
            }]}}),
        );
    let pipeline = pipeline_with(&client, config());

    // When: PSI status is requested
    let status = pipeline.air_quality().status().await.expect("retry succeeds");

    // Then: The second attempt answered
    assert_eq!(status.data.max_psi, Some(42.0));
    assert_eq!(client.request_count("real-time/api/psi"), 2);
}

#[tokio::test]
async fn when_the_api_reports_a_nonzero_code_it_is_a_request_error() {
    // Given: A real-time endpoint that answers 200 with an error code
    let client = FixtureHttpClient::new().respond_json(
        "real-time/api/uv",
        &json!({"code": 4, "errorMsg": "Invalid date format"}),
    );
    let pipeline = pipeline_with(&client, config());

    // When: UV data is requested
    let error = pipeline.uv().hourly().await.expect_err("api error");

    // Then: The API message is preserved
    assert_eq!(error.kind(), SourceErrorKind::Request);
    assert!(error.message().contains("Invalid date format"));
}

// =============================================================================
// Error Handling: Malformed Payloads
// =============================================================================

#[tokio::test]
async fn when_body_is_not_json_a_decode_error_is_returned() {
    // Given: A proxy error page instead of JSON
    let client = FixtureHttpClient::new().respond(
        "relative-humidity",
        HttpResponse::ok_json("<html>Bad Gateway</html>"),
    );
    let pipeline = pipeline_with(&client, config());

    // When/Then: The humidity summary fails to decode
    let error = pipeline.weather().humidity_summary().await.expect_err("not json");
    assert_eq!(error.kind(), SourceErrorKind::Decode);
}

#[tokio::test]
async fn when_payload_shape_is_wrong_a_schema_error_is_returned() {
    // Given: A PSI payload whose items are not a list
    let client = FixtureHttpClient::new().respond_json(
        "real-time/api/psi",
        &json!({"code": 0, "data": {"items": "unavailable"}}),
    );
    let pipeline = pipeline_with(&client, config());

    // When/Then: The query fails with a schema error for the dataset
    let error = pipeline.air_quality().status().await.expect_err("bad shape");
    assert_eq!(error.kind(), SourceErrorKind::Schema);
    assert_eq!(error.dataset(), Some(DatasetId::Psi));
}

#[tokio::test]
async fn when_records_lack_their_key_they_are_skipped_with_a_warning() {
    // Given: Carpark reference data where one record has no carpark number
    let client = FixtureHttpClient::new().respond_json(
        CARPARK_INFO,
        &json!({"success": true, "result": {"records": [
            {"car_park_no": "ACB", "address": "BLK 270/271 ALBERT CENTRE"},
            {"address": "BLK 99 NOWHERE"},
            {"car_park_no": "ACM", "address": "BLK 98A ALJUNIED CRESCENT"}
        ], "total": 3}}),
    );
    let pipeline = pipeline_with(&client, config());

    // When: Carparks are searched by address
    let result = pipeline
        .carparks()
        .search_by_area("blk", false, 10)
        .await
        .expect("other records still answer");

    // Then: The keyed records are kept and the skip is reported
    assert_eq!(result.data.len(), 2);
    assert!(result
        .meta
        .warnings
        .iter()
        .any(|warning| warning.contains("skipped for a missing key")));
}

// =============================================================================
// Error Handling: Invalid Arguments Fail Before Fetching
// =============================================================================

#[tokio::test]
async fn when_arguments_are_invalid_no_request_is_made() {
    // Given: A pipeline whose transport would answer anything with 404
    let client = FixtureHttpClient::new();
    let pipeline = pipeline_with(&client, config());

    // When: Each service receives a malformed argument
    let errors = vec![
        pipeline.carparks().info("   ").await.expect_err("blank carpark"),
        pipeline
            .carparks()
            .availability_at("ACB", Some("yesterday"))
            .await
            .expect_err("bad date_time"),
        pipeline
            .graduates()
            .search(SearchField::Degree, "law", Some(99))
            .await
            .expect_err("bad year"),
        pipeline
            .resale()
            .highest_price(&ResaleFilter::new().with_year(2024).with_flat_type("6 ROOM"))
            .await
            .expect_err("bad flat type"),
        pipeline
            .resale()
            .transaction_areas(Some(2024), Order::Descending, 0)
            .await
            .expect_err("zero limit"),
        pipeline
            .resale()
            .flats_by_lease_remaining(Some(120), &ResaleFilter::new().with_year(2024), None)
            .await
            .expect_err("lease beyond 99 years"),
        pipeline
            .air_quality()
            .by_region(Some("north-east"))
            .await
            .expect_err("bad region"),
        pipeline
            .weather()
            .air_temperatures(Some("01/07/2024"))
            .await
            .expect_err("bad date"),
    ];

    // Then: Every error is an invalid argument and nothing reached upstream
    for error in &errors {
        assert_eq!(error.kind(), SourceErrorKind::InvalidArgument, "{error}");
    }
    assert!(client.requests().is_empty());
}

#[test]
fn when_search_field_is_unknown_parsing_fails() {
    let error = "faculty".parse::<SearchField>().expect_err("unknown field");
    assert!(matches!(error, ValidationError::InvalidSearchField { .. }));
    assert_eq!("University".parse::<SearchField>(), Ok(SearchField::University));
}

// =============================================================================
// Security: API Key Handling
// =============================================================================

#[tokio::test]
async fn when_api_key_is_configured_it_is_sent_but_never_printed() {
    // Given: A configuration carrying an API key
    let config = PipelineConfig::default()
        .overlay(|name| (name == "SGDATA_API_KEY").then(|| String::from("secret-key-123")))
        .expect("valid overrides");
    let client = FixtureHttpClient::new().respond_json(
        CARPARK_INFO,
        &json!({"success": true, "result": {"records": [], "total": 0}}),
    );
    let pipeline = pipeline_with(&client, config);

    // When: A request is made and the configuration is debug-printed
    pipeline.carparks().info("ACB").await.expect("query");
    let printed = format!("{:?}", pipeline.config());

    // Then: The key travels as a header and is redacted in output
    let requests = client.requests();
    assert_eq!(
        requests[0].headers.get("x-api-key").map(String::as_str),
        Some("secret-key-123")
    );
    assert!(!printed.contains("secret-key-123"));
    assert!(printed.contains("<redacted>"));
}

#[test]
fn when_env_numbers_are_malformed_configuration_is_rejected() {
    let result = PipelineConfig::default()
        .overlay(|name| (name == "SGDATA_TIMEOUT_MS").then(|| String::from("fast")));

    assert!(matches!(result, Err(ValidationError::InvalidEnvNumber { .. })));
}
