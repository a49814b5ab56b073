//! Property tests for the query engine over normalized snapshots
//!
//! These tests verify invariants that must hold for any record set:
//! unavailable values never rank, buckets partition their input, rankings
//! are deterministic, and groups account for every qualifying record.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sgdata_core::{
    query::{
        bucket_stats, group_by, rank_by_distribution, search, top_n, DistributionFields,
    },
    Boundaries, DatasetId, DistributionWeights, FixtureHttpClient, GraduateOutcome, Order,
    Pipeline, PipelineConfig, ResaleTransaction, RetryConfig, Snapshot, SourceErrorKind, Summary,
};

fn pipeline(client: &FixtureHttpClient) -> Pipeline {
    let config = PipelineConfig {
        retry: RetryConfig::fixed(Duration::from_millis(1), 1),
        ..PipelineConfig::default()
    };
    Pipeline::builder()
        .with_config(config)
        .with_http_client(Arc::new(client.clone()))
        .build()
        .expect("default config is valid")
}

fn ckan(records: Vec<Value>) -> Value {
    let total = records.len();
    json!({"success": true, "result": {"records": records, "total": total}})
}

fn sale(id: u64, town: &str, price: Option<u32>, commenced: Option<i32>) -> Value {
    json!({
        "_id": id,
        "month": "2024-03",
        "town": town,
        "flat_type": "4 ROOM",
        "resale_price": price.map_or(json!(null), |price| json!(price.to_string())),
        "lease_commence_date": commenced.map_or(json!(null), |year| json!(year.to_string())),
    })
}

async fn resale_snapshot() -> Arc<Snapshot> {
    let client = FixtureHttpClient::new().respond_json(
        "d_8b84c4ee58e3cfc0ece0d773c8ca6abc",
        &ckan(vec![
            sale(1, "ANG MO KIO", Some(400_000), Some(1980)),
            sale(2, "BEDOK", Some(600_000), Some(2015)),
            sale(3, "ANG MO KIO", Some(600_000), Some(1978)),
            sale(4, "TAMPINES", None, Some(1995)),
            sale(5, "BEDOK", Some(350_000), None),
            sale(6, "CLEMENTI", Some(820_000), Some(2020)),
            sale(7, "ANG MO KIO", Some(600_000), Some(1974)),
        ]),
    );
    pipeline(&client)
        .snapshot(DatasetId::HdbResale)
        .await
        .expect("resale snapshot")
        .snapshot
}

fn outcome(degree: &str, p25: Option<u32>, median: Option<u32>, p75: Option<u32>) -> Value {
    let number = |value: Option<u32>| value.map_or(json!("na"), |value| json!(value.to_string()));
    json!({
        "year": "2022",
        "university": "Nanyang Technological University",
        "school": "College of Engineering",
        "degree": degree,
        "gross_mthly_25_percentile": number(p25),
        "gross_monthly_median": number(median),
        "gross_mthly_75_percentile": number(p75),
    })
}

async fn graduate_snapshot() -> Arc<Snapshot> {
    let client = FixtureHttpClient::new().respond_json(
        "d_3c55210de27fcccda2ed0c63fdd2b352",
        &ckan(vec![
            outcome("Bachelor of Engineering (Computer Engineering)", Some(4500), Some(5200), Some(6100)),
            outcome("Bachelor of Engineering (Civil)", Some(3600), Some(4100), None),
            outcome("Bachelor of Science (Data Science and AI)", Some(5000), Some(6000), Some(7500)),
            outcome("Bachelor of Engineering (Materials)", None, None, None),
        ]),
    );
    pipeline(&client)
        .snapshot(DatasetId::GraduateEmployment)
        .await
        .expect("graduate snapshot")
        .snapshot
}

// =============================================================================
// Property: Unavailable Values Never Rank
// =============================================================================

#[tokio::test]
async fn distribution_scores_exclude_records_missing_any_percentile() {
    // Given: Graduate rows, two of which lack a percentile
    let snapshot = graduate_snapshot().await;
    let records = snapshot.records::<GraduateOutcome>().expect("graduate records");
    let fields = DistributionFields {
        p25: "gross_monthly_p25",
        median: "gross_monthly_median",
        p75: "gross_monthly_p75",
    };

    // When: Rows are ranked by distribution score
    let ranked = rank_by_distribution(records, fields, &DistributionWeights::default(), 10)
        .expect("valid fields");

    // Then: Only complete rows are scored, best first
    let degrees: Vec<&str> = ranked.iter().map(|entry| entry.record.degree.as_str()).collect();
    assert_eq!(
        degrees,
        vec![
            "Bachelor of Science (Data Science and AI)",
            "Bachelor of Engineering (Computer Engineering)",
        ]
    );
    assert!(ranked.windows(2).all(|pair| pair[0].value >= pair[1].value));
}

#[tokio::test]
async fn top_n_skips_records_without_the_ranked_field() {
    // Given: Resale records where one has no price
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");

    // When: Every record is ranked by price
    let ranked = top_n(records, "resale_price", Order::Ascending, records.len()).expect("valid field");

    // Then: The unpriced record is absent and values ascend
    assert_eq!(ranked.len(), records.len() - 1);
    assert!(ranked.iter().all(|entry| entry.record.id.as_str() != "4"));
    assert!(ranked.windows(2).all(|pair| pair[0].value <= pair[1].value));
}

// =============================================================================
// Property: Rankings Are Deterministic
// =============================================================================

#[tokio::test]
async fn top_n_is_idempotent_and_breaks_ties_by_key() {
    // Given: Resale records with a three-way price tie
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");

    // When: The same ranking runs twice, and a shorter one runs once
    let first = top_n(records, "resale_price", Order::Descending, 4).expect("ranking");
    let second = top_n(records, "resale_price", Order::Descending, 4).expect("ranking");
    let shorter = top_n(records, "resale_price", Order::Descending, 2).expect("ranking");

    // Then: Results are identical and the shorter ranking is a prefix
    assert_eq!(first, second);
    assert_eq!(&first[..2], shorter.as_slice());

    // And: Tied prices are ordered by record key
    let ids: Vec<&str> = first.iter().map(|entry| entry.record.id.as_str()).collect();
    assert_eq!(ids, vec!["6", "2", "3", "7"]);
}

#[tokio::test]
async fn zero_limits_and_unknown_fields_are_invalid_arguments() {
    // Given: Resale records
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");

    // When/Then: A zero limit is rejected
    let error = top_n(records, "resale_price", Order::Descending, 0).expect_err("zero limit");
    assert_eq!(error.kind(), SourceErrorKind::InvalidArgument);

    // When/Then: A field the record type does not declare is rejected
    let error = top_n(records, "asking_price", Order::Descending, 3).expect_err("unknown field");
    assert_eq!(error.kind(), SourceErrorKind::InvalidArgument);

    // When/Then: A text field cannot be ranked
    let error = top_n(records, "town", Order::Descending, 3).expect_err("text field");
    assert_eq!(error.kind(), SourceErrorKind::InvalidArgument);
}

// =============================================================================
// Property: Buckets and Groups Account for Every Record
// =============================================================================

#[tokio::test]
async fn lease_buckets_partition_every_record_that_reports_a_lease() {
    // Given: Resale records, one without a lease commencement year
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");
    let reporting = records
        .iter()
        .filter(|record| record.lease_remaining_years.is_some())
        .count();

    // When: Remaining lease is bucketed on the default boundaries
    let buckets = bucket_stats(records, "lease_remaining_years", &Boundaries::default())
        .expect("valid field");

    // Then: All buckets are present, ordered, and together hold every reporting record
    assert_eq!(buckets.len(), 6);
    assert_eq!(buckets.iter().map(|bucket| bucket.count).sum::<usize>(), reporting);
    assert_eq!(buckets[0].lower, None);
    assert_eq!(buckets[5].upper, None);
    for pair in buckets.windows(2) {
        assert_eq!(pair[0].upper, pair[1].lower, "buckets must not overlap or leave gaps");
    }
    for bucket in buckets.iter().filter(|bucket| bucket.count > 0) {
        let min = bucket.min.expect("non-empty bucket has a min");
        assert!(bucket.lower.map_or(true, |lower| min >= lower));
        assert!(bucket.upper.map_or(true, |upper| bucket.max.expect("max") < upper));
    }
}

#[test]
fn boundaries_must_be_strictly_ascending() {
    assert!(Boundaries::new(vec![50.0, 70.0, 60.0]).is_err());
    assert!(Boundaries::new(vec![50.0, 50.0]).is_err());
    assert!(Boundaries::new(vec![50.0, 60.0]).is_ok());
}

#[tokio::test]
async fn groups_count_every_record_in_order_of_first_appearance() {
    // Given: Resale records across four towns
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");

    // When: Records are grouped by town with and without a value field
    let counted = group_by(records, "town", &[]).expect("grouping");
    let priced = group_by(records, "town", &["resale_price"]).expect("grouping");

    // Then: Counting keeps every record and towns appear as first seen
    let towns: Vec<&str> = counted.iter().map(|group| group.key.as_str()).collect();
    assert_eq!(towns, vec!["ANG MO KIO", "BEDOK", "TAMPINES", "CLEMENTI"]);
    assert_eq!(counted.iter().map(|group| group.count).sum::<usize>(), records.len());

    // And: A town with no priced record drops out of the price grouping
    assert!(priced.iter().all(|group| group.key != "TAMPINES"));
    let bedok = priced
        .iter()
        .find(|group| group.key == "BEDOK")
        .and_then(|group| group.stats("resale_price"))
        .expect("BEDOK reports prices");
    assert_eq!(bedok.count, 2);
    assert_eq!(bedok.mean, 475_000.0);
    assert_eq!(bedok.min, 350_000.0);
}

// =============================================================================
// Property: Search and Summaries
// =============================================================================

#[tokio::test]
async fn search_is_case_insensitive_and_capped() {
    // Given: Resale records
    let snapshot = resale_snapshot().await;
    let records = snapshot.records::<ResaleTransaction>().expect("resale records");

    // When: Towns are searched with mixed case and a cap of two
    let found = search(records, &["town"], "aNg mO", 2).expect("search");

    // Then: The first two matches in source order are returned
    let ids: Vec<&str> = found.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);

    // And: A blank keyword is rejected
    let error = search(records, &["town"], "   ", 2).expect_err("blank keyword");
    assert_eq!(error.kind(), SourceErrorKind::InvalidArgument);
}

#[test]
fn summary_ignores_non_finite_values() {
    let summary = Summary::from_values([3.0, f64::NAN, 1.0, 2.0, f64::INFINITY, 4.0])
        .expect("finite values present");

    assert_eq!(summary.count, 4);
    assert_eq!(summary.median, 2.5);
    assert_eq!(summary.min, 1.0);
    assert_eq!(summary.max, 4.0);
    assert!(Summary::from_values([f64::NAN]).is_none());
}
