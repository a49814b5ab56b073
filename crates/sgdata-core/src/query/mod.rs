//! # Query Engine
//!
//! Stateless, synchronous operations over a borrowed record slice. Nothing
//! here mutates a snapshot or touches the network.
//!
//! | Operation | Function |
//! |-----------|----------|
//! | Keyword search | [`search`] |
//! | Top-N / extremum | [`top_n`], [`top_n_by`], [`extremum`] |
//! | Grouped aggregates | [`group_by`] |
//! | Distribution score | [`rank_by_distribution`] |
//! | Bucketed ranges | [`bucket_stats`] |
//! | Descriptive statistics | [`Summary::from_values`] |
//!
//! Field names are checked against [`Record::FIELDS`](crate::domain::Record)
//! before any record is read; unknown names, wrong field kinds and zero
//! limits fail with `InvalidArgument`.

mod buckets;
mod group;
mod rank;
mod score;
mod search;
mod stats;

pub use buckets::{bucket_stats, BucketStats, Boundaries, DEFAULT_LEASE_BOUNDARIES};
pub use group::{group_by, FieldStats, Group};
pub use rank::{extremum, top_n, top_n_by, Order, Ranked, Scored};
pub use score::{distribution_score, rank_by_distribution, DistributionFields, DistributionWeights};
pub use search::{search, DEFAULT_MAX_RESULTS};
pub use stats::Summary;
pub(crate) use stats::mean;

use crate::SourceError;

pub(crate) fn require_limit(name: &str, limit: usize) -> Result<usize, SourceError> {
    if limit == 0 {
        return Err(SourceError::invalid_argument(format!("{name} must be at least 1")));
    }
    Ok(limit)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::domain::{RecordKey, ResaleTransaction};

    pub fn sale(id: &str, town: &str, price: Option<f64>, lease: Option<u32>) -> ResaleTransaction {
        ResaleTransaction {
            id: RecordKey::new(id).expect("valid key"),
            month: Some(String::from("2024-05")),
            sale_year: Some(2024),
            town: Some(town.to_owned()),
            flat_type: Some(String::from("4 ROOM")),
            block: None,
            street_name: None,
            storey_range: None,
            floor_area_sqm: Some(90.0),
            flat_model: None,
            lease_commence_year: None,
            remaining_lease: None,
            resale_price: price,
            lease_remaining_years: lease,
        }
    }
}
