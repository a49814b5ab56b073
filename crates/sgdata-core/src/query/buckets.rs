use serde::{Deserialize, Serialize};

use crate::domain::{require_field, FieldKind, Record};
use crate::SourceError;

pub const DEFAULT_LEASE_BOUNDARIES: [f64; 5] = [50.0, 60.0, 70.0, 80.0, 90.0];

/// Strictly ascending, finite bucket boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Boundaries(Vec<f64>);

impl Boundaries {
    pub fn new(boundaries: Vec<f64>) -> Result<Self, SourceError> {
        if boundaries.is_empty() {
            return Err(SourceError::invalid_argument("bucket boundaries cannot be empty"));
        }
        if boundaries.iter().any(|boundary| !boundary.is_finite()) {
            return Err(SourceError::invalid_argument("bucket boundaries must be finite"));
        }
        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(SourceError::invalid_argument(format!(
                "bucket boundaries must be strictly ascending: {boundaries:?}"
            )));
        }
        Ok(Self(boundaries))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Index of the bucket holding `value`, `0` being the open bottom bucket.
    fn bucket_of(&self, value: f64) -> usize {
        self.0.partition_point(|boundary| *boundary <= value)
    }

    fn label(&self, index: usize) -> String {
        let last = self.0.len();
        match index {
            0 => format!("< {}", self.0[0]),
            index if index == last => format!(">= {}", self.0[last - 1]),
            index => format!("[{}, {})", self.0[index - 1], self.0[index]),
        }
    }
}

impl Default for Boundaries {
    fn default() -> Self {
        Self(DEFAULT_LEASE_BOUNDARIES.to_vec())
    }
}

impl TryFrom<Vec<f64>> for Boundaries {
    type Error = SourceError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Boundaries> for Vec<f64> {
    fn from(value: Boundaries) -> Self {
        value.0
    }
}

/// Statistics of one bucket; the extremes are unavailable when it is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    pub label: String,
    /// Inclusive; `None` for the open bottom bucket.
    pub lower: Option<f64>,
    /// Exclusive; `None` for the open top bucket.
    pub upper: Option<f64>,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Buckets every record reporting `field`. All `n + 1` buckets are
/// returned in ascending order, empty ones included.
pub fn bucket_stats<R: Record>(
    records: &[R],
    field: &str,
    boundaries: &Boundaries,
) -> Result<Vec<BucketStats>, SourceError> {
    let spec = require_field::<R>(field, FieldKind::Number)?;
    let edges = boundaries.as_slice();

    let mut buckets: Vec<BucketStats> = (0..=edges.len())
        .map(|index| BucketStats {
            label: boundaries.label(index),
            lower: index.checked_sub(1).map(|lower| edges[lower]),
            upper: edges.get(index).copied(),
            count: 0,
            min: None,
            max: None,
            mean: None,
        })
        .collect();
    let mut sums = vec![0.0_f64; buckets.len()];

    for value in records.iter().filter_map(|record| record.field(spec.name).as_number()) {
        let index = boundaries.bucket_of(value);
        let bucket = &mut buckets[index];
        bucket.count += 1;
        bucket.min = Some(bucket.min.map_or(value, |min| min.min(value)));
        bucket.max = Some(bucket.max.map_or(value, |max| max.max(value)));
        sums[index] += value;
    }

    for (bucket, sum) in buckets.iter_mut().zip(sums) {
        if bucket.count > 0 {
            bucket.mean = Some(sum / bucket.count as f64);
        }
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fixtures::sale;

    #[test]
    fn buckets_are_exhaustive_and_non_overlapping() {
        let records = vec![
            sale("1", "A", None, Some(45)),
            sale("2", "A", None, Some(50)),
            sale("3", "A", None, Some(59)),
            sale("4", "A", None, Some(90)),
            sale("5", "A", None, Some(99)),
            sale("6", "A", None, None),
        ];

        let buckets = bucket_stats(&records, "lease_remaining_years", &Boundaries::default())
            .expect("valid query");

        let labels: Vec<&str> = buckets.iter().map(|bucket| bucket.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["< 50", "[50, 60)", "[60, 70)", "[70, 80)", "[80, 90)", ">= 90"]
        );
        let counts: Vec<usize> = buckets.iter().map(|bucket| bucket.count).collect();
        assert_eq!(counts, vec![1, 2, 0, 0, 0, 2]);
        assert_eq!(counts.iter().sum::<usize>(), 5);
        assert_eq!(buckets[1].mean, Some(54.5));
        assert_eq!(buckets[2].min, None);
        assert_eq!(buckets[5].lower, Some(90.0));
        assert_eq!(buckets[5].upper, None);
    }

    #[test]
    fn boundaries_must_ascend() {
        assert!(Boundaries::new(vec![60.0, 50.0]).is_err());
        assert!(Boundaries::new(vec![50.0, 50.0]).is_err());
        assert!(Boundaries::new(Vec::new()).is_err());
        assert!(Boundaries::new(vec![10.0]).is_ok());
    }
}
