use serde::{Deserialize, Serialize};

use super::rank::{top_n_by, Order, Ranked};
use crate::domain::{require_field, FieldKind, Record};
use crate::{SourceError, ValidationError};

/// Weights of the percentile-based distribution score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionWeights {
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
}

impl Default for DistributionWeights {
    fn default() -> Self {
        Self {
            p25: 0.4,
            median: 0.4,
            p75: 0.2,
        }
    }
}

impl DistributionWeights {
    pub fn new(p25: f64, median: f64, p75: f64) -> Result<Self, ValidationError> {
        let weights = Self { p25, median, p75 };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, weight) in [("p25", self.p25), ("median", self.median), ("p75", self.p75)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::InvalidWeight { field });
            }
        }
        if self.p25 + self.median + self.p75 == 0.0 {
            return Err(ValidationError::ZeroWeights);
        }
        Ok(())
    }
}

/// Names of the three percentile fields a score reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionFields<'a> {
    pub p25: &'a str,
    pub median: &'a str,
    pub p75: &'a str,
}

/// `w25 * p25 + wmed * median + w75 * p75`; unavailable if any input is.
pub fn distribution_score(
    p25: Option<f64>,
    median: Option<f64>,
    p75: Option<f64>,
    weights: &DistributionWeights,
) -> Option<f64> {
    Some(weights.p25 * p25? + weights.median * median? + weights.p75 * p75?)
}

/// Highest distribution scores first.
pub fn rank_by_distribution<'a, R: Record>(
    records: &'a [R],
    fields: DistributionFields<'_>,
    weights: &DistributionWeights,
    limit: usize,
) -> Result<Vec<Ranked<'a, R>>, SourceError> {
    weights.validate()?;
    let p25 = require_field::<R>(fields.p25, FieldKind::Number)?.name;
    let median = require_field::<R>(fields.median, FieldKind::Number)?.name;
    let p75 = require_field::<R>(fields.p75, FieldKind::Number)?.name;

    top_n_by(
        records,
        |record| {
            distribution_score(
                record.field(p25).as_number(),
                record.field(median).as_number(),
                record.field(p75).as_number(),
                weights,
            )
        },
        Order::Descending,
        limit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GraduateOutcome, RecordKey};

    const FIELDS: DistributionFields<'static> = DistributionFields {
        p25: "gross_monthly_p25",
        median: "gross_monthly_median",
        p75: "gross_monthly_p75",
    };

    fn outcome(key: &str, p25: Option<f64>, median: Option<f64>, p75: Option<f64>) -> GraduateOutcome {
        GraduateOutcome {
            key: RecordKey::new(key).expect("valid key"),
            year: 2022,
            university: String::from("Nanyang Technological University"),
            school: None,
            degree: key.to_owned(),
            employment_rate_overall: None,
            employment_rate_ft_perm: None,
            basic_monthly_mean: None,
            basic_monthly_median: None,
            gross_monthly_mean: None,
            gross_monthly_median: median,
            gross_monthly_p25: p25,
            gross_monthly_p75: p75,
        }
    }

    #[test]
    fn record_missing_any_percentile_is_excluded() {
        let records = vec![
            outcome("incomplete", Some(3_000.0), None, Some(4_000.0)),
            outcome("complete", Some(4_000.0), Some(5_000.0), Some(6_000.0)),
        ];

        let ranked = rank_by_distribution(&records, FIELDS, &DistributionWeights::default(), 10)
            .expect("valid query");

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].record.degree, "complete");
        assert!((ranked[0].value - 4_800.0).abs() < 1e-9);
    }

    #[test]
    fn weights_are_validated() {
        assert_eq!(
            DistributionWeights::new(-0.1, 0.5, 0.5),
            Err(ValidationError::InvalidWeight { field: "p25" })
        );
        assert_eq!(DistributionWeights::new(0.0, 0.0, 0.0), Err(ValidationError::ZeroWeights));
        assert!(DistributionWeights::new(0.2, 0.6, 0.2).is_ok());
    }
}
