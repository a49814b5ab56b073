use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetId;
use crate::domain::GraduateOutcome;
use crate::envelope::Envelope;
use crate::query::{
    extremum, mean, rank_by_distribution, search, top_n, top_n_by, DistributionFields, Order, Scored,
};
use crate::services::{query, require_text, require_year, Pipeline};
use crate::{SourceError, ValidationError};

const DEFAULT_SALARY_METRIC: &str = "gross_monthly_median";
const DEFAULT_EMPLOYMENT_METRIC: &str = "employment_rate_overall";

/// Text field a graduate search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Degree,
    University,
    School,
}

impl SearchField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Degree => "degree",
            Self::University => "university",
            Self::School => "school",
        }
    }
}

impl Display for SearchField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchField {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "degree" => Ok(Self::Degree),
            "university" => Ok(Self::University),
            "school" => Ok(Self::School),
            _ => Err(ValidationError::InvalidSearchField {
                value: value.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub record: GraduateOutcome,
    pub score: f64,
    /// 75th minus 25th percentile gross monthly salary.
    pub spread: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraduateEstimate {
    pub record: GraduateOutcome,
    pub estimate: u32,
}

/// Survey outcomes of one degree aggregated across universities and years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegreeTotal {
    pub degree: String,
    pub total_estimate: u64,
    pub universities: usize,
    pub years: Vec<i32>,
    pub avg_gross_median: Option<f64>,
    pub avg_gross_mean: Option<f64>,
    pub avg_employment_rate: Option<f64>,
}

/// Graduate employment survey queries.
#[derive(Debug, Clone, Copy)]
pub struct GraduateService<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> GraduateService<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Survey years present in the dataset, ascending.
    pub async fn available_years(&self) -> Result<Envelope<Vec<i32>>, SourceError> {
        self.run(|records| {
            let years: BTreeSet<i32> = records.iter().map(|record| record.year).collect();
            Ok(years.into_iter().collect())
        })
        .await
    }

    pub async fn search(
        &self,
        field: SearchField,
        keyword: &str,
        year: Option<i32>,
    ) -> Result<Envelope<Vec<GraduateOutcome>>, SourceError> {
        let year = year.map(require_year).transpose()?;
        self.run(move |records| {
            let records = in_year(records, year);
            Ok(search(&records, &[field.as_str()], keyword, usize::MAX)?
                .into_iter()
                .cloned()
                .collect())
        })
        .await
    }

    /// Highest-paying programme by `metric` (gross monthly median by default).
    pub async fn highest_paid(
        &self,
        metric: Option<&str>,
        year: Option<i32>,
    ) -> Result<Envelope<Option<Scored<GraduateOutcome>>>, SourceError> {
        self.extreme(metric.unwrap_or(DEFAULT_SALARY_METRIC), year, Order::Descending)
            .await
    }

    pub async fn lowest_paid(
        &self,
        metric: Option<&str>,
        year: Option<i32>,
    ) -> Result<Envelope<Option<Scored<GraduateOutcome>>>, SourceError> {
        self.extreme(metric.unwrap_or(DEFAULT_SALARY_METRIC), year, Order::Ascending)
            .await
    }

    /// Programme with the highest employment rate (overall by default).
    pub async fn highest_employment(
        &self,
        metric: Option<&str>,
        year: Option<i32>,
    ) -> Result<Envelope<Option<Scored<GraduateOutcome>>>, SourceError> {
        self.extreme(metric.unwrap_or(DEFAULT_EMPLOYMENT_METRIC), year, Order::Descending)
            .await
    }

    pub async fn lowest_employment(
        &self,
        metric: Option<&str>,
        year: Option<i32>,
    ) -> Result<Envelope<Option<Scored<GraduateOutcome>>>, SourceError> {
        self.extreme(metric.unwrap_or(DEFAULT_EMPLOYMENT_METRIC), year, Order::Ascending)
            .await
    }

    /// Outcomes of degrees matching `degree_keyword` in `years` (every year
    /// when empty), ordered by year.
    pub async fn compare_across_years(
        &self,
        degree_keyword: &str,
        years: &[i32],
    ) -> Result<Envelope<Vec<GraduateOutcome>>, SourceError> {
        let keyword = require_text("degree keyword", degree_keyword)?.to_lowercase();
        let years = years
            .iter()
            .map(|year| require_year(*year))
            .collect::<Result<BTreeSet<i32>, _>>()?;

        self.run(move |records| {
            let mut matches: Vec<GraduateOutcome> = records
                .iter()
                .filter(|record| years.is_empty() || years.contains(&record.year))
                .filter(|record| record.degree.to_lowercase().contains(&keyword))
                .cloned()
                .collect();
            matches.sort_by(|left, right| left.year.cmp(&right.year).then_with(|| left.key.cmp(&right.key)));
            Ok(matches)
        })
        .await
    }

    pub async fn top_by_year(
        &self,
        year: i32,
        metric: &str,
        limit: usize,
    ) -> Result<Envelope<Vec<Scored<GraduateOutcome>>>, SourceError> {
        let year = require_year(year)?;
        let metric = require_text("metric", metric)?.to_owned();
        self.run(move |records| {
            let records = in_year(records, Some(year));
            Ok(top_n(&records, &metric, Order::Descending, limit)?
                .iter()
                .map(|entry| entry.to_scored())
                .collect())
        })
        .await
    }

    /// Programmes ranked by the weighted 25th/median/75th gross salary score.
    pub async fn best_salary_distribution(
        &self,
        year: Option<i32>,
        limit: usize,
    ) -> Result<Envelope<Vec<DistributionEntry>>, SourceError> {
        let year = year.map(require_year).transpose()?;
        let weights = self.pipeline.config().distribution_weights.clone();
        self.run(move |records| {
            let records = in_year(records, year);
            let fields = DistributionFields {
                p25: "gross_monthly_p25",
                median: "gross_monthly_median",
                p75: "gross_monthly_p75",
            };
            Ok(rank_by_distribution(&records, fields, &weights, limit)?
                .into_iter()
                .map(|entry| DistributionEntry {
                    spread: entry.record.salary_spread(),
                    record: entry.record.clone(),
                    score: entry.value,
                })
                .collect())
        })
        .await
    }

    /// Programmes ranked by estimated graduate headcount.
    pub async fn by_estimated_graduates(
        &self,
        highest: bool,
        year: Option<i32>,
        limit: usize,
    ) -> Result<Envelope<Vec<GraduateEstimate>>, SourceError> {
        let year = year.map(require_year).transpose()?;
        let table = self.pipeline.config().graduate_estimate.clone();
        self.run(move |records| {
            let records = in_year(records, year);
            let ranked = top_n_by(
                &records,
                |record| table.estimate(record).map(f64::from),
                Order::highest(highest),
                limit,
            )?;
            Ok(ranked
                .into_iter()
                .filter_map(|entry| {
                    table.estimate(entry.record).map(|estimate| GraduateEstimate {
                        record: entry.record.clone(),
                        estimate,
                    })
                })
                .collect())
        })
        .await
    }

    /// Per-degree totals, largest estimated headcount first.
    pub async fn totals_by_degree(&self) -> Result<Envelope<Vec<DegreeTotal>>, SourceError> {
        let table = self.pipeline.config().graduate_estimate.clone();
        self.run(move |records| {
            let mut by_degree: BTreeMap<&str, DegreeAccum<'_>> = BTreeMap::new();
            for record in records {
                by_degree.entry(record.degree.as_str()).or_default().add(record, table.estimate(record));
            }

            let mut totals: Vec<DegreeTotal> = by_degree
                .into_iter()
                .map(|(degree, accum)| accum.finish(degree))
                .collect();
            totals.sort_by(|left, right| {
                right
                    .total_estimate
                    .cmp(&left.total_estimate)
                    .then_with(|| left.degree.cmp(&right.degree))
            });
            Ok(totals)
        })
        .await
    }

    async fn extreme(
        &self,
        metric: &str,
        year: Option<i32>,
        order: Order,
    ) -> Result<Envelope<Option<Scored<GraduateOutcome>>>, SourceError> {
        let year = year.map(require_year).transpose()?;
        let metric = require_text("metric", metric)?.to_owned();
        self.run(move |records| {
            let records = in_year(records, year);
            if records.is_empty() {
                if let Some(year) = year {
                    return Err(SourceError::invalid_argument(format!(
                        "no graduate employment records for {year}"
                    )));
                }
            }
            Ok(extremum(&records, &metric, order)?.map(|entry| entry.to_scored()))
        })
        .await
    }

    async fn run<T>(
        &self,
        run: impl FnOnce(&[GraduateOutcome]) -> Result<T, SourceError>,
    ) -> Result<Envelope<T>, SourceError> {
        query(self.pipeline, DatasetId::GraduateEmployment, run).await
    }
}

fn in_year(records: &[GraduateOutcome], year: Option<i32>) -> Vec<GraduateOutcome> {
    records
        .iter()
        .filter(|record| year.map_or(true, |year| record.year == year))
        .cloned()
        .collect()
}

#[derive(Default)]
struct DegreeAccum<'a> {
    total_estimate: u64,
    universities: BTreeSet<&'a str>,
    years: BTreeSet<i32>,
    gross_median: Vec<Option<f64>>,
    gross_mean: Vec<Option<f64>>,
    employment_rate: Vec<Option<f64>>,
}

impl<'a> DegreeAccum<'a> {
    fn add(&mut self, record: &'a GraduateOutcome, estimate: Option<u32>) {
        self.total_estimate += u64::from(estimate.unwrap_or(0));
        self.universities.insert(record.university.as_str());
        self.years.insert(record.year);
        self.gross_median.push(record.gross_monthly_median);
        self.gross_mean.push(record.gross_monthly_mean);
        self.employment_rate.push(record.employment_rate_overall);
    }

    fn finish(self, degree: &str) -> DegreeTotal {
        DegreeTotal {
            degree: degree.to_owned(),
            total_estimate: self.total_estimate,
            universities: self.universities.len(),
            years: self.years.into_iter().collect(),
            avg_gross_median: mean(self.gross_median),
            avg_gross_mean: mean(self.gross_mean),
            avg_employment_rate: mean(self.employment_rate),
        }
    }
}
