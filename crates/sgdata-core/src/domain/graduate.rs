use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, Record, RecordKey};

/// Graduate employment survey outcome for one degree programme in one year.
///
/// Keyed by `year|university|school|degree`; rates are percentages and
/// salaries are monthly SGD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduateOutcome {
    pub key: RecordKey,
    pub year: i32,
    pub university: String,
    pub school: Option<String>,
    pub degree: String,
    pub employment_rate_overall: Option<f64>,
    pub employment_rate_ft_perm: Option<f64>,
    pub basic_monthly_mean: Option<f64>,
    pub basic_monthly_median: Option<f64>,
    pub gross_monthly_mean: Option<f64>,
    pub gross_monthly_median: Option<f64>,
    pub gross_monthly_p25: Option<f64>,
    pub gross_monthly_p75: Option<f64>,
}

impl GraduateOutcome {
    pub fn compose_key(year: i32, university: &str, school: Option<&str>, degree: &str) -> String {
        format!("{year}|{university}|{}|{degree}", school.unwrap_or_default())
    }

    /// Interquartile spread of gross monthly salary.
    pub fn salary_spread(&self) -> Option<f64> {
        Some(self.gross_monthly_p75? - self.gross_monthly_p25?)
    }
}

impl Record for GraduateOutcome {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("degree"),
        FieldSpec::text("university"),
        FieldSpec::text("school"),
        FieldSpec::number("year"),
        FieldSpec::number("employment_rate_overall"),
        FieldSpec::number("employment_rate_ft_perm"),
        FieldSpec::number("basic_monthly_mean"),
        FieldSpec::number("basic_monthly_median"),
        FieldSpec::number("gross_monthly_mean"),
        FieldSpec::number("gross_monthly_median"),
        FieldSpec::number("gross_monthly_p25"),
        FieldSpec::number("gross_monthly_p75"),
    ];

    fn key(&self) -> &RecordKey {
        &self.key
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "degree" => FieldValue::Text(&self.degree),
            "university" => FieldValue::Text(&self.university),
            "school" => FieldValue::text(self.school.as_deref()),
            "year" => FieldValue::Number(f64::from(self.year)),
            "employment_rate_overall" => FieldValue::number(self.employment_rate_overall),
            "employment_rate_ft_perm" => FieldValue::number(self.employment_rate_ft_perm),
            "basic_monthly_mean" => FieldValue::number(self.basic_monthly_mean),
            "basic_monthly_median" => FieldValue::number(self.basic_monthly_median),
            "gross_monthly_mean" => FieldValue::number(self.gross_monthly_mean),
            "gross_monthly_median" => FieldValue::number(self.gross_monthly_median),
            "gross_monthly_p25" => FieldValue::number(self.gross_monthly_p25),
            "gross_monthly_p75" => FieldValue::number(self.gross_monthly_p75),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(Graduates);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegreeBase {
    /// Lowercase substrings matched against the degree name.
    pub keywords: Vec<String>,
    pub base: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityMultiplier {
    /// Case-sensitive substring matched against the university name.
    pub pattern: String,
    pub multiplier: f64,
}

/// Heuristic cohort-size table; the survey itself does not publish counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraduateEstimateTable {
    pub degree_bases: Vec<DegreeBase>,
    pub default_base: u32,
    pub university_multipliers: Vec<UniversityMultiplier>,
    pub default_multiplier: f64,
}

impl Default for GraduateEstimateTable {
    fn default() -> Self {
        let keywords = |words: &[&str]| words.iter().map(|word| (*word).to_owned()).collect();
        Self {
            degree_bases: vec![
                DegreeBase {
                    keywords: keywords(&["business", "accountancy", "engineering", "computer science"]),
                    base: 150,
                },
                DegreeBase {
                    keywords: keywords(&["medicine", "law", "dentistry"]),
                    base: 80,
                },
            ],
            default_base: 100,
            university_multipliers: vec![
                UniversityMultiplier {
                    pattern: String::from("National University"),
                    multiplier: 1.2,
                },
                UniversityMultiplier {
                    pattern: String::from("Nanyang"),
                    multiplier: 1.1,
                },
            ],
            default_multiplier: 0.8,
        }
    }
}

impl GraduateEstimateTable {
    /// Estimated cohort size; unavailable without an overall employment rate.
    pub fn estimate(&self, outcome: &GraduateOutcome) -> Option<u32> {
        outcome.employment_rate_overall?;

        let degree = outcome.degree.to_lowercase();
        let base = self
            .degree_bases
            .iter()
            .find(|rule| rule.keywords.iter().any(|keyword| degree.contains(keyword.as_str())))
            .map_or(self.default_base, |rule| rule.base);
        let multiplier = self
            .university_multipliers
            .iter()
            .find(|rule| outcome.university.contains(rule.pattern.as_str()))
            .map_or(self.default_multiplier, |rule| rule.multiplier);

        let estimate = (f64::from(base) * multiplier).floor();
        (estimate.is_finite() && estimate >= 0.0).then_some(estimate as u32)
    }
}
