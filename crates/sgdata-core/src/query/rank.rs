use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::{require_field, FieldKind, Record};
use crate::SourceError;

/// Sort direction of a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

impl Order {
    pub const fn highest(highest: bool) -> Self {
        if highest {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// A record with the value it was ranked by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranked<'a, R> {
    pub record: &'a R,
    pub value: f64,
}

impl<R: Clone> Ranked<'_, R> {
    pub fn to_scored(&self) -> Scored<R> {
        Scored {
            record: self.record.clone(),
            value: self.value,
        }
    }
}

/// Owned counterpart of [`Ranked`], for results that outlive the snapshot borrow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored<R> {
    pub record: R,
    pub value: f64,
}

/// Ranks by a computed value. Records whose value is unavailable are left
/// out; equal values fall back to the record key, ascending.
pub fn top_n_by<'a, R: Record>(
    records: &'a [R],
    value: impl Fn(&R) -> Option<f64>,
    order: Order,
    limit: usize,
) -> Result<Vec<Ranked<'a, R>>, SourceError> {
    let limit = super::require_limit("limit", limit)?;
    let mut ranked: Vec<Ranked<'a, R>> = records
        .iter()
        .filter_map(|record| {
            value(record)
                .filter(|value| value.is_finite())
                .map(|value| Ranked { record, value })
        })
        .collect();

    ranked.sort_by(|left, right| compare(left, right, order));
    ranked.truncate(limit);
    Ok(ranked)
}

/// [`top_n_by`] over a declared numeric field.
pub fn top_n<'a, R: Record>(
    records: &'a [R],
    field: &str,
    order: Order,
    limit: usize,
) -> Result<Vec<Ranked<'a, R>>, SourceError> {
    let spec = require_field::<R>(field, FieldKind::Number)?;
    top_n_by(records, |record| record.field(spec.name).as_number(), order, limit)
}

/// Single highest or lowest record by `field`.
///
/// An empty input is an invalid argument; `Ok(None)` means records exist
/// but none reports the field.
pub fn extremum<'a, R: Record>(
    records: &'a [R],
    field: &str,
    order: Order,
) -> Result<Option<Ranked<'a, R>>, SourceError> {
    if records.is_empty() {
        return Err(SourceError::invalid_argument(format!(
            "cannot take the extremum of '{field}' over an empty snapshot"
        )));
    }
    Ok(top_n(records, field, order, 1)?.into_iter().next())
}

fn compare<R: Record>(left: &Ranked<'_, R>, right: &Ranked<'_, R>, order: Order) -> Ordering {
    let by_value = left.value.total_cmp(&right.value);
    let by_value = match order {
        Order::Ascending => by_value,
        Order::Descending => by_value.reverse(),
    };
    by_value.then_with(|| left.record.key().cmp(right.record.key()))
}
