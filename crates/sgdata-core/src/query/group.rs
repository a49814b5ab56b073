use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{require_field, FieldKind, Record};
use crate::SourceError;

/// Aggregates of one numeric field within a group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldStats {
    /// Records of the group reporting this field.
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: String,
    /// Qualifying records in the group.
    pub count: usize,
    /// Keyed by field name; fields no record of the group reports are absent.
    pub fields: BTreeMap<String, FieldStats>,
}

impl Group {
    pub fn stats(&self, field: &str) -> Option<&FieldStats> {
        self.fields.get(field)
    }
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    fields: BTreeMap<String, FieldStats>,
}

impl Accumulator {
    fn add(&mut self, field: &str, value: f64) {
        match self.fields.get_mut(field) {
            Some(stats) => {
                stats.count += 1;
                stats.sum += value;
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
            }
            None => {
                self.fields.insert(
                    field.to_owned(),
                    FieldStats {
                        count: 1,
                        sum: value,
                        mean: value,
                        min: value,
                        max: value,
                    },
                );
            }
        }
    }
}

/// Groups by the text field `by` and aggregates `values` per group.
///
/// Records without a `by` value are ignored. With no value fields every
/// remaining record qualifies; otherwise a record qualifies when it reports
/// at least one of them. Groups without qualifying records are omitted.
/// Groups come back in order of first appearance.
pub fn group_by<R: Record>(records: &[R], by: &str, values: &[&str]) -> Result<Vec<Group>, SourceError> {
    let by = require_field::<R>(by, FieldKind::Text)?;
    let values = values
        .iter()
        .map(|field| require_field::<R>(field, FieldKind::Number))
        .collect::<Result<Vec<_>, _>>()?;

    let mut order: Vec<String> = Vec::new();
    let mut groups: BTreeMap<String, Accumulator> = BTreeMap::new();
    for record in records {
        let Some(key) = record.field(by.name).as_text() else {
            continue;
        };

        let reported: Vec<(&str, f64)> = values
            .iter()
            .filter_map(|spec| record.field(spec.name).as_number().map(|value| (spec.name, value)))
            .collect();
        if !values.is_empty() && reported.is_empty() {
            continue;
        }

        if !groups.contains_key(key) {
            order.push(key.to_owned());
        }
        let entry = groups.entry(key.to_owned()).or_default();
        entry.count += 1;
        for (field, value) in reported {
            entry.add(field, value);
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|key| {
            let accumulator = groups.remove(&key)?;
            let fields = accumulator
                .fields
                .into_iter()
                .map(|(field, mut stats)| {
                    stats.mean = stats.sum / stats.count as f64;
                    (field, stats)
                })
                .collect();
            Some(Group {
                key,
                count: accumulator.count,
                fields,
            })
        })
        .collect())
}
