//! Left join of a reference record set with a live one.

use std::collections::HashMap;

use serde::Serialize;

use crate::domain::{Record, RecordKey, Snapshot};

/// A reference record and its live counterpart, when one was reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord<S, L> {
    pub key: RecordKey,
    #[serde(rename = "static")]
    pub reference: S,
    /// `None` when the live side has no entry for this key or failed entirely.
    pub live: Option<L>,
}

/// Merge output; `degraded` when the live side was missing, empty or partial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Merged<S, L> {
    pub records: Vec<MergedRecord<S, L>>,
    pub degraded: bool,
}

/// Why a merge was degraded, if it was.
pub fn degradation(live: Option<&Snapshot>) -> Option<&'static str> {
    match live {
        None => Some("live data unavailable"),
        Some(snapshot) if snapshot.is_empty() => Some("live data returned no records"),
        Some(snapshot) if !snapshot.complete => Some("live data incomplete"),
        Some(_) => None,
    }
}

/// Joins on the record key with the reference side driving order and
/// membership. Live records without a reference counterpart are dropped.
pub fn merge<S, L>(reference: &[S], live: Option<&[L]>, degraded: bool) -> Merged<S, L>
where
    S: Record,
    L: Record,
{
    let by_key: HashMap<&RecordKey, &L> = live
        .unwrap_or_default()
        .iter()
        .map(|record| (record.key(), record))
        .collect();

    let records = reference
        .iter()
        .map(|record| MergedRecord {
            key: record.key().clone(),
            reference: record.clone(),
            live: by_key.get(record.key()).map(|live| (*live).clone()),
        })
        .collect();

    Merged { records, degraded }
}

/// [`merge`] over snapshots, deriving `degraded` from the live snapshot.
pub fn merge_snapshots<S, L>(reference: &[S], live: Option<&Snapshot>) -> Merged<S, L>
where
    S: Record,
    L: Record,
{
    let degraded = degradation(live).is_some();
    let live_records = live.and_then(|snapshot| snapshot.records::<L>().ok());
    merge(reference, live_records, degraded || (live.is_some() && live_records.is_none()))
}
