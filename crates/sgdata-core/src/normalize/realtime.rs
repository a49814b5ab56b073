//! Real-time payloads: carpark availability and the v2 environment readings.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::values::{number, text, timestamp, unsigned};
use super::{shape_error, Collector, Normalized};
use crate::domain::{
    CarparkAvailability, GeoPoint, LotAvailability, Record, RecordKey, RegionalAirQuality,
    StationReading, UvReading,
};
use crate::{SourceError, UtcDateTime};

fn decode_page<T: DeserializeOwned>(page: &Value, what: &str) -> Result<T, SourceError> {
    T::deserialize(page).map_err(|error| shape_error(format!("unexpected {what} payload: {error}")))
}

fn decode_pages<T: DeserializeOwned>(pages: &[Value], what: &str) -> Result<Vec<T>, SourceError> {
    if pages.is_empty() {
        return Err(shape_error(format!("no {what} payload received")));
    }
    pages.iter().map(|page| decode_page(page, what)).collect()
}

/// First entry with the greatest timestamp; entries without one rank lowest.
fn latest<T>(items: &[T], stamp: impl Fn(&T) -> Option<UtcDateTime>) -> Option<&T> {
    let mut best: Option<(&T, Option<UtcDateTime>)> = None;
    for item in items {
        let current = stamp(item);
        match best {
            Some((_, best_stamp)) if current <= best_stamp => {}
            _ => best = Some((item, current)),
        }
    }
    best.map(|(item, _)| item)
}

fn finish<R: Record>(collector: Collector<R>, source_timestamp: Option<UtcDateTime>) -> Normalized {
    Normalized {
        records: R::into_set(collector.records),
        rejected: collector.rejected,
        source_timestamp,
    }
}

#[derive(Debug, Deserialize)]
struct AvailabilityPage {
    items: Vec<AvailabilityItem>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityItem {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    carpark_data: Vec<Value>,
}

pub(super) fn carpark_availability(pages: &[Value]) -> Result<Normalized, SourceError> {
    let page: AvailabilityPage = decode_page(
        pages.first().ok_or_else(|| shape_error("no carpark availability payload received"))?,
        "carpark availability",
    )?;
    let Some(item) = page.items.first() else {
        return Ok(finish(Collector::<CarparkAvailability>::new(), None));
    };

    let mut collector = Collector::new();
    let mut seen = HashSet::new();
    for raw in &item.carpark_data {
        let parsed = carpark(raw);
        if let Ok(record) = &parsed {
            if !seen.insert(record.carpark_number.clone()) {
                log::debug!("duplicate availability entry for {}", record.carpark_number.as_str());
                continue;
            }
        }
        collector.push(parsed);
    }

    let source_timestamp = item
        .timestamp
        .as_deref()
        .and_then(|stamp| UtcDateTime::parse_local(stamp).ok());
    Ok(finish(collector, source_timestamp))
}

fn carpark(raw: &Value) -> Result<CarparkAvailability, &'static str> {
    let carpark_number = text(raw.get("carpark_number"))
        .and_then(|number| RecordKey::new(number.to_ascii_uppercase()).ok())
        .ok_or("carpark_number")?;

    let lots = raw
        .get("carpark_info")
        .and_then(Value::as_array)
        .map(|lots| {
            lots.iter()
                .map(|lot| LotAvailability {
                    lot_type: text(lot.get("lot_type")).unwrap_or_default(),
                    total_lots: unsigned(lot.get("total_lots")),
                    lots_available: unsigned(lot.get("lots_available")),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CarparkAvailability {
        carpark_number,
        update_datetime: timestamp(raw.get("update_datetime")),
        lots,
    })
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl RawLocation {
    fn point(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint::new(latitude, longitude)),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationPage {
    #[serde(default)]
    stations: Vec<RawStation>,
    readings: Vec<ReadingSet>,
    #[serde(default)]
    reading_type: Option<String>,
    #[serde(default)]
    reading_unit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStation {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
struct ReadingSet {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    data: Vec<StationValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationValue {
    #[serde(default)]
    station_id: Option<Value>,
    #[serde(default)]
    value: Option<Value>,
}

/// One record per station with its most recent value.
pub(super) fn stations(pages: &[Value]) -> Result<Normalized, SourceError> {
    let pages: Vec<StationPage> = decode_pages(pages, "station readings")?;
    let reading_type = pages.iter().find_map(|page| page.reading_type.clone());
    let unit = pages.iter().find_map(|page| page.reading_unit.clone());

    let mut sets: Vec<(Option<UtcDateTime>, &ReadingSet)> = pages
        .iter()
        .flat_map(|page| &page.readings)
        .map(|set| (set.timestamp.as_deref().and_then(|stamp| UtcDateTime::parse_local(stamp).ok()), set))
        .collect();
    // Stable sort keeps upstream order between sets with equal timestamps.
    sets.sort_by(|left, right| right.0.cmp(&left.0));

    let mut newest: HashMap<String, (Option<f64>, Option<UtcDateTime>)> = HashMap::new();
    let mut reported: Vec<String> = Vec::new();
    for (stamp, set) in &sets {
        for entry in &set.data {
            let Some(station_id) = text(entry.station_id.as_ref()) else {
                continue;
            };
            if !newest.contains_key(&station_id) {
                reported.push(station_id.clone());
                newest.insert(station_id, (number(entry.value.as_ref()), *stamp));
            }
        }
    }

    let mut collector = Collector::new();
    let mut listed = HashSet::new();
    for station in pages.iter().flat_map(|page| &page.stations) {
        let Some(station_id) = text(station.id.as_ref()).and_then(|id| RecordKey::new(id).ok()) else {
            collector.push(Err("id"));
            continue;
        };
        if !listed.insert(station_id.as_str().to_owned()) {
            continue;
        }
        let (value, stamp) = newest.get(station_id.as_str()).copied().unwrap_or((None, None));
        collector.push(Ok(StationReading {
            station_id,
            device_id: station.device_id.clone(),
            name: station.name.clone(),
            location: station.location.as_ref().and_then(RawLocation::point),
            value,
            reading_type: reading_type.clone(),
            unit: unit.clone(),
            timestamp: stamp,
        }));
    }

    for station_id in reported {
        if listed.contains(&station_id) {
            continue;
        }
        let (value, stamp) = newest.get(&station_id).copied().unwrap_or((None, None));
        let Ok(key) = RecordKey::new(station_id) else {
            continue;
        };
        collector.push(Ok(StationReading {
            station_id: key,
            device_id: None,
            name: None,
            location: None,
            value,
            reading_type: reading_type.clone(),
            unit: unit.clone(),
            timestamp: stamp,
        }));
    }

    let source_timestamp = sets.first().and_then(|(stamp, _)| *stamp);
    Ok(finish(collector, source_timestamp))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PsiPage {
    #[serde(default)]
    region_metadata: Vec<RegionMetadata>,
    items: Vec<PsiItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    label_location: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PsiItem {
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    updated_timestamp: Option<String>,
    #[serde(default)]
    readings: HashMap<String, BTreeMap<String, Value>>,
}

impl PsiItem {
    fn reading(&self, metric: &str, region: &str) -> Option<f64> {
        self.readings
            .get(metric)
            .and_then(|by_region| number(by_region.get(region)))
    }
}

/// Regional pollutant readings from the most recent PSI item.
pub(super) fn air_quality(pages: &[Value]) -> Result<Normalized, SourceError> {
    let pages: Vec<PsiPage> = decode_pages(pages, "psi")?;
    let metadata: Vec<&RegionMetadata> = pages.iter().flat_map(|page| &page.region_metadata).collect();
    let items: Vec<&PsiItem> = pages.iter().flat_map(|page| &page.items).collect();
    let item = latest(&items, |item| parse_stamp(item.timestamp.as_deref())).copied();

    let mut collector = Collector::new();
    let mut regions: Vec<(String, Option<GeoPoint>)> = Vec::new();
    for entry in &metadata {
        match entry.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) if regions.iter().any(|(known, _)| known == name) => {}
            Some(name) => regions.push((
                name.to_owned(),
                entry.label_location.as_ref().and_then(RawLocation::point),
            )),
            None => collector.push(Err("name")),
        }
    }
    if let Some(item) = item {
        for region in item.readings.values().flat_map(BTreeMap::keys) {
            if !regions.iter().any(|(known, _)| known == region) {
                regions.push((region.clone(), None));
            }
        }
    }

    let timestamp = item.and_then(|item| parse_stamp(item.timestamp.as_deref()));
    let updated_at = item.and_then(|item| parse_stamp(item.updated_timestamp.as_deref()));
    for (region, location) in regions {
        let Ok(key) = RecordKey::new(region.as_str()) else {
            continue;
        };
        let reading = |metric: &str| item.and_then(|item| item.reading(metric, &region));
        collector.push(Ok(RegionalAirQuality {
            region: key,
            location,
            psi_24h: reading("psi_twenty_four_hourly"),
            pm25_24h: reading("pm25_twenty_four_hourly"),
            pm10_24h: reading("pm10_twenty_four_hourly"),
            o3_8h_max: reading("o3_eight_hour_max"),
            no2_1h_max: reading("no2_one_hour_max"),
            so2_24h: reading("so2_twenty_four_hourly"),
            co_8h_max: reading("co_eight_hour_max"),
            timestamp,
            updated_at,
        }));
    }

    Ok(finish(collector, timestamp))
}

fn parse_stamp(value: Option<&str>) -> Option<UtcDateTime> {
    value.and_then(|stamp| UtcDateTime::parse_local(stamp).ok())
}

#[derive(Debug, Deserialize)]
struct UvPage {
    records: Vec<UvRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UvRecord {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    updated_timestamp: Option<String>,
    #[serde(default)]
    index: Vec<UvIndexEntry>,
}

#[derive(Debug, Deserialize)]
struct UvIndexEntry {
    #[serde(default)]
    hour: Option<String>,
    #[serde(default)]
    value: Option<Value>,
}

/// Hourly readings of the latest daily record, oldest hour first.
pub(super) fn uv(pages: &[Value]) -> Result<Normalized, SourceError> {
    let pages: Vec<UvPage> = decode_pages(pages, "uv index")?;
    let records: Vec<&UvRecord> = pages.iter().flat_map(|page| &page.records).collect();
    let Some(record) = latest(&records, |record| parse_stamp(record.timestamp.as_deref())).copied() else {
        return Ok(finish(Collector::<UvReading>::new(), None));
    };

    let updated_at = parse_stamp(record.updated_timestamp.as_deref());
    let mut collector = Collector::new();
    let mut readings = Vec::with_capacity(record.index.len());
    for entry in &record.index {
        let Some(hour) = parse_stamp(entry.hour.as_deref()) else {
            collector.push(Err("hour"));
            continue;
        };
        readings.push((hour, number(entry.value.as_ref())));
    }
    readings.sort_by_key(|(hour, _)| *hour);
    readings.dedup_by_key(|(hour, _)| *hour);

    for (hour, value) in readings {
        let key = RecordKey::new(hour.format_rfc3339()).map_err(|_| "hour");
        collector.push(key.map(|key| UvReading {
            key,
            hour,
            value,
            date: record.date.clone(),
            updated_at,
        }));
    }

    Ok(finish(collector, parse_stamp(record.timestamp.as_deref())))
}
