//! CKAN datastore records (`result.records`) for the reference datasets.

use serde_json::{Map, Value};

use super::values::{integer, number, text, year};
use super::{shape_error, Collector, Normalized};
use crate::domain::{CarparkInfo, GraduateOutcome, Record, RecordKey, ResaleTransaction};
use crate::SourceError;

type RawRecord = Map<String, Value>;

fn records(pages: &[Value]) -> Result<impl Iterator<Item = Option<&RawRecord>>, SourceError> {
    let mut arrays = Vec::with_capacity(pages.len());
    for (page_index, page) in pages.iter().enumerate() {
        let array = page
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| shape_error(format!("datastore page {page_index} has no 'records' array")))?;
        arrays.push(array);
    }
    Ok(arrays.into_iter().flatten().map(Value::as_object))
}

fn key_from(record: &RawRecord, field: &'static str) -> Result<RecordKey, &'static str> {
    text(record.get(field))
        .and_then(|value| RecordKey::new(value).ok())
        .ok_or(field)
}

fn finish<R: Record>(collector: Collector<R>) -> Normalized {
    Normalized {
        records: R::into_set(collector.records),
        rejected: collector.rejected,
        source_timestamp: None,
    }
}

pub(super) fn carpark_info(pages: &[Value]) -> Result<Normalized, SourceError> {
    let mut collector = Collector::new();
    for raw in records(pages)? {
        collector.push(raw.ok_or("car_park_no").and_then(|record| {
            let car_park_no = key_from(record, "car_park_no")?;
            Ok(CarparkInfo {
                car_park_no: RecordKey::new(car_park_no.as_str().to_ascii_uppercase())
                    .map_err(|_| "car_park_no")?,
                address: text(record.get("address")),
                x_coord: number(record.get("x_coord")),
                y_coord: number(record.get("y_coord")),
                car_park_type: text(record.get("car_park_type")),
                type_of_parking_system: text(record.get("type_of_parking_system")),
                short_term_parking: text(record.get("short_term_parking")),
                free_parking: text(record.get("free_parking")),
                night_parking: text(record.get("night_parking")),
                car_park_decks: number(record.get("car_park_decks")),
                gantry_height: number(record.get("gantry_height")),
                car_park_basement: text(record.get("car_park_basement")),
            })
        }));
    }
    Ok(finish(collector))
}

pub(super) fn graduates(pages: &[Value]) -> Result<Normalized, SourceError> {
    let mut collector = Collector::new();
    for raw in records(pages)? {
        collector.push(raw.ok_or("degree").and_then(graduate));
    }
    Ok(finish(collector))
}

fn graduate(record: &RawRecord) -> Result<GraduateOutcome, &'static str> {
    let year = year(record.get("year")).ok_or("year")?;
    let university = text(record.get("university")).ok_or("university")?;
    let degree = text(record.get("degree")).ok_or("degree")?;
    let school = text(record.get("school"));
    let key = RecordKey::new(GraduateOutcome::compose_key(
        year,
        &university,
        school.as_deref(),
        &degree,
    ))
    .map_err(|_| "degree")?;

    Ok(GraduateOutcome {
        key,
        year,
        university,
        school,
        degree,
        employment_rate_overall: number(record.get("employment_rate_overall")),
        employment_rate_ft_perm: number(record.get("employment_rate_ft_perm")),
        basic_monthly_mean: number(record.get("basic_monthly_mean")),
        basic_monthly_median: number(record.get("basic_monthly_median")),
        gross_monthly_mean: number(record.get("gross_monthly_mean")),
        gross_monthly_median: number(record.get("gross_monthly_median")),
        gross_monthly_p25: number(record.get("gross_mthly_25_percentile")),
        gross_monthly_p75: number(record.get("gross_mthly_75_percentile")),
    })
}

pub(super) fn resale(pages: &[Value]) -> Result<Normalized, SourceError> {
    let mut collector = Collector::new();
    for raw in records(pages)? {
        collector.push(raw.ok_or("_id").and_then(resale_transaction));
    }
    Ok(finish(collector))
}

fn resale_transaction(record: &RawRecord) -> Result<ResaleTransaction, &'static str> {
    let id = key_from(record, "_id")?;
    let month = text(record.get("month"));
    let sale_year = year(record.get("month"));
    let lease_commence_year = integer(record.get("lease_commence_date"))
        .and_then(|year| i32::try_from(year).ok());

    Ok(ResaleTransaction {
        id,
        month,
        sale_year,
        town: text(record.get("town")),
        flat_type: text(record.get("flat_type")),
        block: text(record.get("block")),
        street_name: text(record.get("street_name")),
        storey_range: text(record.get("storey_range")),
        floor_area_sqm: number(record.get("floor_area_sqm")),
        flat_model: text(record.get("flat_model")),
        lease_commence_year,
        remaining_lease: text(record.get("remaining_lease")),
        resale_price: number(record.get("resale_price")),
        lease_remaining_years: ResaleTransaction::compute_lease_remaining(
            sale_year,
            lease_commence_year,
        ),
    })
}
