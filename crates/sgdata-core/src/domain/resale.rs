use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, Record, RecordKey};
use crate::ValidationError;

/// HDB leases run 99 years from the commencement date.
pub const HDB_LEASE_YEARS: i32 = 99;

/// Flat types accepted as query filters.
pub const FLAT_TYPES: [&str; 5] = ["2 ROOM", "3 ROOM", "4 ROOM", "5 ROOM", "EXECUTIVE"];

/// Validates a caller-supplied flat type and returns its canonical form.
pub fn parse_flat_type(value: &str) -> Result<&'static str, ValidationError> {
    let normalized = value.trim().to_ascii_uppercase();
    FLAT_TYPES
        .into_iter()
        .find(|flat_type| *flat_type == normalized)
        .ok_or_else(|| ValidationError::InvalidFlatType {
            value: value.to_owned(),
        })
}

/// One HDB resale transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResaleTransaction {
    pub id: RecordKey,
    /// Registration month as published (`YYYY-MM`).
    pub month: Option<String>,
    pub sale_year: Option<i32>,
    pub town: Option<String>,
    pub flat_type: Option<String>,
    pub block: Option<String>,
    pub street_name: Option<String>,
    pub storey_range: Option<String>,
    pub floor_area_sqm: Option<f64>,
    pub flat_model: Option<String>,
    pub lease_commence_year: Option<i32>,
    pub remaining_lease: Option<String>,
    pub resale_price: Option<f64>,
    /// Whole years of lease left at the time of sale.
    pub lease_remaining_years: Option<u32>,
}

impl ResaleTransaction {
    /// `99 - (sale year - commence year)`, unavailable outside `0..=99`.
    pub fn compute_lease_remaining(sale_year: Option<i32>, commence_year: Option<i32>) -> Option<u32> {
        let remaining = HDB_LEASE_YEARS - (sale_year? - commence_year?);
        u32::try_from(remaining)
            .ok()
            .filter(|years| *years <= HDB_LEASE_YEARS.unsigned_abs())
    }

    pub fn address(&self) -> Option<String> {
        match (&self.block, &self.street_name) {
            (Some(block), Some(street)) => Some(format!("{block} {street}")),
            (None, Some(street)) => Some(street.clone()),
            (Some(block), None) => Some(block.clone()),
            (None, None) => None,
        }
    }

    pub fn price_per_sqm(&self) -> Option<f64> {
        match (self.resale_price, self.floor_area_sqm) {
            (Some(price), Some(area)) if area > 0.0 => Some(price / area),
            _ => None,
        }
    }
}

impl Record for ResaleTransaction {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("month"),
        FieldSpec::text("town"),
        FieldSpec::text("flat_type"),
        FieldSpec::text("block"),
        FieldSpec::text("street_name"),
        FieldSpec::text("storey_range"),
        FieldSpec::text("flat_model"),
        FieldSpec::text("remaining_lease"),
        FieldSpec::number("sale_year"),
        FieldSpec::number("floor_area_sqm"),
        FieldSpec::number("lease_commence_year"),
        FieldSpec::number("resale_price"),
        FieldSpec::number("lease_remaining_years"),
        FieldSpec::number("price_per_sqm"),
    ];

    fn key(&self) -> &RecordKey {
        &self.id
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "month" => FieldValue::text(self.month.as_deref()),
            "town" => FieldValue::text(self.town.as_deref()),
            "flat_type" => FieldValue::text(self.flat_type.as_deref()),
            "block" => FieldValue::text(self.block.as_deref()),
            "street_name" => FieldValue::text(self.street_name.as_deref()),
            "storey_range" => FieldValue::text(self.storey_range.as_deref()),
            "flat_model" => FieldValue::text(self.flat_model.as_deref()),
            "remaining_lease" => FieldValue::text(self.remaining_lease.as_deref()),
            "sale_year" => FieldValue::number(self.sale_year.map(f64::from)),
            "floor_area_sqm" => FieldValue::number(self.floor_area_sqm),
            "lease_commence_year" => FieldValue::number(self.lease_commence_year.map(f64::from)),
            "resale_price" => FieldValue::number(self.resale_price),
            "lease_remaining_years" => {
                FieldValue::number(self.lease_remaining_years.map(f64::from))
            }
            "price_per_sqm" => FieldValue::number(self.price_per_sqm()),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(Resale);
}
