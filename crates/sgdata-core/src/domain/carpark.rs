use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, Record, RecordKey, UtcDateTime};

/// Static HDB carpark information.
///
/// Coordinates are SVY21 projected metres as published, not WGS84.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarparkInfo {
    pub car_park_no: RecordKey,
    pub address: Option<String>,
    pub x_coord: Option<f64>,
    pub y_coord: Option<f64>,
    pub car_park_type: Option<String>,
    pub type_of_parking_system: Option<String>,
    pub short_term_parking: Option<String>,
    pub free_parking: Option<String>,
    pub night_parking: Option<String>,
    pub car_park_decks: Option<f64>,
    pub gantry_height: Option<f64>,
    pub car_park_basement: Option<String>,
}

impl Record for CarparkInfo {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("car_park_no"),
        FieldSpec::text("address"),
        FieldSpec::text("car_park_type"),
        FieldSpec::text("type_of_parking_system"),
        FieldSpec::text("short_term_parking"),
        FieldSpec::text("free_parking"),
        FieldSpec::text("night_parking"),
        FieldSpec::text("car_park_basement"),
        FieldSpec::number("x_coord"),
        FieldSpec::number("y_coord"),
        FieldSpec::number("car_park_decks"),
        FieldSpec::number("gantry_height"),
    ];

    fn key(&self) -> &RecordKey {
        &self.car_park_no
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "car_park_no" => FieldValue::Text(self.car_park_no.as_str()),
            "address" => FieldValue::text(self.address.as_deref()),
            "car_park_type" => FieldValue::text(self.car_park_type.as_deref()),
            "type_of_parking_system" => FieldValue::text(self.type_of_parking_system.as_deref()),
            "short_term_parking" => FieldValue::text(self.short_term_parking.as_deref()),
            "free_parking" => FieldValue::text(self.free_parking.as_deref()),
            "night_parking" => FieldValue::text(self.night_parking.as_deref()),
            "car_park_basement" => FieldValue::text(self.car_park_basement.as_deref()),
            "x_coord" => FieldValue::number(self.x_coord),
            "y_coord" => FieldValue::number(self.y_coord),
            "car_park_decks" => FieldValue::number(self.car_park_decks),
            "gantry_height" => FieldValue::number(self.gantry_height),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(CarparkInfo);
}

/// Lot counts for one lot type (`C` cars, `H` heavy vehicles, `Y` motorcycles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAvailability {
    pub lot_type: String,
    pub total_lots: Option<u32>,
    pub lots_available: Option<u32>,
}

/// Live availability of one carpark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarparkAvailability {
    pub carpark_number: RecordKey,
    pub update_datetime: Option<UtcDateTime>,
    pub lots: Vec<LotAvailability>,
}

impl CarparkAvailability {
    /// Sum over lot types that report a total; unavailable when none do.
    pub fn total_lots(&self) -> Option<u32> {
        sum_defined(self.lots.iter().map(|lot| lot.total_lots))
    }

    pub fn lots_available(&self) -> Option<u32> {
        sum_defined(self.lots.iter().map(|lot| lot.lots_available))
    }

    /// Available share of total lots in percent, over lot types reporting both counts.
    pub fn available_pct(&self) -> Option<f64> {
        let (available, total) = self
            .lots
            .iter()
            .filter_map(|lot| lot.lots_available.zip(lot.total_lots))
            .fold((0_u32, 0_u32), |(available, total), (lot_available, lot_total)| {
                (available.saturating_add(lot_available), total.saturating_add(lot_total))
            });
        (total > 0).then(|| f64::from(available) * 100.0 / f64::from(total))
    }
}

fn sum_defined(values: impl Iterator<Item = Option<u32>>) -> Option<u32> {
    values
        .flatten()
        .fold(None, |acc: Option<u32>, value| Some(acc.unwrap_or(0).saturating_add(value)))
}

impl Record for CarparkAvailability {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("carpark_number"),
        FieldSpec::number("total_lots"),
        FieldSpec::number("lots_available"),
        FieldSpec::number("available_pct"),
    ];

    fn key(&self) -> &RecordKey {
        &self.carpark_number
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "carpark_number" => FieldValue::Text(self.carpark_number.as_str()),
            "total_lots" => FieldValue::number(self.total_lots().map(f64::from)),
            "lots_available" => FieldValue::number(self.lots_available().map(f64::from)),
            "available_pct" => FieldValue::number(self.available_pct()),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(CarparkAvailability);
}
