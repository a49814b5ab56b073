use serde::{Deserialize, Serialize};

use crate::domain::record::record_set_variant;
use crate::domain::{FieldSpec, FieldValue, GeoPoint, Geometry, Record, RecordKey};

/// Active dengue cluster as published by NEA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DengueCluster {
    pub locality: RecordKey,
    pub case_size: Option<u32>,
    pub geometry: Option<Geometry>,
}

impl DengueCluster {
    pub fn centroid(&self) -> Option<GeoPoint> {
        self.geometry.as_ref().and_then(Geometry::centroid)
    }
}

impl Record for DengueCluster {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::text("locality"),
        FieldSpec::number("case_size"),
        FieldSpec::number("latitude"),
        FieldSpec::number("longitude"),
    ];

    fn key(&self) -> &RecordKey {
        &self.locality
    }

    fn field(&self, name: &str) -> FieldValue<'_> {
        match name {
            "locality" => FieldValue::Text(self.locality.as_str()),
            "case_size" => FieldValue::number(self.case_size.map(f64::from)),
            "latitude" => FieldValue::number(self.centroid().map(|point| point.latitude)),
            "longitude" => FieldValue::number(self.centroid().map(|point| point.longitude)),
            _ => FieldValue::Unavailable,
        }
    }

    record_set_variant!(Dengue);
}
