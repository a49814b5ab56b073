//! GeoJSON documents behind the dengue cluster download.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::values::{text, unsigned};
use super::{shape_error, Collector, Normalized};
use crate::domain::{DengueCluster, GeoPoint, Geometry, Record, RecordKey};
use crate::SourceError;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Document {
    FeatureCollection {
        #[serde(default)]
        features: Vec<Feature>,
    },
    Feature(Feature),
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

pub(super) fn dengue(pages: &[Value]) -> Result<Normalized, SourceError> {
    let page = pages
        .first()
        .ok_or_else(|| shape_error("no dengue cluster document received"))?;
    let document = Document::deserialize(page)
        .map_err(|error| shape_error(format!("expected a GeoJSON Feature or FeatureCollection: {error}")))?;
    let features = match document {
        Document::FeatureCollection { features } => features,
        Document::Feature(feature) => vec![feature],
    };

    let mut collector = Collector::new();
    for feature in &features {
        collector.push(cluster(feature));
    }
    Ok(Normalized {
        records: DengueCluster::into_set(collector.records),
        rejected: collector.rejected,
        source_timestamp: None,
    })
}

fn cluster(feature: &Feature) -> Result<DengueCluster, &'static str> {
    let properties = feature.properties.as_ref().ok_or("LOCALITY")?;
    let locality = text(properties.get("LOCALITY"))
        .or_else(|| text(properties.get("Name")))
        .and_then(|locality| RecordKey::new(locality).ok())
        .ok_or("LOCALITY")?;

    Ok(DengueCluster {
        locality,
        case_size: unsigned(properties.get("CASE_SIZE")),
        geometry: feature.geometry.as_ref().and_then(geometry),
    })
}

fn geometry(raw: &RawGeometry) -> Option<Geometry> {
    match raw.kind.as_str() {
        "Point" => position(&raw.coordinates).map(Geometry::Point),
        "Polygon" => Some(Geometry::Polygon {
            rings: rings(&raw.coordinates),
        }),
        "MultiPolygon" => Some(Geometry::Polygon {
            rings: raw
                .coordinates
                .as_array()
                .map(|polygons| polygons.iter().flat_map(rings).collect())
                .unwrap_or_default(),
        }),
        other => {
            log::debug!("ignoring unsupported geometry type {other}");
            None
        }
    }
}

fn rings(polygon: &Value) -> Vec<Vec<GeoPoint>> {
    polygon
        .as_array()
        .map(|rings| {
            rings
                .iter()
                .filter_map(Value::as_array)
                .map(|ring| ring.iter().filter_map(position).collect())
                .collect()
        })
        .unwrap_or_default()
}

fn position(value: &Value) -> Option<GeoPoint> {
    let coordinates: Vec<f64> = value.as_array()?.iter().filter_map(Value::as_f64).collect();
    GeoPoint::from_position(&coordinates)
}
