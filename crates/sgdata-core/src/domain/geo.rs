use serde::{Deserialize, Serialize};

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds a point from a GeoJSON `[longitude, latitude, ...]` position.
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [longitude, latitude, ..] if longitude.is_finite() && latitude.is_finite() => {
                Some(Self::new(*latitude, *longitude))
            }
            _ => None,
        }
    }
}

/// Canonical point-or-polygon shape.
///
/// Multi-polygons are flattened into one ring list, so every polygon-like
/// input ends up as `Polygon`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point(GeoPoint),
    Polygon { rings: Vec<Vec<GeoPoint>> },
}

impl Geometry {
    /// Mean of the distinct vertices of every ring.
    pub fn centroid(&self) -> Option<GeoPoint> {
        match self {
            Self::Point(point) => Some(*point),
            Self::Polygon { rings } => {
                let vertices = rings.iter().flat_map(|ring| open_ring(ring));
                let (count, latitude, longitude) = vertices.fold(
                    (0_usize, 0.0_f64, 0.0_f64),
                    |(count, latitude, longitude), point| {
                        (count + 1, latitude + point.latitude, longitude + point.longitude)
                    },
                );
                (count > 0).then(|| {
                    GeoPoint::new(latitude / count as f64, longitude / count as f64)
                })
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::Polygon { rings } => rings.iter().map(Vec::len).sum(),
        }
    }
}

// GeoJSON rings repeat their first vertex at the end.
fn open_ring(ring: &[GeoPoint]) -> &[GeoPoint] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() > 1 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_longitude_first() {
        let point = GeoPoint::from_position(&[103.8, 1.35]).expect("valid position");
        assert_eq!(point, GeoPoint::new(1.35, 103.8));
        assert!(GeoPoint::from_position(&[103.8]).is_none());
    }

    #[test]
    fn polygon_centroid_ignores_closing_vertex() {
        let ring = vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 2.0),
            GeoPoint::new(2.0, 2.0),
            GeoPoint::new(2.0, 0.0),
            GeoPoint::new(0.0, 0.0),
        ];
        let geometry = Geometry::Polygon { rings: vec![ring] };

        assert_eq!(geometry.centroid(), Some(GeoPoint::new(1.0, 1.0)));
    }

    #[test]
    fn empty_polygon_has_no_centroid() {
        let geometry = Geometry::Polygon { rings: Vec::new() };
        assert_eq!(geometry.centroid(), None);
    }
}
