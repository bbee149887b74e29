use serde::{Deserialize, Serialize};

use crate::{QuakeReplayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One independently drawable boundary line.
pub type Polyline = Vec<GeoPoint>;

/// Plate boundary lines in source order. Lines are never joined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayGeometry {
    polylines: Vec<Polyline>,
}

/// Parallel coordinate arrays for line renderers. `None` marks a break, so
/// the end of one polyline is never connected to the start of the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatLines {
    pub latitudes: Vec<Option<f64>>,
    pub longitudes: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    #[serde(other)]
    Unsupported,
}

impl OverlayGeometry {
    pub fn new(polylines: Vec<Polyline>) -> Self {
        Self { polylines }
    }

    /// Parses a GeoJSON feature collection. `LineString` features become one
    /// polyline each, `MultiLineString` features one per member line; every
    /// other geometry is skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let collection: FeatureCollection = serde_json::from_str(raw)?;
        let mut polylines = Vec::new();
        let mut skipped = 0usize;

        for (index, feature) in collection.features.into_iter().enumerate() {
            match feature.geometry {
                Some(Geometry::LineString { coordinates }) => {
                    polylines.push(to_polyline(index, &coordinates)?);
                }
                Some(Geometry::MultiLineString { coordinates }) => {
                    for line in &coordinates {
                        polylines.push(to_polyline(index, line)?);
                    }
                }
                Some(Geometry::Unsupported) | None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, "ignored non-line boundary features");
        }
        Ok(Self { polylines })
    }

    pub fn polylines(&self) -> &[Polyline] {
        &self.polylines
    }

    pub fn len(&self) -> usize {
        self.polylines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polylines.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.polylines.iter().map(Vec::len).sum()
    }

    pub fn flatten(&self) -> FlatLines {
        let capacity = self.point_count() + self.polylines.len();
        let mut flat = FlatLines {
            latitudes: Vec::with_capacity(capacity),
            longitudes: Vec::with_capacity(capacity),
        };
        for line in &self.polylines {
            for point in line {
                flat.latitudes.push(Some(point.latitude));
                flat.longitudes.push(Some(point.longitude));
            }
            flat.latitudes.push(None);
            flat.longitudes.push(None);
        }
        flat
    }
}

/// GeoJSON positions are `[lon, lat, ...]`; anything past the first two
/// numbers is ignored.
fn to_polyline(feature: usize, positions: &[Vec<f64>]) -> Result<Polyline> {
    positions
        .iter()
        .map(|position| match position.as_slice() {
            [longitude, latitude, ..] => Ok(GeoPoint {
                latitude: *latitude,
                longitude: *longitude,
            }),
            _ => Err(QuakeReplayError::Geometry(format!(
                "feature {feature} has a position with {} coordinate(s)",
                position.len()
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "properties": { "Name": "AF-AN" },
              "geometry": { "type": "LineString",
                            "coordinates": [[-0.4, -54.8], [0.1, -54.6], [0.5, -54.4]] } },
            { "type": "Feature", "properties": {},
              "geometry": { "type": "Point", "coordinates": [1.0, 2.0] } },
            { "type": "Feature", "properties": {}, "geometry": null },
            { "type": "Feature", "properties": { "Name": "PA-NA" },
              "geometry": { "type": "MultiLineString",
                            "coordinates": [[[170.0, 50.0], [171.0, 51.0, 12.5]],
                                            [[-179.0, 51.5], [-178.0, 51.0]]] } }
        ]
    }"#;

    #[test]
    fn each_line_becomes_its_own_polyline() {
        let geometry = OverlayGeometry::parse(BOUNDARIES).unwrap();

        assert_eq!(geometry.len(), 3);
        assert_eq!(geometry.point_count(), 7);
        assert_eq!(
            geometry.polylines()[0][0],
            GeoPoint {
                latitude: -54.8,
                longitude: -0.4
            }
        );
        assert_eq!(geometry.polylines()[1][1].latitude, 51.0);
        assert_eq!(geometry.polylines()[2][0].longitude, -179.0);
    }

    #[test]
    fn flatten_breaks_after_every_polyline() {
        let flat = OverlayGeometry::parse(BOUNDARIES).unwrap().flatten();

        assert_eq!(flat.latitudes.len(), 10);
        assert_eq!(flat.longitudes.len(), 10);
        let breaks: Vec<_> = flat
            .latitudes
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_none())
            .map(|(index, _)| index)
            .collect();
        assert_eq!(breaks, [3, 6, 9]);
        assert_eq!(flat.longitudes[4], Some(170.0));
    }

    #[test]
    fn short_positions_are_rejected() {
        let raw = r#"{ "features": [ { "geometry":
            { "type": "LineString", "coordinates": [[1.0, 2.0], [3.0]] } } ] }"#;

        let err = OverlayGeometry::parse(raw).unwrap_err();
        assert!(matches!(err, QuakeReplayError::Geometry(_)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = OverlayGeometry::parse("{ not json").unwrap_err();
        assert!(matches!(err, QuakeReplayError::Json(_)));
    }

    #[test]
    fn empty_collection_yields_no_lines() {
        let geometry = OverlayGeometry::parse(r#"{ "type": "FeatureCollection", "features": [] }"#)
            .unwrap();
        assert!(geometry.is_empty());
        assert_eq!(geometry.flatten(), FlatLines::default());
    }
}
