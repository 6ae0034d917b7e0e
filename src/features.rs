//! GeoJSON packaging of tile and point geometries.
//!
//! Collections carry their spatial reference as a named
//! `crs` member (`urn:ogc:def:crs:EPSG::<code>`), as
//! understood by GDAL and most GeoJSON readers.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde_json::json;

use crate::projection::crs_code;
use crate::Result;

/// OGC URN naming the CRS.
pub fn crs_urn(crs: &str) -> String {
    format!("urn:ogc:def:crs:EPSG::{}", crs_code(crs))
}

fn collection(geometry: Value, crs: &str) -> FeatureCollection {
    let mut members = JsonObject::new();
    members.insert(
        "crs".into(),
        json!({
            "type": "name",
            "properties": { "name": crs_urn(crs) },
        }),
    );

    FeatureCollection {
        bbox: None,
        features: vec![Feature {
            bbox: None,
            geometry: Some(Geometry::new(geometry)),
            id: None,
            properties: None,
            foreign_members: None,
        }],
        foreign_members: Some(members),
    }
}

/// A collection of one polygon feature with the given
/// exterior ring of `(x, y)` positions.
pub fn polygon_collection(ring: &[(f64, f64)], crs: &str) -> FeatureCollection {
    let ring = ring.iter().map(|&(x, y)| vec![x, y]).collect();
    collection(Value::Polygon(vec![ring]), crs)
}

/// A collection of one point feature.
pub fn point_collection(pt: (f64, f64), crs: &str) -> FeatureCollection {
    collection(Value::Point(vec![pt.0, pt.1]), crs)
}

/// The CRS name stored in the collection, if any.
pub fn collection_crs(fc: &FeatureCollection) -> Option<&str> {
    fc.foreign_members
        .as_ref()?
        .get("crs")?
        .pointer("/properties/name")?
        .as_str()
}

/// The (multi)-polygons of a collection. Fails on any other
/// geometry type.
pub fn collection_polygons(fc: &FeatureCollection) -> Result<Vec<geo::MultiPolygon<f64>>> {
    fc.features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(|geom| -> Result<_> {
            let geom: geo::Geometry<f64> = geom
                .value
                .clone()
                .try_into()
                .with_context(|| "converting GeoJSON geometry")?;
            use geo::Geometry::{MultiPolygon, Polygon};
            Ok(match geom {
                Polygon(p) => p.into(),
                MultiPolygon(p) => p,
                _ => bail!("geometry is not a (multi)-polygon"),
            })
        })
        .collect()
}

pub fn write_collection(path: &Path, fc: &FeatureCollection) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let buf = std::io::BufWriter::with_capacity(0x10000, file);
    Ok(serde_json::to_writer(buf, fc)?)
}

pub fn read_collection(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const RING: [(f64, f64); 5] = [(0., 10.), (5., 10.), (5., 0.), (0., 0.), (0., 10.)];

    #[test]
    fn polygon_collection_format() {
        let fc = polygon_collection(&RING, "EPSG:32633");
        let json = serde_json::to_value(&fc).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::32633");
        assert_eq!(json["features"][0]["geometry"]["type"], "Polygon");
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0][1], json!([5., 10.]));
        assert_eq!(collection_crs(&fc), Some("urn:ogc:def:crs:EPSG::32633"));
    }

    #[test]
    fn polygons_from_collection() {
        let fc = polygon_collection(&RING, "EPSG:4326");
        let polys = collection_polygons(&fc).unwrap();
        assert_eq!(polys.len(), 1);

        use geo::BoundingRect;
        let rect = polys[0].bounding_rect().unwrap();
        assert_eq!(rect.min().x_y(), (0., 0.));
        assert_eq!(rect.max().x_y(), (5., 10.));
    }

    #[test]
    fn points_are_not_polygons() {
        let fc = point_collection((1., 2.), "EPSG:4326");
        assert!(collection_polygons(&fc).is_err());
    }

    #[test]
    fn write_read() -> Result<()> {
        let tmp_dir = TempDir::new("geotiles_test")?;
        let path = tmp_dir.path().join("aoi.geojson");
        let fc = polygon_collection(&RING, "EPSG:3857");
        write_collection(&path, &fc)?;
        assert_eq!(read_collection(&path)?, fc);
        Ok(())
    }
}
