//! Reprojection of points between spatial references.
//!
//! [`Projector`] is the seam to a projection library. The
//! GDAL/OSR backed implementation is
//! [`GdalProjector`][crate::dataset::GdalProjector];
//! [`WebMercator`] is a dependency free implementation
//! handling only geographic WGS84 and web mercator.

use anyhow::bail;

use crate::Result;

/// EPSG code for web mercator projection CRS.
pub const WEB_MERCATOR_EPSG: u32 = 3857;

/// EPSG code for geographic WGS84.
pub const WGS84_EPSG: u32 = 4326;

/// Semi-major axis of the web mercator sphere, in meters.
pub const EARTH_RADIUS: f64 = 6378137.;

/// Extent of web mercator coordinates on either axis.
pub const MAX_COORD: f64 = 20037508.342789244;

/// A planar `(x, y)` point.
pub type Point = (f64, f64);

pub trait Projector {
    /// Reproject `pts` in place from the `from` spatial
    /// reference to the `to` spatial reference. Both are
    /// CRS strings as stored in
    /// [`RasterInfo::crs`][crate::raster::RasterInfo].
    fn project(&self, from: &str, to: &str, pts: &mut [Point]) -> Result<()>;

    /// Planar distance between two projected points.
    fn distance(&self, a: Point, b: Point) -> f64 {
        (a.0 - b.0).hypot(a.1 - b.1)
    }
}

pub fn epsg(code: u32) -> String {
    format!("EPSG:{}", code)
}

/// The code of an authority string: the part after the
/// last `:`, eg. `32633` for `EPSG:32633`.
pub fn crs_code(crs: &str) -> &str {
    crs.rsplit(':').next().unwrap_or(crs).trim()
}

/// The EPSG code of `crs` if it is of the form `EPSG:<code>`
/// (or `urn:ogc:def:crs:EPSG::<code>`).
pub fn epsg_code(crs: &str) -> Option<u32> {
    if !crs.to_ascii_uppercase().contains("EPSG:") {
        return None;
    }
    crs_code(crs).parse().ok()
}

/// Web mercator `y` of the given latitude (degrees).
pub fn mercator_y(lat: f64) -> f64 {
    EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.).tan().ln()
}

/// Spherical web mercator math for EPSG:4326 and EPSG:3857.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl WebMercator {
    fn forward((lng, lat): Point) -> Point {
        (EARTH_RADIUS * lng.to_radians(), mercator_y(lat))
    }

    fn inverse((x, y): Point) -> Point {
        let lng = (x / EARTH_RADIUS).to_degrees();
        let lat = (2. * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
        (lng, lat)
    }
}

impl Projector for WebMercator {
    fn project(&self, from: &str, to: &str, pts: &mut [Point]) -> Result<()> {
        let convert: fn(Point) -> Point = match (epsg_code(from), epsg_code(to)) {
            (Some(a), Some(b)) if a == b => return Ok(()),
            (Some(WGS84_EPSG), Some(WEB_MERCATOR_EPSG)) => WebMercator::forward,
            (Some(WEB_MERCATOR_EPSG), Some(WGS84_EPSG)) => WebMercator::inverse,
            _ => bail!("web mercator: cannot project from {} to {}", from, to),
        };
        for pt in pts.iter_mut() {
            *pt = convert(*pt);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes() {
        assert_eq!(crs_code("EPSG:32633"), "32633");
        assert_eq!(epsg_code("EPSG:4326"), Some(4326));
        assert_eq!(epsg_code("urn:ogc:def:crs:EPSG::3857"), Some(3857));
        assert_eq!(epsg_code("PROJCS[\"unnamed\"]"), None);
        assert_eq!(epsg(3857), "EPSG:3857");
    }

    #[test]
    fn mercator_extent() {
        let mut pts = [(180., 0.), (-180., 0.)];
        WebMercator.project("EPSG:4326", "EPSG:3857", &mut pts).unwrap();
        assert!((pts[0].0 - MAX_COORD).abs() < 1e-6);
        assert!((pts[1].0 + MAX_COORD).abs() < 1e-6);
        assert!(pts[0].1.abs() < 1e-6);

        // 85.0511 deg. is the latitude at which the map is square.
        assert!((mercator_y(85.05112878) - MAX_COORD).abs() < 1.);
    }

    #[test]
    fn inverse_round_trip() {
        let mut pts = [(12.5, 41.9), (-70.6, -33.4)];
        let orig = pts;
        WebMercator.project("EPSG:4326", "EPSG:3857", &mut pts).unwrap();
        WebMercator.project("EPSG:3857", "EPSG:4326", &mut pts).unwrap();
        for (a, b) in pts.iter().zip(orig.iter()) {
            assert!((a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9);
        }
    }

    #[test]
    fn unsupported_crs() {
        let mut pts = [(0., 0.)];
        assert!(WebMercator.project("EPSG:32633", "EPSG:3857", &mut pts).is_err());
        assert!(WebMercator.project("EPSG:32633", "EPSG:32633", &mut pts).is_ok());
    }
}
