//! Conversions between pixel and geo coordinates of a
//! raster.
//!
//! Geo coordinates are expressed in the units of the
//! raster's CRS, and are named `lat` (for `y`) and `lng`
//! (for `x`) irrespective of whether the CRS is geographic.

use nalgebra::Point2;
use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TileError;
use crate::geometry::{snap, transform_from_gdal, GeoTransform, RasterBounds};
use crate::raster::RasterInfo;

/// A pixel position. For pixel reads, `row < height` and
/// `col < width`; grid corners may equal the dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub row: usize,
    pub col: usize,
}

impl PixelCoord {
    pub fn new(row: usize, col: usize) -> Self {
        PixelCoord { row, col }
    }
}

impl From<(usize, usize)> for PixelCoord {
    fn from((row, col): (usize, usize)) -> Self {
        PixelCoord { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub lat: f64,
    pub lng: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lng: f64) -> Self {
        GeoCoord { lat, lng }
    }

    /// `(lng, lat)`: the `(x, y)` order of GeoJSON positions.
    pub fn lng_lat(&self) -> (f64, f64) {
        (self.lng, self.lat)
    }
}

/// Map the corner of pixel `(row, col)` through the affine
/// transform. Not clamped.
pub fn pixel_to_geo(transform: &GeoTransform, row: usize, col: usize) -> GeoCoord {
    let pt = transform_from_gdal(transform).transform_point(&Point2::new(col as f64, row as f64));
    GeoCoord::new(pt.y, pt.x)
}

/// Whether `(lat, lng)` lies within the (normalized) bounds,
/// boundary included.
pub fn is_inside(bounds: &RasterBounds, lat: f64, lng: f64) -> bool {
    lng >= bounds.min_x() && lng <= bounds.max_x() && lat >= bounds.min_y() && lat <= bounds.max_y()
}

/// Clamp each axis of `(lat, lng)` to the bounds. Every
/// clamped axis is logged.
pub fn clamp_to_bounds(bounds: &RasterBounds, lat: f64, lng: f64) -> GeoCoord {
    let mut out = GeoCoord::new(lat, lng);

    if lng < bounds.min_x() {
        warn!(lng, min = bounds.min_x(), "longitude below raster bounds, clamping");
        out.lng = bounds.min_x();
    } else if lng > bounds.max_x() {
        warn!(lng, max = bounds.max_x(), "longitude above raster bounds, clamping");
        out.lng = bounds.max_x();
    }

    if lat < bounds.min_y() {
        warn!(lat, min = bounds.min_y(), "latitude below raster bounds, clamping");
        out.lat = bounds.min_y();
    } else if lat > bounds.max_y() {
        warn!(lat, max = bounds.max_y(), "latitude above raster bounds, clamping");
        out.lat = bounds.max_y();
    }

    out
}

/// Map `(lat, lng)` to the pixel containing it.
///
/// Positions are measured from the raster's own bound at
/// pixel index 0 of each axis (`top` and `left` as read from
/// the raster), using a signed resolution so rasters of any
/// axis orientation are handled. Points on the far edge
/// belong to the last pixel.
pub fn geo_to_pixel(info: &RasterInfo, lat: f64, lng: f64) -> Result<PixelCoord, TileError> {
    let b = &info.bounds;
    if !is_inside(b, lat, lng) {
        return Err(TileError::OutOfBounds { lat, lng });
    }

    let x_res = (b.right - b.left) / info.width as f64;
    let y_res = (b.top - b.bottom) / info.height as f64;

    let col = pixel_index((lng - b.left) / x_res, info.width);
    let row = pixel_index((b.top - lat) / y_res, info.height);
    Ok(PixelCoord::new(row, col))
}

#[inline]
fn pixel_index(pos: f64, dim: usize) -> usize {
    let pos = snap(pos).max(0.).floor() as usize;
    pos.min(dim.saturating_sub(1))
}

/// Map a ring of pixel corners to `(lng, lat)` positions,
/// clamping positions that fall marginally outside the
/// raster bounds.
pub fn pixel_ring_to_geo(info: &RasterInfo, ring: &[PixelCoord]) -> Vec<(f64, f64)> {
    ring.iter()
        .map(|px| {
            let geo = pixel_to_geo(&info.transform, px.row, px.col);
            if is_inside(&info.bounds, geo.lat, geo.lng) {
                geo
            } else {
                clamp_to_bounds(&info.bounds, geo.lat, geo.lng)
            }
            .lng_lat()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::*;

    fn utm_raster() -> RasterInfo {
        RasterInfo::new(
            (1200, 800),
            [500_000., 0.5, 0., 4_200_000., 0., -0.5],
            "EPSG:32633",
            3,
        )
    }

    fn wgs84_raster() -> RasterInfo {
        RasterInfo::new((360, 180), [10., 0.01, 0., 50., 0., -0.01], "EPSG:4326", 1)
    }

    #[test]
    fn pixel_to_geo_applies_transform() {
        let info = utm_raster();
        assert_eq!(pixel_to_geo(&info.transform, 0, 0), GeoCoord::new(4_200_000., 500_000.));
        assert_eq!(
            pixel_to_geo(&info.transform, 800, 1200),
            GeoCoord::new(4_199_600., 500_600.)
        );
    }

    #[test]
    fn inside_uses_normalized_bounds() {
        let flipped = RasterBounds::new(10., 5., 0., 0.);
        assert!(is_inside(&flipped, 2.5, 5.));
        assert!(is_inside(&flipped, 5., 10.));
        assert!(!is_inside(&flipped, 5.1, 5.));
        assert!(!is_inside(&flipped, 2., -0.1));
    }

    #[test]
    fn clamps_each_axis() {
        let b = RasterBounds::new(0., 0., 10., 5.);
        assert_eq!(clamp_to_bounds(&b, 6., 4.), GeoCoord::new(5., 4.));
        assert_eq!(clamp_to_bounds(&b, -1., 11.), GeoCoord::new(0., 10.));
        assert_eq!(clamp_to_bounds(&b, 1., 1.), GeoCoord::new(1., 1.));
    }

    #[test]
    fn geo_to_pixel_outside_fails() {
        let info = wgs84_raster();
        let top = info.bounds.max_y();
        match geo_to_pixel(&info, top + 0.001, 11.) {
            Err(TileError::OutOfBounds { lat, lng }) => {
                assert_eq!(lat, top + 0.001);
                assert_eq!(lng, 11.);
            }
            other => panic!("expected out of bounds, got {:?}", other),
        }
        assert!(geo_to_pixel(&info, 49., info.bounds.min_x() - 0.001).is_err());
    }

    #[test]
    fn geo_to_pixel_at_corners() {
        let info = wgs84_raster();
        assert_eq!(geo_to_pixel(&info, 50., 10.).unwrap(), PixelCoord::new(0, 0));
        let (bottom, right) = (info.bounds.bottom, info.bounds.right);
        assert_eq!(geo_to_pixel(&info, bottom, right).unwrap(), PixelCoord::new(179, 359));
    }

    #[test]
    fn pixel_geo_round_trip() {
        let mut rng = thread_rng();
        for info in &[utm_raster(), wgs84_raster()] {
            for _ in 0..1000 {
                let row = rng.gen_range(0, info.height);
                let col = rng.gen_range(0, info.width);
                let geo = pixel_to_geo(&info.transform, row, col);
                let px = geo_to_pixel(info, geo.lat, geo.lng).unwrap();
                assert_eq!(px, PixelCoord::new(row, col));
            }
        }
    }

    #[test]
    fn south_up_round_trip() {
        let info = RasterInfo::new((20, 10), [0., 1., 0., 0., 0., 1.], "EPSG:3857", 1);
        for row in 0..10 {
            for col in 0..20 {
                let geo = pixel_to_geo(&info.transform, row, col);
                assert_eq!(
                    geo_to_pixel(&info, geo.lat, geo.lng).unwrap(),
                    PixelCoord::new(row, col)
                );
            }
        }
    }

    #[test]
    fn ring_is_clamped() {
        let mut info = utm_raster();
        // Declared bounds marginally smaller than the grid.
        info.bounds.right -= 1e-6;
        let ring: Vec<PixelCoord> = vec![(0, 0).into(), (800, 1200).into()];
        let geo = pixel_ring_to_geo(&info, &ring);
        assert_eq!(geo[0], (500_000., 4_200_000.));
        assert_eq!(geo[1], (500_600. - 1e-6, 4_199_600.));
    }
}
