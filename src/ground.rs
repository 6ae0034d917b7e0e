//! Estimate the ground size of a pixel.
//!
//! The raster extent is measured along its four edges after
//! reprojecting them to web mercator
//! ([`EQUAL_DISTANCE_EPSG`]). Averaging opposite edges
//! accounts for scale varying slightly across the image
//! without reprojecting every pixel.

use serde_derive::Serialize;
use tracing::debug;

use crate::error::TileError;
use crate::geometry::RasterBounds;
use crate::projection::{crs_code, epsg, mercator_y, Point, Projector, WEB_MERCATOR_EPSG};
use crate::raster::{BandInfo, RasterInfo};
use crate::Result;

/// Projection in which distances are measured.
pub const EQUAL_DISTANCE_EPSG: u32 = WEB_MERCATOR_EPSG;

/// Largest latitude (degrees) for which distances are
/// computed.
pub const MAX_LATITUDE: f64 = 85.;

/// Ground size of one pixel, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelSize {
    pub y_res_m: f64,
    pub x_res_m: f64,
}

impl PixelSize {
    /// Mean of the two axes.
    pub fn mean(&self) -> f64 {
        (self.x_res_m + self.y_res_m) / 2.
    }
}

/// Compute the `(height, width)` of a pixel in meters.
///
/// Fails with [`TileError::ProjectionRange`] if any edge
/// reaches beyond [`MAX_LATITUDE`].
pub fn pixel_size_in_meters<P: Projector + ?Sized>(info: &RasterInfo, projector: &P) -> Result<PixelSize> {
    let b = &info.bounds;
    let (min_x, max_x, min_y, max_y) = (b.min_x(), b.max_x(), b.min_y(), b.max_y());

    let top = edge_length(info, projector, [(min_x, max_y), (max_x, max_y)])?;
    let bottom = edge_length(info, projector, [(min_x, min_y), (max_x, min_y)])?;
    let left = edge_length(info, projector, [(min_x, min_y), (min_x, max_y)])?;
    let right = edge_length(info, projector, [(max_x, min_y), (max_x, max_y)])?;
    debug!(top, bottom, left, right, "raster edge lengths in meters");

    let dist_x = (top + bottom) / 2.;
    let dist_y = (left + right) / 2.;

    Ok(PixelSize {
        y_res_m: dist_y / info.height as f64,
        x_res_m: dist_x / info.width as f64,
    })
}

fn edge_length<P: Projector + ?Sized>(info: &RasterInfo, projector: &P, mut edge: [Point; 2]) -> Result<f64> {
    projector.project(&info.crs, &epsg(EQUAL_DISTANCE_EPSG), &mut edge)?;

    let limit = mercator_y(MAX_LATITUDE);
    for &(_, y) in &edge {
        // Also rejects NaN.
        if !(y.abs() <= limit) {
            return Err(TileError::ProjectionRange { y, limit }.into());
        }
    }
    Ok(projector.distance(edge[0], edge[1]))
}

/// WKT polygon of the raster bounds.
pub fn bounds_polygon_wkt(bounds: &RasterBounds) -> String {
    let (l, b, r, t) = (bounds.left, bounds.bottom, bounds.right, bounds.top);
    format!(
        "POLYGON(({l} {b}, {l} {t}, {r} {t}, {r} {b}, {l} {b}))",
        l = l,
        b = b,
        r = r,
        t = t
    )
}

/// Summary of a raster, suitable for cataloguing.
#[derive(Debug, Clone, Serialize)]
pub struct RasterAttributes {
    pub bands: Vec<BandInfo>,
    pub pixel_size_m: f64,
    pub geometry: String,
    pub crs: String,
}

pub fn raster_attributes<P: Projector + ?Sized>(info: &RasterInfo, projector: &P) -> Result<RasterAttributes> {
    let pixel_size = pixel_size_in_meters(info, projector)?;
    Ok(RasterAttributes {
        bands: info.bands.clone(),
        pixel_size_m: pixel_size.mean(),
        geometry: bounds_polygon_wkt(&info.bounds),
        crs: crs_code(&info.crs).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::WebMercator;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{} != {} (tol {})", a, b, tol);
    }

    #[test]
    fn unit_pixels_in_web_mercator() {
        let info = RasterInfo::new((1000, 1000), [0., 1., 0., 1000., 0., -1.], "EPSG:3857", 1);
        let size = pixel_size_in_meters(&info, &WebMercator).unwrap();
        assert_close(size.y_res_m, 1., 1e-9);
        assert_close(size.x_res_m, 1., 1e-9);
    }

    #[test]
    fn rectangular_pixels() {
        let info = RasterInfo::new((200, 100), [1e5, 2.5, 0., 2e5, 0., -4.], "EPSG:3857", 1);
        let size = pixel_size_in_meters(&info, &WebMercator).unwrap();
        assert_close(size.x_res_m, 2.5, 1e-9);
        assert_close(size.y_res_m, 4., 1e-9);
        assert_close(size.mean(), 3.25, 1e-9);
    }

    #[test]
    fn geographic_raster() {
        // One degree square at the equator.
        let info = RasterInfo::new((100, 100), [0., 0.01, 0., 0.5, 0., -0.01], "EPSG:4326", 1);
        let size = pixel_size_in_meters(&info, &WebMercator).unwrap();
        let deg = EARTH_DEG_M / 100.;
        assert_close(size.x_res_m, deg, 1e-6);
        assert_close(size.y_res_m, deg, 10.);
    }

    const EARTH_DEG_M: f64 = crate::projection::EARTH_RADIUS * std::f64::consts::PI / 180.;

    #[test]
    fn polar_raster_is_rejected() {
        for top in &[86., 90.] {
            let info = RasterInfo::new((10, 10), [0., 0.1, 0., *top, 0., -0.1], "EPSG:4326", 1);
            let err = pixel_size_in_meters(&info, &WebMercator).unwrap_err();
            match err.downcast_ref::<TileError>() {
                Some(TileError::ProjectionRange { .. }) => {}
                other => panic!("expected projection range error, got {:?}", other),
            }
        }

        let south = RasterInfo::new((10, 10), [0., 0.1, 0., -85.5, 0., -0.1], "EPSG:4326", 1);
        assert!(pixel_size_in_meters(&south, &WebMercator).is_err());
    }

    #[test]
    fn attributes() {
        let info = RasterInfo::new((10, 10), [0., 1., 0., 10., 0., -1.], "EPSG:3857", 2);
        let attrs = raster_attributes(&info, &WebMercator).unwrap();
        assert_eq!(attrs.crs, "3857");
        assert_eq!(attrs.bands.len(), 2);
        assert_close(attrs.pixel_size_m, 1., 1e-9);
        assert_eq!(attrs.geometry, "POLYGON((0 0, 0 10, 10 10, 10 0, 0 0))");
    }
}
