//! Pixel and projected-space primitives shared by the
//! rest of the crate.
//!
//! Pixel space follows the GDAL conventions: `x` is the
//! column, `y` is the row, and `(0, 0)` is the outer corner
//! of the first pixel. Dimensions and offsets are always
//! `(x, y)` ordered tuples.

use geo::Rect;
use nalgebra::{Matrix3, Point2};
use serde_derive::{Deserialize, Serialize};

/// `(width, height)` of a raster or window, in pixels.
pub type RasterDims = (usize, usize);
/// `(x, y)` offset of a window, in pixels.
pub type RasterOffset = (isize, isize);
/// A window in pixel space: offset and size.
pub type RasterWindow = (RasterOffset, RasterDims);

/// 6-coefficient affine transform in GDAL order:
/// `[x0, dx/dcol, dx/drow, y0, dy/dcol, dy/drow]`.
pub type GeoTransform = [f64; 6];

/// The [`GeoTransform`] as a homogeneous matrix, mapping
/// `(col, row)` to `(x, y)`.
pub type PixelTransform = Matrix3<f64>;

/// Axis aligned rectangle in either pixel or projected space.
pub type Bounds = Rect<f64>;

/// Tolerance used when snapping computed pixel positions
/// to the integer grid.
pub const PIXEL_EPSILON: f64 = 1e-9;

pub fn transform_from_gdal(t: &GeoTransform) -> PixelTransform {
    Matrix3::new(t[1], t[2], t[0], t[4], t[5], t[3], 0., 0., 1.)
}

pub fn transform_to_gdal(t: &PixelTransform) -> GeoTransform {
    [t[(0, 2)], t[(0, 0)], t[(0, 1)], t[(1, 2)], t[(1, 0)], t[(1, 1)]]
}

/// Translate `transform` so that its origin is the pixel
/// `off` of the original raster.
pub fn transform_for_window(transform: &GeoTransform, off: RasterOffset) -> GeoTransform {
    let origin = transform_from_gdal(transform)
        .transform_point(&Point2::new(off.0 as f64, off.1 as f64));
    let mut out = *transform;
    out[0] = origin.x;
    out[3] = origin.y;
    out
}

/// Round `val` to the nearest integer if it is within
/// [`PIXEL_EPSILON`] of it; otherwise return as is.
#[inline]
pub fn snap(val: f64) -> f64 {
    let r = val.round();
    if (val - r).abs() < PIXEL_EPSILON {
        r
    } else {
        val
    }
}

/// The declared extent of a raster in projected units.
///
/// Values are stored as read from the raster; `left` need
/// not be smaller than `right`, nor `bottom` smaller than
/// `top`. Use the `min_*` / `max_*` accessors to normalize.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterBounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl RasterBounds {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        RasterBounds {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Bounds spanned by the corners `(0, 0)` and
    /// `(width, height)` of a raster.
    pub fn from_transform(t: &GeoTransform, dims: RasterDims) -> Self {
        let t = transform_from_gdal(t);
        let lt = t.transform_point(&Point2::new(0., 0.));
        let rb = t.transform_point(&Point2::new(dims.0 as f64, dims.1 as f64));
        RasterBounds::new(lt.x, rb.y, rb.x, lt.y)
    }

    pub fn min_x(&self) -> f64 {
        self.left.min(self.right)
    }
    pub fn max_x(&self) -> f64 {
        self.left.max(self.right)
    }
    pub fn min_y(&self) -> f64 {
        self.top.min(self.bottom)
    }
    pub fn max_y(&self) -> f64 {
        self.top.max(self.bottom)
    }

    /// Horizontal extent in projected units.
    pub fn width(&self) -> f64 {
        (self.right - self.left).abs()
    }

    /// Vertical extent in projected units.
    pub fn height(&self) -> f64 {
        (self.top - self.bottom).abs()
    }

    pub fn rect(&self) -> Bounds {
        Rect::new((self.left, self.bottom), (self.right, self.top))
    }
}

/// Extension methods on [`Bounds`] in pixel space.
pub trait BoundsExt {
    /// The smallest window of a raster of dimension `dim`
    /// covering these bounds, truncated to the raster.
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow;
}

impl BoundsExt for Bounds {
    fn window_from_bounds(&self, dim: RasterDims) -> RasterWindow {
        let clip = |v: f64, max: usize| v.max(0.).min(max as f64);

        let left = clip(snap(self.min().x).floor(), dim.0);
        let top = clip(snap(self.min().y).floor(), dim.1);
        let right = clip(snap(self.max().x).ceil(), dim.0);
        let bot = clip(snap(self.max().y).ceil(), dim.1);

        (
            (left as isize, top as isize),
            ((right - left) as usize, (bot - top) as usize),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORTH_UP: GeoTransform = [500_000., 10., 0., 4_200_000., 0., -10.];

    #[test]
    fn gdal_transform_round_trip() {
        let m = transform_from_gdal(&NORTH_UP);
        assert_eq!(transform_to_gdal(&m), NORTH_UP);

        let pt = m.transform_point(&Point2::new(3., 2.));
        assert_eq!((pt.x, pt.y), (500_030., 4_199_980.));
    }

    #[test]
    fn bounds_from_transform() {
        let b = RasterBounds::from_transform(&NORTH_UP, (100, 50));
        assert_eq!(b, RasterBounds::new(500_000., 4_199_500., 501_000., 4_200_000.));
        assert_eq!(b.width(), 1000.);
        assert_eq!(b.height(), 500.);
        assert_eq!(b.min_y(), 4_199_500.);
    }

    #[test]
    fn window_for_window_transform() {
        let t = transform_for_window(&NORTH_UP, (10, 20));
        assert_eq!(t, [500_100., 10., 0., 4_199_800., 0., -10.]);
    }

    #[test]
    fn window_is_truncated() {
        let win = Rect::new((-2.5, 3.0000000001), (7.2, 12.)).window_from_bounds((5, 10));
        assert_eq!(win, ((0, 3), (5, 7)));
    }
}
