//! Plan the tiles covering a raster.
//!
//! # Grid Layout
//!
//! Along each axis, tiles start at `0, stride, 2 * stride,
//! ...` where `stride = floor(tile * (1 - overlap))`. The
//! first window that reaches (or crosses) the raster edge is
//! shifted back so that its far edge is exactly the edge of
//! the raster, and is the last window on that axis. Thus
//!
//! - every tile has exactly the requested dimension,
//!
//! - the raster is covered completely, including a ragged
//! border, at the cost of extra overlap in the last row and
//! column of tiles, and
//!
//! - no two tiles on an axis are identical.
//!
//! Tiles are enumerated in column-major order: the outer
//! loop runs over horizontal windows, the inner loop over
//! vertical ones. The position in this order is the tile's
//! sequence number.

use serde_derive::Serialize;
use tracing::info;

use crate::coords::PixelCoord;
use crate::error::{TileError, Violations};
use crate::geometry::{RasterDims, RasterWindow};
use crate::ground::{pixel_size_in_meters, PixelSize};
use crate::projection::Projector;
use crate::raster::RasterInfo;
use crate::Result;

mod config;
pub use config::*;

/// Pixel extent of one tile. `max_*` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileBBox {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl TileBBox {
    /// The closed ring
    /// `[(min_row, min_col), (min_row, max_col), (max_row, max_col), (max_row, min_col), (min_row, min_col)]`.
    pub fn ring(&self) -> [PixelCoord; 5] {
        [
            PixelCoord::new(self.min_row, self.min_col),
            PixelCoord::new(self.min_row, self.max_col),
            PixelCoord::new(self.max_row, self.max_col),
            PixelCoord::new(self.max_row, self.min_col),
            PixelCoord::new(self.min_row, self.min_col),
        ]
    }

    pub fn height(&self) -> usize {
        self.max_row - self.min_row
    }

    pub fn width(&self) -> usize {
        self.max_col - self.min_col
    }

    pub fn window(&self) -> RasterWindow {
        (
            (self.min_col as isize, self.min_row as isize),
            (self.width(), self.height()),
        )
    }
}

/// Output of [`plan_tiles`].
#[derive(Debug, Clone, Serialize)]
pub struct TilePlan {
    /// `(height, width)` of every tile in pixels.
    pub tile_pixels: (usize, usize),
    /// `(height, width)` of every tile in meters. Informational.
    pub tile_meters: (f64, f64),
    /// `(vertical, horizontal)` distance between tile origins.
    pub stride: (usize, usize),
    pub pixel_size: PixelSize,
    pub tiles: Vec<TileBBox>,
}

impl TilePlan {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Plan the tiles of a raster.
///
/// Validates `config`, converts a size given in meters to
/// pixels using the ground size of a pixel, and lays out the
/// grid. All parameter errors are reported as
/// [`TileError::InvalidArgument`] before any tile is planned.
pub fn plan_tiles<P: Projector + ?Sized>(info: &RasterInfo, config: &TileConfig, projector: &P) -> Result<TilePlan> {
    let size = config.validate()?;
    let pixel_size = pixel_size_in_meters(info, projector)?;

    let (tile_pixels, tile_meters) = match size {
        TileSize::Pixels { height, width } => (
            (height, width),
            (height as f64 * pixel_size.y_res_m, width as f64 * pixel_size.x_res_m),
        ),
        TileSize::Meters { height, width } => (
            (
                (height / pixel_size.y_res_m).round() as usize,
                (width / pixel_size.x_res_m).round() as usize,
            ),
            (height, width),
        ),
    };

    let (stride, tiles) = plan_grid(info.dims(), tile_pixels, config.overlap())?;
    info!(
        count = tiles.len(),
        "planned {} tiles of ({},{}) pixels / ({},{}) meters",
        tiles.len(),
        tile_pixels.0,
        tile_pixels.1,
        tile_meters.0 as i64,
        tile_meters.1 as i64,
    );

    Ok(TilePlan {
        tile_pixels,
        tile_meters,
        stride,
        pixel_size,
        tiles,
    })
}

/// Lay out tiles of `tile` (`(height, width)`) pixels over a
/// raster of dimension `dims`. Returns the
/// `(vertical, horizontal)` stride and the tiles in
/// column-major order.
pub fn plan_grid(
    dims: RasterDims,
    tile: (usize, usize),
    overlap: f64,
) -> Result<((usize, usize), Vec<TileBBox>), TileError> {
    let (width, height) = dims;
    let (tile_h, tile_w) = tile;

    let stride_h = stride(tile_h, overlap);
    let stride_w = stride(tile_w, overlap);

    let mut violations = Violations::new();
    for &(name, size, dim, stride) in &[
        ("height", tile_h, height, stride_h),
        ("width", tile_w, width, stride_w),
    ] {
        if size < MIN_TILE_PIXELS {
            violations.push(format!(
                "tile {} must be at least {} pixels: got {}",
                name, MIN_TILE_PIXELS, size
            ));
        } else if stride == 0 {
            violations.push(format!(
                "tile {} of {} pixels with overlap {} leaves no stride between tiles",
                name, size, overlap
            ));
        }
        if size > dim {
            violations.push(format!(
                "tile {} of {} pixels exceeds raster {} of {} pixels",
                name, size, name, dim
            ));
        }
    }
    violations.into_result()?;

    let cols = plan_axis(width, tile_w, stride_w);
    let rows = plan_axis(height, tile_h, stride_h);

    let tiles = cols
        .iter()
        .flat_map(|&(min_col, max_col)| {
            rows.iter().map(move |&(min_row, max_row)| TileBBox {
                min_row,
                min_col,
                max_row,
                max_col,
            })
        })
        .collect();

    Ok(((stride_h, stride_w), tiles))
}

/// Distance between the origins of adjacent tiles:
/// `floor(tile * (1 - overlap))`.
///
/// Only rounding error of the product (a few ulps) is
/// absorbed before flooring, so any overlap that covers a
/// pixel fraction still shortens the stride.
#[inline]
pub fn stride(tile: usize, overlap: f64) -> usize {
    let exact = tile as f64 * (1. - overlap);
    let tolerance = 4. * f64::EPSILON * tile as f64;
    let up = exact.ceil();
    if up - exact <= tolerance {
        up as usize
    } else {
        exact.floor() as usize
    }
}

/// Semi-open `(start, end)` ranges of the windows along an
/// axis of length `dim`. Expects `2 <= tile <= dim` and
/// `stride >= 1`.
pub fn plan_axis(dim: usize, tile: usize, stride: usize) -> Vec<(usize, usize)> {
    debug_assert!(tile <= dim && stride > 0);

    let mut windows = vec![];
    let mut pos = 0;
    loop {
        if pos + tile >= dim {
            windows.push((dim - tile, dim));
            break;
        }
        windows.push((pos, pos + tile));
        pos += stride;
    }
    windows
}
