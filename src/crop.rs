//! Crop a raster to polygons.

use anyhow::{anyhow, bail};
use geo::{BoundingRect, Contains, MapCoords, MultiPolygon, Point};
use geojson::FeatureCollection;
use nalgebra::Point2;
use ndarray::{Array3, Axis};

use crate::features::collection_polygons;
use crate::geometry::{transform_for_window, transform_from_gdal, Bounds, BoundsExt, GeoTransform};
use crate::raster::RasterSource;
use crate::Result;

/// Pixels and georeferencing of a cropped raster.
#[derive(Debug, Clone)]
pub struct Cropped {
    /// `(band, row, col)` pixel data.
    pub data: Array3<f64>,
    pub transform: GeoTransform,
}

/// The Mask/Crop service.
pub trait Cropper {
    /// Crop `src` to the extent of the polygons in `shapes`
    /// (given in the CRS of `src`).
    fn crop<S: RasterSource + ?Sized>(&self, src: &S, shapes: &FeatureCollection) -> Result<Cropped>;
}

/// Crops to the pixel window enclosing the shapes, and sets
/// pixels whose center lies outside all shapes to the
/// no-data value of the source (`NaN` if it has none).
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowCropper;

impl Cropper for WindowCropper {
    fn crop<S: RasterSource + ?Sized>(&self, src: &S, shapes: &FeatureCollection) -> Result<Cropped> {
        let info = src.info();

        // Project polygons on raster pixels
        let inv = transform_from_gdal(&info.transform)
            .try_inverse()
            .ok_or_else(|| anyhow!("couldn't invert geo transform"))?;
        let polygons: Vec<MultiPolygon<f64>> = collection_polygons(shapes)?
            .iter()
            .map(|poly| {
                poly.map_coords(|c| {
                    let pt = inv.transform_point(&Point2::new(c.x, c.y));
                    geo::coord! { x: pt.x, y: pt.y }
                })
            })
            .collect();

        let bounds = polygons
            .iter()
            .filter_map(|p| p.bounding_rect())
            .reduce(|a, b| {
                Bounds::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
            .ok_or_else(|| anyhow!("no polygons to crop to"))?;

        let (off, size) = bounds.window_from_bounds(info.dims());
        if size.0 == 0 || size.1 == 0 {
            bail!("shapes do not overlap the raster");
        }

        let mut data = src.read_window((off, size))?;
        let no_val = info.no_data.unwrap_or(f64::NAN);

        for mut band in data.axis_iter_mut(Axis(0)) {
            for ((i, j), pix) in band.indexed_iter_mut() {
                let center = Point::new(
                    off.0 as f64 + j as f64 + 0.5,
                    off.1 as f64 + i as f64 + 0.5,
                );
                if !polygons.iter().any(|p| p.contains(&center)) {
                    *pix = no_val;
                }
            }
        }

        Ok(Cropped {
            data,
            transform: transform_for_window(&info.transform, off),
        })
    }
}
