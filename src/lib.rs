//! Split georeferenced rasters into tiles.
//!
//! A raster is cut into possibly overlapping rectangular
//! tiles, each written as an independently georeferenced
//! raster. The crate provides:
//!
//! - pixel ↔ geo coordinate conversion ([`coords`]),
//!
//! - estimation of the ground size of a pixel ([`ground`]),
//! used to express tile sizes in meters,
//!
//! - planning of the tile grid ([`tiling`]), and
//!
//! - cropping and writing the tiles ([`export`]).
//!
//! Raster IO, reprojection and cropping are abstracted by
//! the [`RasterStore`][raster::RasterStore],
//! [`Projector`][projection::Projector] and
//! [`Cropper`][crop::Cropper] traits. With the "gdal"
//! feature (default), [`dataset`] implements them using
//! GDAL.
//!
//! # Example
//!
//! ```no_run
//! use geotiles::prelude::*;
//! use std::path::Path;
//!
//! # #[cfg(not(feature = "gdal"))]
//! # fn main() {}
//! # #[cfg(feature = "gdal")]
//! # fn main() -> Result<()> {
//! let ctx = TilingContext::new(GdalStore::default(), GdalProjector, WindowCropper);
//! let config = TileConfig::in_meters(500., 500.).with_overlap(0.2);
//! let tiles = ctx.create_tiles(
//!     Path::new("scene.tif"),
//!     &config,
//!     &ExportOptions::new("tiles"),
//!     &Tracker::new("tiles"),
//!     &CancelFlag::new(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod coords;
pub mod crop;
pub mod error;
pub mod export;
pub mod features;
pub mod geometry;
pub mod ground;
pub mod mem;
pub mod progress;
pub mod projection;
pub mod raster;
pub mod tiling;

#[cfg(feature = "gdal")]
pub mod dataset;

pub mod prelude;

pub use anyhow::{Error, Result};
