//! Access to raster datasets.
//!
//! The tiling logic only depends on the [`RasterSource`] and
//! [`RasterStore`] traits. GDAL backed implementations live in
//! [`crate::dataset`]; [`crate::mem`] provides in-memory ones.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array3;
use serde_derive::{Deserialize, Serialize};

use crate::geometry::{GeoTransform, RasterBounds, RasterDims, RasterWindow};
use crate::Result;

/// Identity of a single band: carried unchanged from a
/// source raster to every tile cut from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BandInfo {
    /// 1-based band index.
    pub index: usize,
    pub description: Option<String>,
    /// Tags of the default metadata domain.
    pub metadata: BTreeMap<String, String>,
}

impl BandInfo {
    pub fn new(index: usize) -> Self {
        BandInfo {
            index,
            ..Default::default()
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Sample type of the bands of a raster.
///
/// Pixels are always handled as `f64`; stores writing typed
/// formats convert to this type on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    #[default]
    Float64,
}

/// Metadata of an opened raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub bounds: RasterBounds,
    pub transform: GeoTransform,
    /// Spatial reference, eg. `EPSG:32633`, or WKT when the
    /// raster has no authority code.
    pub crs: String,
    pub bands: Vec<BandInfo>,
    pub no_data: Option<f64>,
    /// Sample type of the bands as stored.
    #[serde(default)]
    pub sample_type: SampleType,
    /// Short name of the format the raster is stored in (eg.
    /// `GTiff`), if known.
    #[serde(default)]
    pub driver: Option<String>,
}

impl RasterInfo {
    /// Describe a raster of the given size from its
    /// transform. Bounds are derived from the transform and
    /// bands are left without description.
    pub fn new(dims: RasterDims, transform: GeoTransform, crs: &str, band_count: usize) -> Self {
        RasterInfo {
            width: dims.0,
            height: dims.1,
            bounds: RasterBounds::from_transform(&transform, dims),
            transform,
            crs: crs.into(),
            bands: (1..=band_count).map(BandInfo::new).collect(),
            no_data: None,
            sample_type: SampleType::Float64,
            driver: None,
        }
    }

    pub fn dims(&self) -> RasterDims {
        (self.width, self.height)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Metadata of a raster holding `window` of this one,
    /// with the given transform. Band identity, no-data value,
    /// sample type and format carry over.
    pub fn for_window(&self, dims: RasterDims, transform: GeoTransform) -> Self {
        RasterInfo {
            width: dims.0,
            height: dims.1,
            bounds: RasterBounds::from_transform(&transform, dims),
            transform,
            crs: self.crs.clone(),
            bands: self.bands.clone(),
            no_data: self.no_data,
            sample_type: self.sample_type,
            driver: self.driver.clone(),
        }
    }
}

/// An opened raster: the Raster Handle of the pipeline.
pub trait RasterSource {
    fn info(&self) -> &RasterInfo;

    /// Read a window of all bands as a `(band, row, col)` array.
    fn read_window(&self, window: RasterWindow) -> Result<Array3<f64>>;

    /// Read all bands completely.
    fn read_all(&self) -> Result<Array3<f64>> {
        self.read_window(((0, 0), self.info().dims()))
    }
}

/// Opens existing rasters and creates new ones.
pub trait RasterStore {
    type Source: RasterSource;

    fn open(&self, path: &Path) -> Result<Self::Source>;

    /// Write `data` (`(band, row, col)`) to a new raster at
    /// `path`, with the georeferencing and band identity of
    /// `info`.
    fn create(&self, path: &Path, info: &RasterInfo, data: &Array3<f64>) -> Result<()>;

    /// File extension of rasters created from `info`, if the
    /// store decides the format.
    fn extension(&self, _info: &RasterInfo) -> Option<String> {
        None
    }
}
