//! In-memory rasters.
//!
//! Useful to tile pixel data that is not backed by a file,
//! and to exercise the pipeline without GDAL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, ensure};
use ndarray::{s, Array3};

use crate::geometry::RasterWindow;
use crate::raster::{RasterInfo, RasterSource, RasterStore};
use crate::Result;

#[derive(Debug, Clone)]
pub struct MemRaster {
    info: RasterInfo,
    data: Arc<Array3<f64>>,
}

impl MemRaster {
    /// `data` is `(band, row, col)` and must agree with `info`.
    pub fn new(info: RasterInfo, data: Array3<f64>) -> Result<Self> {
        ensure!(
            data.dim() == (info.band_count(), info.height, info.width),
            "data of shape {:?} does not match raster of {} bands, {}x{} pixels",
            data.dim(),
            info.band_count(),
            info.width,
            info.height
        );
        Ok(MemRaster {
            info,
            data: Arc::new(data),
        })
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }
}

impl RasterSource for MemRaster {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_window(&self, window: RasterWindow) -> Result<Array3<f64>> {
        let ((x, y), (w, h)) = window;
        if x < 0 || y < 0 || x as usize + w > self.info.width || y as usize + h > self.info.height {
            bail!(
                "window @ ({},{}) of dimension ({}x{}) is outside the raster",
                x,
                y,
                w,
                h
            );
        }
        let (x, y) = (x as usize, y as usize);
        Ok(self.data.slice(s![.., y..y + h, x..x + w]).to_owned())
    }
}

/// A [`RasterStore`] keeping rasters in a map keyed by path.
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    rasters: Arc<Mutex<BTreeMap<PathBuf, MemRaster>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert<P: Into<PathBuf>>(&self, path: P, raster: MemRaster) {
        self.lock().insert(path.into(), raster);
    }

    pub fn get(&self, path: &Path) -> Option<MemRaster> {
        self.lock().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, MemRaster>> {
        // A panic while holding the lock cannot leave the map
        // half-updated.
        self.rasters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RasterStore for MemStore {
    type Source = MemRaster;

    fn open(&self, path: &Path) -> Result<MemRaster> {
        self.get(path)
            .ok_or_else(|| anyhow!("reading dataset {}: not found", path.display()))
    }

    fn create(&self, path: &Path, info: &RasterInfo, data: &Array3<f64>) -> Result<()> {
        let raster = MemRaster::new(info.clone(), data.clone())?;
        self.insert(path, raster);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> RasterInfo {
        RasterInfo::new((4, 3), [0., 1., 0., 3., 0., -1.], "EPSG:3857", 2)
    }

    #[test]
    fn shape_is_checked() {
        assert!(MemRaster::new(info(), Array3::zeros((2, 3, 4))).is_ok());
        assert!(MemRaster::new(info(), Array3::zeros((2, 4, 3))).is_err());
    }

    #[test]
    fn read_window() -> Result<()> {
        let data = Array3::from_shape_fn((2, 3, 4), |(b, r, c)| (b * 100 + r * 10 + c) as f64);
        let raster = MemRaster::new(info(), data)?;

        let win = raster.read_window(((1, 1), (2, 2)))?;
        assert_eq!(win.dim(), (2, 2, 2));
        assert_eq!(win[(0, 0, 0)], 11.);
        assert_eq!(win[(1, 1, 1)], 122.);

        assert_eq!(raster.read_all()?, *raster.data());
        assert!(raster.read_window(((3, 0), (2, 1))).is_err());
        Ok(())
    }

    #[test]
    fn store_round_trip() -> Result<()> {
        let store = MemStore::new();
        let path = Path::new("/tiles/1.tif");
        assert!(store.open(path).is_err());

        store.create(path, &info(), &Array3::zeros((2, 3, 4)))?;
        assert_eq!(store.open(path)?.info(), &info());
        assert_eq!(store.paths(), vec![path.to_path_buf()]);
        Ok(())
    }
}
