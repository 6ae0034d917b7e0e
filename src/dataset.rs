//! GDAL backed raster store and projection service.
//!
//! This module is only available with the "gdal" feature
//! (enabled by default).

use std::path::Path;

use anyhow::{ensure, Context};
use gdal::raster::{Buffer, GdalDataType, RasterBand};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, Driver, DriverManager, Metadata};
use ndarray::{Array3, Axis};
use tracing::warn;

use crate::geometry::{RasterBounds, RasterDims, RasterWindow};
use crate::projection::{Point, Projector};
use crate::raster::{BandInfo, RasterInfo, RasterSource, RasterStore, SampleType};
use crate::Result;

/// Driver used to write rasters whose own format is unknown
/// or cannot be created.
pub const DEFAULT_DRIVER: &str = "GTiff";

fn sample_type(t: GdalDataType) -> SampleType {
    match t {
        GdalDataType::UInt8 => SampleType::UInt8,
        GdalDataType::UInt16 => SampleType::UInt16,
        GdalDataType::Int16 => SampleType::Int16,
        GdalDataType::UInt32 => SampleType::UInt32,
        GdalDataType::Int32 => SampleType::Int32,
        GdalDataType::Float32 => SampleType::Float32,
        _ => SampleType::Float64,
    }
}

pub fn read_dataset(path: &Path) -> Result<Dataset> {
    Dataset::open(path).with_context(|| format!("reading dataset {}", path.display()))
}

/// The spatial reference of a dataset as `AUTH:CODE`, or as
/// WKT if it has no authority.
pub fn dataset_crs(ds: &Dataset) -> String {
    match ds.spatial_ref() {
        Ok(sr) => match (sr.auth_name(), sr.auth_code()) {
            (Ok(name), Ok(code)) => format!("{}:{}", name, code),
            _ => ds.projection(),
        },
        Err(_) => ds.projection(),
    }
}

fn band_info(band: &RasterBand, index: usize) -> BandInfo {
    let mut info = BandInfo::new(index);
    info.description = band.description().ok().filter(|d| !d.is_empty());
    for item in band.metadata_domain("").unwrap_or_default() {
        if let Some((key, value)) = item.split_once('=') {
            info.metadata.insert(key.into(), value.into());
        }
    }
    info
}

/// Collect the [`RasterInfo`] of an opened dataset.
pub fn raster_info(ds: &Dataset) -> Result<RasterInfo> {
    let (width, height) = ds.raster_size();
    let transform = ds
        .geo_transform()
        .with_context(|| "dataset is not georeferenced")?;

    let count = ds.raster_count();
    let mut bands = Vec::with_capacity(count as usize);
    let mut no_data = None;
    let mut samples = SampleType::Float64;
    for idx in 1..=count {
        let band = ds
            .rasterband(idx)
            .with_context(|| format!("unable to open rasterband {}", idx))?;
        if idx == 1 {
            no_data = band.no_data_value();
            samples = sample_type(band.band_type());
        }
        bands.push(band_info(&band, idx as usize));
    }

    Ok(RasterInfo {
        width,
        height,
        bounds: RasterBounds::from_transform(&transform, (width, height)),
        transform,
        crs: dataset_crs(ds),
        bands,
        no_data,
        sample_type: samples,
        driver: Some(ds.driver().short_name()),
    })
}

/// A dataset opened for reading. `Send`, but not `Sync`.
pub struct GdalRaster {
    ds: Dataset,
    info: RasterInfo,
}

impl GdalRaster {
    pub fn open(path: &Path) -> Result<Self> {
        let ds = read_dataset(path)?;
        let info = raster_info(&ds).with_context(|| format!("reading {}", path.display()))?;
        Ok(GdalRaster { ds, info })
    }

    pub fn dataset(&self) -> &Dataset {
        &self.ds
    }
}

impl RasterSource for GdalRaster {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_window(&self, window: RasterWindow) -> Result<Array3<f64>> {
        let (off, size) = window;
        let mut data = Vec::with_capacity(self.info.band_count() * size.0 * size.1);
        for idx in 1..=self.info.band_count() {
            let band = self.ds.rasterband(idx as isize)?;
            let buf = band.read_as::<f64>(off, size, size, None).with_context(|| {
                format!(
                    "reading window @ ({},{}) of dimension ({}x{}) of band {}",
                    off.0, off.1, size.0, size.1, idx
                )
            })?;
            data.extend(buf.data);
        }
        Ok(Array3::from_shape_vec(
            (self.info.band_count(), size.1, size.0),
            data,
        )?)
    }
}

/// Creates rasters with a GDAL driver.
///
/// Unless a driver is forced, rasters are written in the
/// format and sample type recorded in their [`RasterInfo`],
/// falling back to [`DEFAULT_DRIVER`] for formats GDAL can
/// only copy into (eg. JPEG, PNG).
#[derive(Debug, Clone, Default)]
pub struct GdalStore {
    pub driver: Option<String>,
}

impl GdalStore {
    /// A store always writing with `driver`.
    pub fn new<S: Into<String>>(driver: S) -> Self {
        GdalStore {
            driver: Some(driver.into()),
        }
    }

    /// The driver used to create a raster described by `info`.
    pub fn driver_for(&self, info: &RasterInfo) -> Result<Driver> {
        let name = match (&self.driver, &info.driver) {
            (Some(forced), _) => forced.as_str(),
            (None, Some(own)) => match DriverManager::get_driver_by_name(own) {
                Ok(driver) if can_create(&driver) => return Ok(driver),
                _ => {
                    warn!(driver = %own, fallback = DEFAULT_DRIVER, "format cannot be created");
                    DEFAULT_DRIVER
                }
            },
            (None, None) => DEFAULT_DRIVER,
        };
        DriverManager::get_driver_by_name(name).with_context(|| format!("loading driver {}", name))
    }
}

fn can_create(driver: &Driver) -> bool {
    driver.metadata_item("DCAP_CREATE", "").as_deref() == Some("YES")
}

fn create_dataset(driver: &Driver, path: &Path, dims: RasterDims, bands: usize, ty: SampleType) -> Result<Dataset> {
    let (w, h, n) = (dims.0 as isize, dims.1 as isize, bands as isize);
    let ds = match ty {
        SampleType::UInt8 => driver.create_with_band_type::<u8, _>(path, w, h, n),
        SampleType::UInt16 => driver.create_with_band_type::<u16, _>(path, w, h, n),
        SampleType::Int16 => driver.create_with_band_type::<i16, _>(path, w, h, n),
        SampleType::UInt32 => driver.create_with_band_type::<u32, _>(path, w, h, n),
        SampleType::Int32 => driver.create_with_band_type::<i32, _>(path, w, h, n),
        SampleType::Float32 => driver.create_with_band_type::<f32, _>(path, w, h, n),
        SampleType::Float64 => driver.create_with_band_type::<f64, _>(path, w, h, n),
    };
    Ok(ds?)
}

impl RasterStore for GdalStore {
    type Source = GdalRaster;

    fn open(&self, path: &Path) -> Result<GdalRaster> {
        GdalRaster::open(path)
    }

    fn create(&self, path: &Path, info: &RasterInfo, data: &Array3<f64>) -> Result<()> {
        let (num_bands, height, width) = data.dim();
        ensure!(
            num_bands == info.band_count(),
            "{} bands of data for {} band descriptions",
            num_bands,
            info.band_count()
        );

        let driver = self.driver_for(info)?;
        let mut out_ds = create_dataset(&driver, path, (width, height), num_bands, info.sample_type)
            .with_context(|| format!("creating dataset {}", path.display()))?;
        out_ds.set_geo_transform(&info.transform)?;
        out_ds.set_spatial_ref(&SpatialRef::from_definition(&info.crs)?)?;

        // GDAL converts the `f64` buffers to the band type.
        for (i, (band_data, band_info)) in data.axis_iter(Axis(0)).zip(&info.bands).enumerate() {
            let mut band = out_ds.rasterband(i as isize + 1)?;
            if let Some(desc) = &band_info.description {
                band.set_description(desc)?;
            }
            for (key, value) in &band_info.metadata {
                band.set_metadata_item(key, value, "")?;
            }
            if let Some(no_val) = info.no_data {
                band.set_no_data_value(Some(no_val))?;
            }
            let buf = Buffer::new((width, height), band_data.iter().copied().collect());
            band.write((0, 0), (width, height), &buf)?;
        }
        Ok(())
    }

    fn extension(&self, info: &RasterInfo) -> Option<String> {
        self.driver_for(info)
            .ok()?
            .metadata_item("DMD_EXTENSION", "")
            .filter(|ext| !ext.is_empty())
    }
}

/// Reprojects with OSR. Coordinates are always in
/// `(x, y)` (i.e. `(lng, lat)`) order, regardless of the
/// axis order declared by the CRS.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalProjector;

fn spatial_ref(definition: &str) -> Result<SpatialRef> {
    let sr = SpatialRef::from_definition(definition)
        .with_context(|| format!("couldn't load spatial reference {}", definition))?;
    sr.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(sr)
}

impl Projector for GdalProjector {
    fn project(&self, from: &str, to: &str, pts: &mut [Point]) -> Result<()> {
        let transform = CoordTransform::new(&spatial_ref(from)?, &spatial_ref(to)?)?;

        let mut x: Vec<f64> = pts.iter().map(|p| p.0).collect();
        let mut y: Vec<f64> = pts.iter().map(|p| p.1).collect();
        let mut z = vec![0.; pts.len()];
        transform.transform_coords(&mut x, &mut y, &mut z)?;

        for (pt, (x, y)) in pts.iter_mut().zip(x.into_iter().zip(y)) {
            *pt = (x, y);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::WebMercator;
    use rand::*;
    use tempdir::TempDir;

    const WIDTH: usize = 16;
    const HEIGHT: usize = 32;

    fn info() -> RasterInfo {
        let mut info = RasterInfo::new(
            (WIDTH, HEIGHT),
            [500_000., 2., 0., 4_200_000., 0., -2.],
            "EPSG:32633",
            2,
        );
        info.bands[0] = BandInfo::new(1)
            .with_description("red")
            .with_tag("wavelength", "665")
            .with_tag("wavelength_units", "nm");
        info.bands[1] = BandInfo::new(2).with_description("nir");
        info
    }

    #[test]
    fn create_read_dataset() -> Result<()> {
        let tmp_dir = TempDir::new("geotiles_test")?;
        let path = tmp_dir.path().join("foo.tif");

        // Create random data
        let data = {
            let mut rng = thread_rng();
            Array3::from_shape_fn((2, HEIGHT, WIDTH), |_| rng.gen::<f64>())
        };

        let store = GdalStore::default();
        store.create(&path, &info(), &data)?;

        let raster = store.open(&path)?;
        let read = raster.info();
        assert_eq!(read.dims(), (WIDTH, HEIGHT));
        assert_eq!(read.transform, info().transform);
        assert_eq!(read.crs, "EPSG:32633");
        assert_eq!(read.bands, info().bands);

        assert_eq!(raster.read_all()?, data);
        let win = raster.read_window(((3, 5), (4, 2)))?;
        assert_eq!(win[(1, 1, 3)], data[(1, 6, 6)]);
        Ok(())
    }

    #[test]
    fn tiles_keep_source_format() -> Result<()> {
        use crate::crop::WindowCropper;
        use crate::export::{CancelFlag, ExportOptions, TilingContext};
        use crate::progress::NoProgress;
        use crate::tiling::TileConfig;
        use ndarray::s;

        let tmp_dir = TempDir::new("geotiles_test")?;
        let src_path = tmp_dir.path().join("scene.tif");
        let out_dir = tmp_dir.path().join("tiles");
        std::fs::create_dir(&out_dir)?;

        let mut src_info = info();
        src_info.sample_type = SampleType::UInt8;
        let data = {
            let mut rng = thread_rng();
            Array3::from_shape_fn((2, HEIGHT, WIDTH), |_| rng.gen_range(0u8, 255) as f64)
        };
        GdalStore::default().create(&src_path, &src_info, &data)?;

        let ctx = TilingContext::new(GdalStore::default(), GdalProjector, WindowCropper);
        let paths = ctx.create_tiles(
            &src_path,
            &TileConfig::in_pixels(16, 16),
            &ExportOptions::new(&out_dir),
            &NoProgress,
            &CancelFlag::new(),
        )?;
        assert_eq!(paths, vec![out_dir.join("1.tif"), out_dir.join("2.tif")]);

        let tile = ctx.store.open(&paths[1])?;
        assert_eq!(tile.info().sample_type, SampleType::UInt8);
        assert_eq!(tile.info().driver.as_deref(), Some("GTiff"));
        assert_eq!(tile.info().bands, src_info.bands);
        assert_eq!(tile.read_all()?, data.slice(s![.., 16..32, 0..16]));
        Ok(())
    }

    #[test]
    fn copy_only_formats_fall_back() -> Result<()> {
        let store = GdalStore::default();
        let mut png = info();
        png.driver = Some("PNG".into());
        assert_eq!(store.driver_for(&png)?.short_name(), DEFAULT_DRIVER);
        assert_eq!(store.extension(&png).as_deref(), Some("tif"));

        let forced = GdalStore::new("GTiff");
        let mut mem = info();
        mem.driver = Some("MEM".into());
        assert_eq!(forced.driver_for(&mem)?.short_name(), "GTiff");
        Ok(())
    }

    #[test]
    fn projector_agrees_with_web_mercator() -> Result<()> {
        let pts = [(12.5, 41.9), (-70.6, -33.4), (0., 0.)];

        let mut gdal_pts = pts;
        GdalProjector.project("EPSG:4326", "EPSG:3857", &mut gdal_pts)?;
        let mut wm_pts = pts;
        WebMercator.project("EPSG:4326", "EPSG:3857", &mut wm_pts)?;

        for (a, b) in gdal_pts.iter().zip(wm_pts.iter()) {
            assert!((a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3);
        }
        Ok(())
    }
}
