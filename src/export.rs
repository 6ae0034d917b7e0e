//! Cut a raster into tiles and write them out.
//!
//! Every tile of a [`TilePlan`] is mapped to a polygon in
//! the raster's CRS, cropped out of the source raster and
//! written to `<output_dir>/<index>.<ext>`, where `index` is
//! the 1-based position of the tile in the plan.
//!
//! All collaborators are held by a [`TilingContext`] that
//! is constructed once and passed by reference.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;

use crate::coords::pixel_ring_to_geo;
use crate::crop::Cropper;
use crate::error::TileError;
use crate::features::polygon_collection;
use crate::ground::{raster_attributes, RasterAttributes};
use crate::progress::{Counter, Flag, ProgressEvent, ProgressReport};
use crate::projection::Projector;
use crate::raster::{RasterSource, RasterStore};
use crate::tiling::{plan_tiles, TileBBox, TileConfig, TilePlan};
use crate::Result;

/// Extension of tiles when neither the options, the store
/// nor the source path provide one.
pub const DEFAULT_EXTENSION: &str = "tif";

/// The Raster Store, Projection and Mask/Crop services used
/// by the pipeline.
#[derive(Debug, Clone)]
pub struct TilingContext<S, P, C> {
    pub store: S,
    pub projector: P,
    pub cropper: C,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    /// Extension of the tile files; see
    /// [`ExportOptions::tile_extension`].
    pub extension: Option<String>,
    /// Crop and write tiles on the rayon thread pool. Only
    /// honoured with the `use-rayon` feature.
    pub parallel: bool,
}

impl ExportOptions {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        ExportOptions {
            output_dir: output_dir.into(),
            extension: None,
            parallel: false,
        }
    }

    pub fn with_extension<E: Into<String>>(mut self, ext: E) -> Self {
        self.extension = Some(ext.into());
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Extension of the tiles cut from `src_path`: the one
    /// set on the options, else the one of the format the
    /// store writes (`store_ext`), else that of the source.
    pub fn tile_extension(&self, src_path: &Path, store_ext: Option<String>) -> String {
        self.extension
            .clone()
            .or(store_ext)
            .or_else(|| {
                src_path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| DEFAULT_EXTENSION.into())
    }

    /// Path of the tile at 1-based `index`.
    pub fn tile_path(&self, ext: &str, index: usize) -> PathBuf {
        self.output_dir.join(format!("{}.{}", index, ext))
    }
}

/// Cooperative cancellation of an export. Checked before
/// each tile is cropped; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<Flag>);

impl CancelFlag {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        self.0.store(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load()
    }
}

/// Fail unless `dir` is an existing directory the current
/// process may create files in.
pub fn check_output_dir(dir: &Path) -> Result<()> {
    let fail = |reason: &str| TileError::OutputDir {
        path: dir.to_path_buf(),
        reason: reason.into(),
    };
    let meta = std::fs::metadata(dir).map_err(|e| fail(&e.to_string()))?;
    if !meta.is_dir() {
        return Err(fail("not a directory").into());
    }
    if let Err(reason) = writable(dir, &meta) {
        return Err(fail(&format!("not writable: {}", reason)).into());
    }
    Ok(())
}

#[cfg(unix)]
fn writable(dir: &Path, _: &std::fs::Metadata) -> std::result::Result<(), String> {
    use nix::unistd::{access, AccessFlags};
    access(dir, AccessFlags::W_OK | AccessFlags::X_OK).map_err(|e| e.desc().to_string())
}

#[cfg(not(unix))]
fn writable(_: &Path, meta: &std::fs::Metadata) -> std::result::Result<(), String> {
    if meta.permissions().readonly() {
        Err("directory is read-only".into())
    } else {
        Ok(())
    }
}

impl<S, P, C> TilingContext<S, P, C>
where
    S: RasterStore,
    P: Projector,
    C: Cropper,
{
    pub fn new(store: S, projector: P, cropper: C) -> Self {
        TilingContext {
            store,
            projector,
            cropper,
        }
    }

    fn open(&self, path: &Path) -> Result<S::Source> {
        self.store
            .open(path)
            .with_context(|| format!("opening raster {}", path.display()))
    }

    /// Plan the tiles of the raster at `src_path` without
    /// writing anything.
    pub fn plan(&self, src_path: &Path, config: &TileConfig) -> Result<TilePlan> {
        let src = self.open(src_path)?;
        plan_tiles(src.info(), config, &self.projector)
    }

    pub fn attributes(&self, src_path: &Path) -> Result<RasterAttributes> {
        let src = self.open(src_path)?;
        raster_attributes(src.info(), &self.projector)
    }

    /// Crop `src` to one tile and write it to `path`.
    pub fn export_tile<R: RasterSource + ?Sized>(&self, src: &R, bbox: &TileBBox, path: &Path) -> Result<()> {
        let info = src.info();
        let ring = pixel_ring_to_geo(info, &bbox.ring());
        let shapes = polygon_collection(&ring, &info.crs);

        let cropped = self
            .cropper
            .crop(src, &shapes)
            .with_context(|| format!("cropping tile {:?}", bbox))?;
        let (_, rows, cols) = cropped.data.dim();
        let out_info = info.for_window((cols, rows), cropped.transform);

        debug!(path = %path.display(), rows, cols, "writing tile");
        self.store
            .create(path, &out_info, &cropped.data)
            .with_context(|| format!("writing tile {}", path.display()))
    }

    /// Crop the raster at `src_path` to `shapes` and write the
    /// result to `out_path`.
    pub fn crop_to_path(
        &self,
        src_path: &Path,
        out_path: &Path,
        shapes: &geojson::FeatureCollection,
    ) -> Result<()> {
        let parent = match out_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        check_output_dir(parent)?;

        let src = self.open(src_path)?;
        let cropped = self.cropper.crop(&src, shapes)?;
        let (_, rows, cols) = cropped.data.dim();
        let out_info = src.info().for_window((cols, rows), cropped.transform);
        self.store
            .create(out_path, &out_info, &cropped.data)
            .with_context(|| format!("writing {}", out_path.display()))
    }

    /// Tile the raster at `src_path`. Returns the paths of the
    /// written tiles in plan order.
    ///
    /// The first failing tile aborts the export; tiles
    /// written until then are left in place.
    pub fn create_tiles<R: ProgressReport + ?Sized>(
        &self,
        src_path: &Path,
        config: &TileConfig,
        options: &ExportOptions,
        progress: &R,
        cancel: &CancelFlag,
    ) -> Result<Vec<PathBuf>>
    where
        S: Sync,
        P: Sync,
        C: Sync,
    {
        config.validate()?;
        check_output_dir(&options.output_dir)?;

        let src = self.open(src_path)?;
        let plan = plan_tiles(src.info(), config, &self.projector)?;
        progress.report(&ProgressEvent::Planned { plan: &plan });

        let ext = options.tile_extension(src_path, self.store.extension(src.info()));
        let paths: Vec<PathBuf> = (1..=plan.len())
            .map(|idx| options.tile_path(&ext, idx))
            .collect();
        let written = Counter::default();

        let result = if options.parallel {
            self.export_parallel(src, src_path, &plan, &paths, progress, cancel, &written)
        } else {
            self.export_sequential(&src, &plan, &paths, progress, cancel, &written)
        };

        progress.report(&ProgressEvent::Finished {
            written: written.load(),
        });
        result.map(|_| paths)
    }

    fn export_sequential<R: ProgressReport + ?Sized>(
        &self,
        src: &S::Source,
        plan: &TilePlan,
        paths: &[PathBuf],
        progress: &R,
        cancel: &CancelFlag,
        written: &Counter,
    ) -> Result<()> {
        for (idx, (bbox, path)) in plan.tiles.iter().zip(paths).enumerate() {
            if cancel.is_cancelled() {
                return Err(TileError::Cancelled {
                    completed: written.load(),
                }
                .into());
            }
            self.export_tile(src, bbox, path)?;
            written.fetch_add(1);
            progress.report(&ProgressEvent::TileWritten {
                index: idx + 1,
                path,
            });
        }
        Ok(())
    }

    #[cfg(feature = "use-rayon")]
    #[allow(clippy::too_many_arguments)]
    fn export_parallel<R: ProgressReport + ?Sized>(
        &self,
        src: S::Source,
        src_path: &Path,
        plan: &TilePlan,
        paths: &[PathBuf],
        progress: &R,
        cancel: &CancelFlag,
        written: &Counter,
    ) -> Result<()>
    where
        S: Sync,
        P: Sync,
        C: Sync,
    {
        use rayon::prelude::*;

        // Each worker reads through its own handle.
        drop(src);
        plan.tiles
            .par_iter()
            .zip(paths.par_iter())
            .enumerate()
            .map_init(
                || self.open(src_path),
                |reader, (idx, (bbox, path))| -> Result<()> {
                    if cancel.is_cancelled() {
                        return Err(TileError::Cancelled {
                            completed: written.load(),
                        }
                        .into());
                    }
                    let reader = reader
                        .as_ref()
                        .map_err(|e| anyhow::anyhow!("{:#}", e))?;
                    self.export_tile(reader, bbox, path)?;
                    written.fetch_add(1);
                    progress.report(&ProgressEvent::TileWritten {
                        index: idx + 1,
                        path,
                    });
                    Ok(())
                },
            )
            .collect()
    }

    #[cfg(not(feature = "use-rayon"))]
    #[allow(clippy::too_many_arguments)]
    fn export_parallel<R: ProgressReport + ?Sized>(
        &self,
        src: S::Source,
        _src_path: &Path,
        plan: &TilePlan,
        paths: &[PathBuf],
        progress: &R,
        cancel: &CancelFlag,
        written: &Counter,
    ) -> Result<()> {
        tracing::warn!("built without `use-rayon`: exporting tiles sequentially");
        self.export_sequential(&src, plan, paths, progress, cancel, written)
    }
}
