pub use crate::{Error, Result};

pub use crate::coords::*;
pub use crate::crop::*;
pub use crate::error::*;
pub use crate::export::*;
pub use crate::features::*;
pub use crate::geometry::*;
pub use crate::ground::*;
pub use crate::mem::*;
pub use crate::progress::*;
pub use crate::projection::*;
pub use crate::raster::*;
pub use crate::tiling::*;

#[cfg(feature = "gdal")]
pub use crate::dataset::*;
