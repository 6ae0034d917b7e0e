//! Failure taxonomy of the tiling pipeline.
//!
//! Fallible functions in this crate return the crate-wide
//! [`Result`][crate::Result] (an `anyhow` error). The failures that
//! callers may want to branch on are raised as a [`TileError`] and can
//! be recovered with `err.downcast_ref::<TileError>()`.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// Malformed or contradictory tiling parameters.
    #[error("invalid tiling arguments: {0}")]
    InvalidArgument(Violations),

    /// A geo coordinate does not lie within the raster's extent.
    #[error("coordinate (lat: {lat}, lng: {lng}) is outside of the raster")]
    OutOfBounds { lat: f64, lng: f64 },

    /// The raster reaches latitudes where the distance projection
    /// is no longer usable.
    #[error("projected y {y} exceeds {limit}: distances are not valid beyond 85 deg. latitude")]
    ProjectionRange { y: f64, limit: f64 },

    /// The output directory cannot receive tiles.
    #[error("invalid output directory {}: {reason}", path.display())]
    OutputDir { path: PathBuf, reason: String },

    /// Export stopped by a [`CancelFlag`][crate::export::CancelFlag].
    #[error("export cancelled after {completed} tiles")]
    Cancelled { completed: usize },
}

/// Every constraint violated by a tiling configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Violations(vec![])
    }

    pub fn single<S: Into<String>>(msg: S) -> Self {
        Violations(vec![msg.into()])
    }

    pub fn push<S: Into<String>>(&mut self, msg: S) {
        self.0.push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// `Ok(())` if nothing was violated; otherwise an
    /// [`TileError::InvalidArgument`] carrying all violations.
    pub fn into_result(self) -> Result<(), TileError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(TileError::InvalidArgument(self))
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_all_violations() {
        let mut v = Violations::new();
        assert!(v.clone().into_result().is_ok());

        v.push("overlap out of range");
        v.push("tile height < 2");
        let err = v.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid tiling arguments: overlap out of range; tile height < 2"
        );
    }
}
