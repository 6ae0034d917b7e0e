use serde_derive::{Deserialize, Serialize};

use crate::error::{TileError, Violations};

/// Largest accepted overlap fraction.
pub const MAX_OVERLAP: f64 = 0.9;

/// Smallest tile dimension, in pixels.
pub const MIN_TILE_PIXELS: usize = 2;

/// Requested tile dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TileSize {
    Pixels { height: usize, width: usize },
    Meters { height: f64, width: f64 },
}

/// Tiling parameters as supplied by the caller. Exactly one
/// of the two size options must be set; this is checked by
/// [`TileConfig::validate`], not on construction.
///
/// Sizes are `(height, width)` tuples.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileConfig {
    #[serde(default)]
    size_in_pixels: Option<(usize, usize)>,
    #[serde(default)]
    size_in_meters: Option<(f64, f64)>,
    #[serde(default)]
    overlap: f64,
}

/// Constructors
impl TileConfig {
    pub fn in_pixels(height: usize, width: usize) -> Self {
        TileConfig::default().with_size_in_pixels(height, width)
    }

    pub fn in_meters(height: f64, width: f64) -> Self {
        TileConfig::default().with_size_in_meters(height, width)
    }
}

/// Builder methods
impl TileConfig {
    pub fn with_size_in_pixels(mut self, height: usize, width: usize) -> Self {
        self.size_in_pixels = Some((height, width));
        self
    }

    pub fn with_size_in_meters(mut self, height: f64, width: f64) -> Self {
        self.size_in_meters = Some((height, width));
        self
    }

    /// Fraction of a tile shared with each neighbour.
    pub fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = overlap;
        self
    }
}

impl TileConfig {
    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    /// Check every constraint on the parameters, reporting all
    /// violations at once.
    pub fn validate(&self) -> Result<TileSize, TileError> {
        let mut violations = Violations::new();

        if !(self.overlap >= 0. && self.overlap <= MAX_OVERLAP) {
            violations.push(format!(
                "tile overlap must be in [0, {}]: got {}",
                MAX_OVERLAP, self.overlap
            ));
        }

        let size = match (self.size_in_pixels, self.size_in_meters) {
            (Some(_), Some(_)) => {
                violations.push("only one of tile size in pixels and tile size in meters may be given");
                None
            }
            (None, None) => {
                violations.push("a tile size in pixels or in meters is required");
                None
            }
            (Some((height, width)), None) => {
                for (name, val) in &[("height", height), ("width", width)] {
                    if *val < MIN_TILE_PIXELS {
                        violations.push(format!(
                            "tile {} must be at least {} pixels: got {}",
                            name, MIN_TILE_PIXELS, val
                        ));
                    }
                }
                Some(TileSize::Pixels { height, width })
            }
            (None, Some((height, width))) => {
                for (name, val) in &[("height", height), ("width", width)] {
                    if !(val.is_finite() && *val > 0.) {
                        violations.push(format!(
                            "tile {} in meters must be positive: got {}",
                            name, val
                        ));
                    }
                }
                Some(TileSize::Meters { height, width })
            }
        };

        violations.into_result()?;
        size.ok_or_else(|| TileError::InvalidArgument(Violations::single("missing tile size")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violations(cfg: TileConfig) -> Violations {
        match cfg.validate() {
            Err(TileError::InvalidArgument(v)) => v,
            other => panic!("expected invalid argument, got {:?}", other),
        }
    }

    #[test]
    fn valid_configs() {
        assert_eq!(
            TileConfig::in_pixels(400, 300).with_overlap(0.5).validate().unwrap(),
            TileSize::Pixels {
                height: 400,
                width: 300
            }
        );
        assert_eq!(
            TileConfig::in_meters(25., 50.).with_overlap(0.9).validate().unwrap(),
            TileSize::Meters {
                height: 25.,
                width: 50.
            }
        );
    }

    #[test]
    fn both_sizes_rejected() {
        let v = violations(TileConfig::in_pixels(10, 10).with_size_in_meters(10., 10.));
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn no_size_rejected() {
        let v = violations(TileConfig::default());
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn reports_every_violation() {
        let v = violations(TileConfig::in_pixels(1, 0).with_overlap(0.95));
        assert_eq!(v.len(), 3);

        let v = violations(TileConfig::in_meters(-1., f64::NAN).with_overlap(f64::NAN));
        assert_eq!(v.len(), 3);
        assert!(v.iter().any(|m| m.contains("overlap")));
    }

    #[test]
    fn from_json() {
        let cfg: TileConfig =
            serde_json::from_str(r#"{"size_in_meters": [100.0, 50.0], "overlap": 0.25}"#).unwrap();
        assert_eq!(cfg, TileConfig::in_meters(100., 50.).with_overlap(0.25));

        let cfg: TileConfig = serde_json::from_str(r#"{"size_in_pixels": [64, 64]}"#).unwrap();
        assert_eq!(cfg.overlap(), 0.);
    }
}
