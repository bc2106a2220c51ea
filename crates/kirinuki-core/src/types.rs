//! Shared types for the kirinuki segmentation core.

use serde::{Deserialize, Serialize};

use crate::grid::Grid;
use crate::solver::SolverKind;

/// Marker value for pixels the user has not classified.
///
/// `-1` is accepted as a synonym so callers that initialize marker
/// buffers with a "no data" sentinel do not need a conversion pass.
pub const UNKNOWN_MARKER: i32 = 0;

/// Marker value pinning a pixel to the sink terminal (background).
pub const SINK_MARKER: i32 = 1;

/// Marker value pinning a pixel to the source terminal (foreground).
///
/// Only the binary `temp_marker` buffers handed to the propagator and
/// solvers use this value directly; caller-facing marker fields carry
/// object ids `2..=255`, each of which becomes the source marker of its
/// own one-vs-rest pass.
pub const SOURCE_MARKER: i32 = 2;

/// Configuration for a segmentation run.
///
/// All fields have defaults tuned for interactive use on normalized
/// intensity fields. The `DEFAULT_*` consts exist so CLI flag defaults
/// cannot silently diverge from [`Default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Edge-weight sensitivity: adjacent pixels p, q get capacity
    /// `exp(-(I[p]-I[q])^2 / (2 * sigma^2))`. Smaller sigma makes
    /// intensity steps harder to cut across.
    pub sigma: f64,

    /// Terminal capacity granted to every unseeded pixel, toward both
    /// source and sink. Keeps the network connected to both terminals
    /// so sparse markers still produce a meaningful cut.
    pub bias: f64,

    /// Which push-relabel variant to run.
    pub solver: SolverKind,

    /// Iteration budget for the parallel solver. The parallel variant
    /// has no convergence detection; it always runs exactly this many
    /// checkerboard iterations.
    pub max_iterations: u32,

    /// Run a global relabeling pass every this many parallel
    /// iterations. `0` disables global relabeling.
    pub global_relabel_frequency: u32,

    /// Intensity threshold for the content bounding box used to
    /// auto-fill the implicit sink border.
    pub bbox_threshold: f32,

    /// Padding in pixels added around the content bounding box before
    /// the implicit sink fill.
    pub bbox_padding: u32,
}

impl SegmentConfig {
    /// Default edge-weight sensitivity.
    pub const DEFAULT_SIGMA: f64 = 0.1;
    /// Default unseeded terminal bias.
    pub const DEFAULT_BIAS: f64 = 0.01;
    /// Default solver variant.
    pub const DEFAULT_SOLVER: SolverKind = SolverKind::Parallel;
    /// Default parallel iteration budget.
    pub const DEFAULT_MAX_ITERATIONS: u32 = 3000;
    /// Default global relabeling period.
    pub const DEFAULT_GLOBAL_RELABEL_FREQUENCY: u32 = 500;
    /// Default content bounding box intensity threshold.
    pub const DEFAULT_BBOX_THRESHOLD: f32 = 0.1;
    /// Default content bounding box padding in pixels.
    pub const DEFAULT_BBOX_PADDING: u32 = 10;

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidConfig`] if `sigma` is not a
    /// positive finite number, `bias` is negative or non-finite, or
    /// `max_iterations` is zero.
    pub fn validate(&self) -> Result<(), SegmentError> {
        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(SegmentError::InvalidConfig(format!(
                "sigma must be a positive finite number, got {}",
                self.sigma,
            )));
        }
        if !self.bias.is_finite() || self.bias < 0.0 {
            return Err(SegmentError::InvalidConfig(format!(
                "bias must be a non-negative finite number, got {}",
                self.bias,
            )));
        }
        if self.max_iterations == 0 {
            return Err(SegmentError::InvalidConfig(
                "max_iterations must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            sigma: Self::DEFAULT_SIGMA,
            bias: Self::DEFAULT_BIAS,
            solver: Self::DEFAULT_SOLVER,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            global_relabel_frequency: Self::DEFAULT_GLOBAL_RELABEL_FREQUENCY,
            bbox_threshold: Self::DEFAULT_BBOX_THRESHOLD,
            bbox_padding: Self::DEFAULT_BBOX_PADDING,
        }
    }
}

/// Final merged label map produced by [`segment`](crate::segment).
///
/// `0` means background; any other value is the object id of the
/// one-vs-rest pass that claimed the pixel last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segmentation {
    grid: Grid,
    labels: Vec<u8>,
}

impl Segmentation {
    pub(crate) const fn new(grid: Grid, labels: Vec<u8>) -> Self {
        Self { grid, labels }
    }

    /// The grid the labels are defined over.
    #[must_use]
    pub const fn grid(&self) -> Grid {
        self.grid
    }

    /// Row-major per-pixel labels.
    #[must_use]
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Consume the segmentation and return the raw label buffer.
    #[must_use]
    pub fn into_labels(self) -> Vec<u8> {
        self.labels
    }

    /// Number of pixels assigned to `id`.
    #[must_use]
    pub fn pixel_count_for(&self, id: u8) -> usize {
        self.labels.iter().filter(|&&l| l == id).count()
    }
}

/// Errors that can occur while setting up a segmentation run.
///
/// Everything past input validation is total: the solvers are pure
/// numeric transforms over fixed-size arrays with no failure paths.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    /// Grid dimensions were zero in at least one axis.
    #[error("grid dimensions must be positive, got {width}x{height}")]
    DegenerateGrid {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A per-pixel input array does not match the grid size.
    #[error("{name} has length {actual}, expected {expected} for the grid")]
    LengthMismatch {
        /// Which input was the wrong size.
        name: &'static str,
        /// `width * height` of the grid.
        expected: usize,
        /// Observed length.
        actual: usize,
    },

    /// A marker value cannot be represented in the `u8` label map.
    #[error("marker value {value} is outside the supported range -1..=255")]
    MarkerOutOfRange {
        /// Offending marker value.
        value: i32,
    },

    /// An object id collides with a reserved marker value.
    #[error("object id {0} is reserved (0 = unknown, 1 = background)")]
    ReservedObjectId(u8),

    /// A configuration parameter is out of range.
    #[error("invalid segmentation configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_consts() {
        let config = SegmentConfig::default();
        assert!((config.sigma - SegmentConfig::DEFAULT_SIGMA).abs() < f64::EPSILON);
        assert!((config.bias - SegmentConfig::DEFAULT_BIAS).abs() < f64::EPSILON);
        assert_eq!(config.solver, SolverKind::Parallel);
        assert_eq!(config.max_iterations, SegmentConfig::DEFAULT_MAX_ITERATIONS);
        assert_eq!(
            config.global_relabel_frequency,
            SegmentConfig::DEFAULT_GLOBAL_RELABEL_FREQUENCY,
        );
        assert!((config.bbox_threshold - SegmentConfig::DEFAULT_BBOX_THRESHOLD).abs() < f32::EPSILON);
        assert_eq!(config.bbox_padding, SegmentConfig::DEFAULT_BBOX_PADDING);
    }

    #[test]
    fn config_validate_rejects_bad_values() {
        let mut config = SegmentConfig::default();
        assert!(config.validate().is_ok());

        config.sigma = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SegmentError::InvalidConfig(_)),
        ));

        config.sigma = SegmentConfig::DEFAULT_SIGMA;
        config.bias = -0.5;
        assert!(matches!(
            config.validate(),
            Err(SegmentError::InvalidConfig(_)),
        ));

        config.bias = SegmentConfig::DEFAULT_BIAS;
        config.max_iterations = 0;
        assert!(matches!(
            config.validate(),
            Err(SegmentError::InvalidConfig(_)),
        ));
    }

    #[test]
    fn config_serde_round_trip() {
        let config = SegmentConfig {
            sigma: 0.25,
            bias: 0.02,
            solver: SolverKind::Sequential,
            max_iterations: 100,
            global_relabel_frequency: 10,
            bbox_threshold: 0.4,
            bbox_padding: 5,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SegmentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn error_display_strings() {
        assert_eq!(
            SegmentError::DegenerateGrid {
                width: 0,
                height: 3,
            }
            .to_string(),
            "grid dimensions must be positive, got 0x3",
        );
        assert_eq!(
            SegmentError::LengthMismatch {
                name: "intensity",
                expected: 9,
                actual: 4,
            }
            .to_string(),
            "intensity has length 4, expected 9 for the grid",
        );
        assert_eq!(
            SegmentError::ReservedObjectId(1).to_string(),
            "object id 1 is reserved (0 = unknown, 1 = background)",
        );
    }

    #[test]
    fn segmentation_accessors() {
        let grid = Grid::new(2, 2).unwrap();
        let seg = Segmentation::new(grid, vec![0, 2, 2, 3]);
        assert_eq!(seg.labels(), &[0, 2, 2, 3]);
        assert_eq!(seg.pixel_count_for(2), 2);
        assert_eq!(seg.pixel_count_for(0), 1);
        assert_eq!(seg.grid().pixel_count(), 4);
        assert_eq!(seg.into_labels(), vec![0, 2, 2, 3]);
    }
}
