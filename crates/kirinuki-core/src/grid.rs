//! Raster grid addressing: bounds, indexing, and arc enumeration.
//!
//! Every per-pixel array in this crate has length `width * height` and
//! is indexed row-major: `i = y * width + x`. The grid also owns the
//! edge-arena addressing scheme: each undirected 4-neighbor edge has a
//! stable id within its orientation family (horizontal or vertical), and
//! an [`Arc`] pairs a destination pixel with the edge coordinates needed
//! to update both directed residuals together. This replaces the four
//! separately-named directional capacity arrays of naive grid-cut
//! implementations, where the reverse array must be inferred from the
//! pixel offset.

use serde::{Deserialize, Serialize};

use crate::types::SegmentError;

/// Arc slot order used by [`Grid::arc_slots`]: right, left, down, up.
pub(crate) const SLOT_RIGHT: usize = 0;
pub(crate) const SLOT_LEFT: usize = 1;
pub(crate) const SLOT_DOWN: usize = 2;
pub(crate) const SLOT_UP: usize = 3;

/// Which edge family an arc belongs to.
///
/// Horizontal edges connect `(x, y)` to `(x+1, y)`; vertical edges
/// connect `(x, y)` to `(x, y+1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Edge between horizontally adjacent pixels.
    Horizontal,
    /// Edge between vertically adjacent pixels.
    Vertical,
}

/// Direction of travel along an edge.
///
/// `Forward` always means "toward the higher-index endpoint" (right or
/// down); `Backward` is the mirrored residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDir {
    /// Low-index endpoint to high-index endpoint (right / down).
    Forward,
    /// High-index endpoint to low-index endpoint (left / up).
    Backward,
}

/// One directed arc of the grid graph: the destination pixel plus the
/// edge-arena coordinates identifying which residual pair it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Arc {
    /// Flat index of the destination pixel.
    pub to: usize,
    /// Edge family.
    pub orientation: Orientation,
    /// Edge id within the family.
    pub edge: usize,
    /// Direction of travel along the edge.
    pub dir: ArcDir,
}

/// Immutable raster dimensions with validated, non-zero extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
}

impl Grid {
    /// Create a grid, rejecting degenerate dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::DegenerateGrid`] if either dimension is
    /// zero.
    pub const fn new(width: u32, height: u32) -> Result<Self, SegmentError> {
        if width == 0 || height == 0 {
            return Err(SegmentError::DegenerateGrid { width, height });
        }
        Ok(Self { width, height })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Flat index of `(x, y)`.
    #[must_use]
    pub const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// `(x, y)` of a flat index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn coords(&self, i: usize) -> (u32, u32) {
        let w = self.width as usize;
        ((i % w) as u32, (i / w) as u32)
    }

    /// The four neighbor arcs of pixel `i` in fixed slot order
    /// (right, left, down, up); slots that fall off the grid edge are
    /// `None`. The fixed layout lets lock-step solvers index per-slot
    /// push records without re-deriving directions.
    #[must_use]
    pub fn arc_slots(&self, i: usize) -> [Option<Arc>; 4] {
        let (x, y) = self.coords(i);
        let w = self.width as usize;
        let wm1 = self.width as usize - 1;
        let right = (x + 1 < self.width).then(|| Arc {
            to: i + 1,
            orientation: Orientation::Horizontal,
            edge: y as usize * wm1 + x as usize,
            dir: ArcDir::Forward,
        });
        let left = (x > 0).then(|| Arc {
            to: i - 1,
            orientation: Orientation::Horizontal,
            edge: y as usize * wm1 + (x as usize - 1),
            dir: ArcDir::Backward,
        });
        let down = (y + 1 < self.height).then(|| Arc {
            to: i + w,
            orientation: Orientation::Vertical,
            edge: i,
            dir: ArcDir::Forward,
        });
        let up = (y > 0).then(|| Arc {
            to: i - w,
            orientation: Orientation::Vertical,
            edge: i - w,
            dir: ArcDir::Backward,
        });
        [right, left, down, up]
    }

    /// Iterate over the existing neighbor arcs of pixel `i`.
    pub fn arcs(&self, i: usize) -> impl Iterator<Item = Arc> {
        self.arc_slots(i).into_iter().flatten()
    }

    /// Number of horizontal edges (`(width - 1) * height`).
    #[must_use]
    pub const fn horizontal_edge_count(&self) -> usize {
        (self.width as usize - 1) * self.height as usize
    }

    /// Number of vertical edges (`width * (height - 1)`).
    #[must_use]
    pub const fn vertical_edge_count(&self) -> usize {
        self.width as usize * (self.height as usize - 1)
    }

    /// Bounding box of pixels whose intensity exceeds `threshold`,
    /// grown by `padding` pixels and clamped to the grid.
    ///
    /// Returns `None` when no pixel clears the threshold. The
    /// orchestrator uses this box both to auto-fill an implicit sink
    /// border and to restrict the parallel solver's working region.
    #[must_use]
    pub fn content_bbox(&self, intensity: &[f32], threshold: f32, padding: u32) -> Option<Bbox> {
        let mut min_x = self.width;
        let mut min_y = self.height;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        let mut found = false;
        for (i, &v) in intensity.iter().enumerate() {
            if v > threshold {
                let (x, y) = self.coords(i);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                found = true;
            }
        }
        if !found {
            return None;
        }
        Some(Bbox {
            min_x: min_x.saturating_sub(padding),
            min_y: min_y.saturating_sub(padding),
            max_x: (max_x + padding).min(self.width - 1),
            max_y: (max_y + padding).min(self.height - 1),
        })
    }
}

/// Inclusive pixel bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    /// Leftmost column (inclusive).
    pub min_x: u32,
    /// Topmost row (inclusive).
    pub min_y: u32,
    /// Rightmost column (inclusive).
    pub max_x: u32,
    /// Bottom row (inclusive).
    pub max_y: u32,
}

impl Bbox {
    /// The box covering the entire grid.
    #[must_use]
    pub const fn full(grid: Grid) -> Self {
        Self {
            min_x: 0,
            min_y: 0,
            max_x: grid.width() - 1,
            max_y: grid.height() - 1,
        }
    }

    /// Box width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Box height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Whether `(x, y)` lies inside the box.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}
