//! Pluggable push-relabel execution strategies.
//!
//! Both variants consume the same flow network and JFA-seeded heights
//! and expose the same contract: a binary foreground mask over the
//! grid. The sequential variant is the exact reference; the parallel
//! variant is a bounded-iteration approximation of it (see the module
//! docs of [`crate::parallel`]).

use serde::{Deserialize, Serialize};

use crate::diagnostics::StageMetrics;
use crate::grid::{Bbox, Grid};
use crate::jfa::SeedMap;
use crate::network::{FlowNetwork, RESIDUAL_EPSILON};
use crate::types::{SegmentConfig, SINK_MARKER, SOURCE_MARKER};

/// Height sentinel for pixels the global relabeling BFS never reached.
/// Half of `i32::MAX` leaves headroom for the `+1` in relabel steps.
pub(crate) const HEIGHT_UNREACHABLE: i32 = i32::MAX / 2;

/// Which push-relabel variant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// Queue-driven exact solver with residual-graph result
    /// extraction. Authoritative but single-threaded.
    Sequential,
    /// Checkerboard lock-step solver with periodic global relabeling
    /// and a height-threshold decision. Approximate but data-parallel.
    #[default]
    Parallel,
}

/// Result of one binary cut: the foreground mask plus solver metrics
/// for diagnostics.
#[derive(Debug, Clone)]
pub struct BinaryCut {
    /// Per-pixel foreground flag (1 = source side).
    pub mask: Vec<u8>,
    /// Solver-specific counters and statistics.
    pub metrics: StageMetrics,
}

impl SolverKind {
    /// Run one binary cut.
    ///
    /// `markers` is a binary marker field (`2` = source, `1` = sink,
    /// other = unseeded), `seed_map` the propagation result for the
    /// same field, and `bbox` the working region the parallel variant
    /// restricts itself to (the sequential variant always works the
    /// full grid; pixels outside the box are expected to carry sink
    /// markers already).
    #[must_use]
    pub fn solve(
        self,
        grid: Grid,
        intensity: &[f32],
        markers: &[i32],
        seed_map: &SeedMap,
        config: &SegmentConfig,
        bbox: Bbox,
    ) -> BinaryCut {
        match self {
            Self::Sequential => crate::sequential::solve(grid, intensity, markers, seed_map, config),
            Self::Parallel => crate::parallel::solve(grid, intensity, markers, seed_map, config, bbox),
        }
    }
}

/// Initial heights from the nearest-seed split: pixels nearest a sink
/// seed start low (their distance), pixels nearest a source seed start
/// high (`N - distance`). This is what makes jump flooding a
/// prerequisite for fast convergence: the initial height field already
/// slopes from the source region down toward the sink region.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn seed_heights(grid: Grid, seed_map: &SeedMap) -> Vec<i32> {
    let n = grid.pixel_count() as i32;
    seed_map
        .labels
        .iter()
        .zip(&seed_map.distances)
        .map(|(&label, &dist)| {
            if label < 0 || !dist.is_finite() {
                0
            } else if label == SINK_MARKER {
                dist as i32
            } else {
                n - dist as i32
            }
        })
        .collect()
}

/// Saturate every terminal source arc: each pixel's remaining source
/// capacity becomes excess and the arc drops to zero residual. Returns
/// the excess array.
pub(crate) fn saturate_terminals(net: &mut FlowNetwork) -> Vec<f64> {
    let mut excess = vec![0.0f64; net.grid().pixel_count()];
    for (ex, cap) in excess.iter_mut().zip(net.cap_source.iter_mut()) {
        if *cap > RESIDUAL_EPSILON {
            *ex = *cap;
            *cap = 0.0;
        }
    }
    excess
}

/// Saturate every grid arc out of each source seed (skipping arcs into
/// other source seeds), contracting the seed set into the source
/// terminal. Seeds are pinned afterwards: they never discharge, so any
/// flow that later returns to them is absorbed.
pub(crate) fn saturate_source_arcs(
    grid: Grid,
    net: &mut FlowNetwork,
    markers: &[i32],
    excess: &mut [f64],
) {
    for (i, &m) in markers.iter().enumerate() {
        if m != SOURCE_MARKER {
            continue;
        }
        for arc in grid.arcs(i) {
            if markers[arc.to] == SOURCE_MARKER {
                continue;
            }
            let amount = net.residual(arc);
            if amount > RESIDUAL_EPSILON {
                net.push(arc, amount);
                excess[i] -= amount;
                excess[arc.to] += amount;
            }
        }
    }
}
