//! Flow network construction over the pixel grid.
//!
//! Capacities between 4-adjacent pixels come from a Gaussian intensity
//! similarity: `exp(-(I[p]-I[q])^2 / (2 * sigma^2))`, symmetric at
//! build time. Terminal capacities pin seeded pixels to their terminal
//! with an effectively infinite capacity and give every unseeded pixel
//! a small symmetric `bias` toward both terminals.
//!
//! Residuals live in an edge-indexed arena: each undirected edge stores
//! both directed residuals side by side, and a push through an
//! [`Arc`](crate::grid::Arc) updates the pair in one place. The reverse
//! residual can therefore never drift out of sync with the forward one.

use crate::grid::{Arc, ArcDir, Grid, Orientation};

/// Residuals below this magnitude are treated as exhausted, both while
/// discharging and during residual-graph reachability walks.
pub const RESIDUAL_EPSILON: f64 = 1e-12;

/// Both directed residuals of one edge family, indexed by edge id.
///
/// `forward[e]` is the residual toward the higher-index endpoint
/// (right or down); `backward[e]` the mirrored residual.
#[derive(Debug, Clone)]
pub struct EdgeSet {
    pub(crate) forward: Vec<f64>,
    pub(crate) backward: Vec<f64>,
}

impl EdgeSet {
    fn zeroed(len: usize) -> Self {
        Self {
            forward: vec![0.0; len],
            backward: vec![0.0; len],
        }
    }

    fn set_symmetric(&mut self, edge: usize, capacity: f64) {
        self.forward[edge] = capacity;
        self.backward[edge] = capacity;
    }

    /// Residual capacity of edge `edge` in direction `dir`.
    #[must_use]
    pub fn residual(&self, edge: usize, dir: ArcDir) -> f64 {
        match dir {
            ArcDir::Forward => self.forward[edge],
            ArcDir::Backward => self.backward[edge],
        }
    }

    /// Push `amount` of flow along `dir`: the forward residual shrinks
    /// and the mirrored residual grows by the same amount.
    pub fn push_flow(&mut self, edge: usize, dir: ArcDir, amount: f64) {
        match dir {
            ArcDir::Forward => {
                self.forward[edge] -= amount;
                self.backward[edge] += amount;
            }
            ArcDir::Backward => {
                self.backward[edge] -= amount;
                self.forward[edge] += amount;
            }
        }
    }

    /// Number of edges in this family.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the family has no edges (degenerate 1-wide or 1-tall
    /// grids).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Residual flow network for one binary cut.
///
/// Rebuilt fresh for every solver invocation; solvers consume it as
/// scratch state.
#[derive(Debug, Clone)]
pub struct FlowNetwork {
    grid: Grid,
    pub(crate) horizontal: EdgeSet,
    pub(crate) vertical: EdgeSet,
    pub(crate) cap_source: Vec<f64>,
    pub(crate) cap_sink: Vec<f64>,
    seed_capacity: f64,
}

impl FlowNetwork {
    /// Terminal capacity used for seeded pixels.
    ///
    /// Must never be the limiting arc of a cut, so it is derived from
    /// the maximum finite capacity a pixel can have: four unit-scale
    /// grid edges plus both terminal bias arcs, with margin.
    #[must_use]
    pub fn seed_capacity_for(bias: f64) -> f64 {
        2.0f64.mul_add(bias, 4.0) + 1.0
    }

    /// Build the network from intensity and a binary marker field
    /// (values [`SOURCE_MARKER`](crate::types::SOURCE_MARKER),
    /// [`SINK_MARKER`](crate::types::SINK_MARKER), or unseeded).
    ///
    /// `intensity` and `markers` must both have length
    /// `grid.pixel_count()`. Border pixels simply have fewer arcs; no
    /// wrap-around.
    #[must_use]
    pub fn build(grid: Grid, intensity: &[f32], markers: &[i32], sigma: f64, bias: f64) -> Self {
        debug_assert_eq!(intensity.len(), grid.pixel_count());
        debug_assert_eq!(markers.len(), grid.pixel_count());

        let w = grid.width() as usize;
        let h = grid.height() as usize;
        let mut horizontal = EdgeSet::zeroed(grid.horizontal_edge_count());
        let mut vertical = EdgeSet::zeroed(grid.vertical_edge_count());

        for y in 0..h {
            for x in 0..w.saturating_sub(1) {
                let i = y * w + x;
                horizontal.set_symmetric(
                    y * (w - 1) + x,
                    similarity(intensity[i], intensity[i + 1], sigma),
                );
            }
        }
        for y in 0..h.saturating_sub(1) {
            for x in 0..w {
                let i = y * w + x;
                vertical.set_symmetric(i, similarity(intensity[i], intensity[i + w], sigma));
            }
        }

        let seed_capacity = Self::seed_capacity_for(bias);
        let mut cap_source = vec![0.0f64; grid.pixel_count()];
        let mut cap_sink = vec![0.0f64; grid.pixel_count()];
        for (i, &m) in markers.iter().enumerate() {
            if m == crate::types::SOURCE_MARKER {
                cap_source[i] = seed_capacity;
            } else if m == crate::types::SINK_MARKER {
                cap_sink[i] = seed_capacity;
            } else {
                cap_source[i] = bias;
                cap_sink[i] = bias;
            }
        }

        Self {
            grid,
            horizontal,
            vertical,
            cap_source,
            cap_sink,
            seed_capacity,
        }
    }

    /// The grid this network is defined over.
    #[must_use]
    pub const fn grid(&self) -> Grid {
        self.grid
    }

    /// The terminal capacity assigned to seeded pixels.
    #[must_use]
    pub const fn seed_capacity(&self) -> f64 {
        self.seed_capacity
    }

    /// Residual capacity along `arc`.
    #[must_use]
    pub fn residual(&self, arc: Arc) -> f64 {
        match arc.orientation {
            Orientation::Horizontal => self.horizontal.residual(arc.edge, arc.dir),
            Orientation::Vertical => self.vertical.residual(arc.edge, arc.dir),
        }
    }

    /// Push `amount` along `arc`, updating both directed residuals of
    /// the underlying edge.
    pub fn push(&mut self, arc: Arc, amount: f64) {
        match arc.orientation {
            Orientation::Horizontal => self.horizontal.push_flow(arc.edge, arc.dir, amount),
            Orientation::Vertical => self.vertical.push_flow(arc.edge, arc.dir, amount),
        }
    }

    /// Remaining source-terminal capacity of pixel `i`.
    #[must_use]
    pub fn cap_source(&self, i: usize) -> f64 {
        self.cap_source[i]
    }

    /// Remaining sink-terminal capacity of pixel `i`.
    #[must_use]
    pub fn cap_sink(&self, i: usize) -> f64 {
        self.cap_sink[i]
    }
}

/// Gaussian intensity similarity between two adjacent pixels.
fn similarity(a: f32, b: f32, sigma: f64) -> f64 {
    let d = f64::from(a) - f64::from(b);
    (-(d * d) / (2.0 * sigma * sigma)).exp()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{SINK_MARKER, SOURCE_MARKER};

    fn uniform_network(w: u32, h: u32) -> FlowNetwork {
        let grid = Grid::new(w, h).unwrap();
        let intensity = vec![0.5f32; grid.pixel_count()];
        let markers = vec![0i32; grid.pixel_count()];
        FlowNetwork::build(grid, &intensity, &markers, 0.1, 0.01)
    }

    #[test]
    fn uniform_intensity_gives_unit_capacities() {
        let net = uniform_network(3, 3);
        for e in 0..net.horizontal.len() {
            assert!((net.horizontal.residual(e, ArcDir::Forward) - 1.0).abs() < 1e-12);
            assert!((net.horizontal.residual(e, ArcDir::Backward) - 1.0).abs() < 1e-12);
        }
        for e in 0..net.vertical.len() {
            assert!((net.vertical.residual(e, ArcDir::Forward) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn intensity_step_weakens_the_crossing_edge() {
        let grid = Grid::new(2, 1).unwrap();
        let intensity = vec![0.0f32, 1.0];
        let markers = vec![0i32; 2];
        let net = FlowNetwork::build(grid, &intensity, &markers, 0.1, 0.0);
        // exp(-1 / 0.02) is astronomically small.
        assert!(net.horizontal.residual(0, ArcDir::Forward) < 1e-20);
    }

    #[test]
    fn capacities_are_symmetric_at_build() {
        let grid = Grid::new(4, 3).unwrap();
        let intensity: Vec<f32> = (0..grid.pixel_count()).map(|i| i as f32 / 12.0).collect();
        let markers = vec![0i32; grid.pixel_count()];
        let net = FlowNetwork::build(grid, &intensity, &markers, 0.2, 0.01);
        for i in 0..grid.pixel_count() {
            for arc in grid.arcs(i) {
                let back = grid
                    .arcs(arc.to)
                    .find(|b| b.to == i)
                    .unwrap();
                assert!(
                    (net.residual(arc) - net.residual(back)).abs() < 1e-12,
                    "asymmetric capacity between {i} and {}",
                    arc.to,
                );
            }
        }
    }

    #[test]
    fn terminal_capacities_follow_markers() {
        let grid = Grid::new(3, 1).unwrap();
        let intensity = vec![0.5f32; 3];
        let markers = vec![SOURCE_MARKER, 0, SINK_MARKER];
        let bias = 0.01;
        let net = FlowNetwork::build(grid, &intensity, &markers, 0.1, bias);

        let seed = net.seed_capacity();
        assert!((net.cap_source(0) - seed).abs() < 1e-12);
        assert!(net.cap_sink(0).abs() < 1e-12);

        assert!((net.cap_source(1) - bias).abs() < 1e-12);
        assert!((net.cap_sink(1) - bias).abs() < 1e-12);

        assert!(net.cap_source(2).abs() < 1e-12);
        assert!((net.cap_sink(2) - seed).abs() < 1e-12);
    }

    #[test]
    fn seed_capacity_dominates_finite_incident_capacity() {
        // A pixel's finite incident capacity is at most four unit
        // edges plus both bias arcs; the seed capacity must exceed it.
        let bias = 0.01;
        assert!(FlowNetwork::seed_capacity_for(bias) > 4.0 + 2.0 * bias);
    }

    #[test]
    fn push_updates_both_residuals() {
        let mut net = uniform_network(2, 2);
        let grid = net.grid();
        let arc = grid.arcs(0).next().unwrap(); // 0 -> 1, horizontal forward
        let before_fwd = net.residual(arc);
        net.push(arc, 0.25);
        assert!((net.residual(arc) - (before_fwd - 0.25)).abs() < 1e-12);

        let back = grid.arcs(arc.to).find(|b| b.to == 0).unwrap();
        assert!((net.residual(back) - (1.0 + 0.25)).abs() < 1e-12);

        // Pushing back restores the original state.
        net.push(back, 0.25);
        assert!((net.residual(arc) - before_fwd).abs() < 1e-12);
        assert!((net.residual(back) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_column_grid_has_no_horizontal_edges() {
        let net = uniform_network(1, 5);
        assert!(net.horizontal.is_empty());
        assert_eq!(net.vertical.len(), 4);
    }
}
