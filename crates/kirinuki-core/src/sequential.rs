//! Exact queue-driven push-relabel solver.
//!
//! Runs the classic FIFO discharge loop on the grid network, with the
//! source and sink kept implicit: terminal capacities live in the
//! network's `cap_source`/`cap_sink` arrays, the source terminal sits
//! at height `N` and the sink at height 0. Excess that cannot reach
//! the sink drains back to the source through the residuals of the
//! saturated source arcs, so the loop terminates with a maximum flow
//! and the foreground mask is read off the residual graph exactly.

use std::collections::VecDeque;

use crate::diagnostics::StageMetrics;
use crate::grid::Grid;
use crate::jfa::SeedMap;
use crate::network::{FlowNetwork, RESIDUAL_EPSILON};
use crate::solver::{BinaryCut, saturate_source_arcs, saturate_terminals, seed_heights};
use crate::types::{SOURCE_MARKER, SegmentConfig};

struct State<'a> {
    net: FlowNetwork,
    markers: &'a [i32],
    heights: Vec<i32>,
    excess: Vec<f64>,
    /// Flow currently on the terminal source arc of each pixel. This
    /// is the residual of the backward arc: excess at height `N + 1`
    /// returns to the source through it.
    source_flow: Vec<f64>,
    /// Flow injected at init, kept to recover the forward residual of
    /// the terminal source arcs for mask extraction.
    source_injected: Vec<f64>,
    in_queue: Vec<bool>,
    queue: VecDeque<usize>,
    discharges: u64,
    relabels: u64,
    flow_to_sink: f64,
}

pub(crate) fn solve(
    grid: Grid,
    intensity: &[f32],
    markers: &[i32],
    seed_map: &SeedMap,
    config: &SegmentConfig,
) -> BinaryCut {
    let mut net = FlowNetwork::build(grid, intensity, markers, config.sigma, config.bias);
    let heights = seed_heights(grid, seed_map);
    let mut excess = saturate_terminals(&mut net);
    let source_injected = excess.clone();
    saturate_source_arcs(grid, &mut net, markers, &mut excess);

    let n = grid.pixel_count();
    let mut state = State {
        net,
        markers,
        heights,
        excess,
        source_flow: source_injected.clone(),
        source_injected,
        in_queue: vec![false; n],
        queue: VecDeque::new(),
        discharges: 0,
        relabels: 0,
        flow_to_sink: 0.0,
    };
    for i in 0..n {
        state.activate(i);
    }
    state.run();

    let mask = state.extract_mask(grid);
    let foreground_pixels = mask.iter().filter(|&&m| m == 1).count();
    BinaryCut {
        mask,
        metrics: StageMetrics::SequentialCut {
            total_flow: state.flow_to_sink,
            discharges: state.discharges,
            relabels: state.relabels,
            foreground_pixels,
        },
    }
}

impl State<'_> {
    fn activate(&mut self, i: usize) {
        // Source seeds are contracted into the source terminal and
        // absorb whatever flows back into them.
        if self.markers[i] == SOURCE_MARKER
            || self.in_queue[i]
            || self.excess[i] <= RESIDUAL_EPSILON
        {
            return;
        }
        self.in_queue[i] = true;
        self.queue.push_back(i);
    }

    fn run(&mut self) {
        while let Some(p) = self.queue.pop_front() {
            self.in_queue[p] = false;
            self.discharges += 1;
            self.discharge(p);
        }
    }

    /// Push excess out of `p` until it is drained, relabeling whenever
    /// no admissible arc remains. Stops early only if `p` has no
    /// residual arc left at all.
    #[allow(clippy::cast_possible_wrap)]
    fn discharge(&mut self, p: usize) {
        let grid = self.net.grid();
        let n = grid.pixel_count() as i32;
        while self.excess[p] > RESIDUAL_EPSILON {
            let h = self.heights[p];

            if h == 1 && self.net.cap_sink[p] > RESIDUAL_EPSILON {
                let amount = self.excess[p].min(self.net.cap_sink[p]);
                self.net.cap_sink[p] -= amount;
                self.excess[p] -= amount;
                self.flow_to_sink += amount;
                continue;
            }
            if h == n + 1 && self.source_flow[p] > RESIDUAL_EPSILON {
                let amount = self.excess[p].min(self.source_flow[p]);
                self.source_flow[p] -= amount;
                self.excess[p] -= amount;
                continue;
            }

            let mut pushed = false;
            for arc in grid.arcs(p) {
                if self.heights[arc.to] + 1 != h {
                    continue;
                }
                let residual = self.net.residual(arc);
                if residual <= RESIDUAL_EPSILON {
                    continue;
                }
                let amount = self.excess[p].min(residual);
                self.net.push(arc, amount);
                self.excess[p] -= amount;
                self.excess[arc.to] += amount;
                self.activate(arc.to);
                pushed = true;
                if self.excess[p] <= RESIDUAL_EPSILON {
                    break;
                }
            }
            if pushed {
                continue;
            }
            if !self.relabel(p, n) {
                return;
            }
        }
    }

    /// Lift `p` to one above its lowest residual neighbor, counting
    /// the implicit terminals (sink at 0, source at `N`). The seeded
    /// start heights are not a valid labeling, so this may also lower
    /// `p`; either way the next pass finds an admissible arc. Returns
    /// `false` when `p` has no residual arc anywhere, which strands
    /// its excess permanently.
    fn relabel(&mut self, p: usize, n: i32) -> bool {
        let mut min_height: Option<i32> = None;
        if self.net.cap_sink[p] > RESIDUAL_EPSILON {
            min_height = Some(0);
        }
        if self.source_flow[p] > RESIDUAL_EPSILON {
            min_height = Some(min_height.map_or(n, |m| m.min(n)));
        }
        for arc in self.net.grid().arcs(p) {
            if self.net.residual(arc) > RESIDUAL_EPSILON {
                let h = self.heights[arc.to];
                min_height = Some(min_height.map_or(h, |m| m.min(h)));
            }
        }
        match min_height {
            Some(m) => {
                self.heights[p] = m + 1;
                self.relabels += 1;
                true
            }
            None => false,
        }
    }

    /// Foreground is the source side of the final residual graph:
    /// everything reachable from the source terminal without crossing
    /// a saturated arc.
    fn extract_mask(&self, grid: Grid) -> Vec<u8> {
        let n = grid.pixel_count();
        let mut mask = vec![0u8; n];
        let mut stack = Vec::new();
        for i in 0..n {
            let terminal_residual = self.source_injected[i] - self.source_flow[i];
            if self.markers[i] == SOURCE_MARKER || terminal_residual > RESIDUAL_EPSILON {
                mask[i] = 1;
                stack.push(i);
            }
        }
        while let Some(p) = stack.pop() {
            for arc in grid.arcs(p) {
                if mask[arc.to] == 0 && self.net.residual(arc) > RESIDUAL_EPSILON {
                    mask[arc.to] = 1;
                    stack.push(arc.to);
                }
            }
        }
        mask
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::jfa;
    use crate::types::{SINK_MARKER, SegmentConfig};

    fn run(
        width: u32,
        height: u32,
        intensity: &[f32],
        markers: &[i32],
        config: &SegmentConfig,
    ) -> BinaryCut {
        let grid = Grid::new(width, height).unwrap();
        let seed_map = jfa::propagate(&grid, markers);
        solve(grid, intensity, markers, &seed_map, config)
    }

    /// Reference maximum flow on the same implicit-terminal network,
    /// via breadth-first augmenting paths. Nodes 0..n are pixels, `n`
    /// is the source and `n + 1` the sink.
    struct Reference {
        n: usize,
        cap: Vec<Vec<f64>>,
    }

    impl Reference {
        fn build(grid: Grid, intensity: &[f32], markers: &[i32], sigma: f64, bias: f64) -> Self {
            let n = grid.pixel_count();
            let mut cap = vec![vec![0.0f64; n + 2]; n + 2];
            let net = FlowNetwork::build(grid, intensity, markers, sigma, bias);
            for i in 0..n {
                cap[n][i] = net.cap_source(i);
                cap[i][n + 1] = net.cap_sink(i);
                for arc in grid.arcs(i) {
                    cap[i][arc.to] = net.residual(arc);
                }
            }
            Self { n, cap }
        }

        fn max_flow(&mut self) -> f64 {
            let source = self.n;
            let sink = self.n + 1;
            let mut total = 0.0;
            loop {
                let Some(parent) = self.bfs_path(source, sink) else {
                    break;
                };
                let mut bottleneck = f64::INFINITY;
                let mut v = sink;
                while v != source {
                    let u = parent[v];
                    bottleneck = bottleneck.min(self.cap[u][v]);
                    v = u;
                }
                let mut v = sink;
                while v != source {
                    let u = parent[v];
                    self.cap[u][v] -= bottleneck;
                    self.cap[v][u] += bottleneck;
                    v = u;
                }
                total += bottleneck;
            }
            total
        }

        fn bfs_path(&self, source: usize, sink: usize) -> Option<Vec<usize>> {
            let mut parent = vec![usize::MAX; self.cap.len()];
            let mut queue = VecDeque::from([source]);
            parent[source] = source;
            while let Some(u) = queue.pop_front() {
                for v in 0..self.cap.len() {
                    if parent[v] == usize::MAX && self.cap[u][v] > RESIDUAL_EPSILON {
                        parent[v] = u;
                        if v == sink {
                            return Some(parent);
                        }
                        queue.push_back(v);
                    }
                }
            }
            None
        }

        /// Source side of the residual graph after `max_flow`.
        fn min_cut_mask(&self) -> Vec<u8> {
            let mut mask = vec![0u8; self.n];
            let mut seen = vec![false; self.cap.len()];
            let mut stack = vec![self.n];
            seen[self.n] = true;
            while let Some(u) = stack.pop() {
                for v in 0..self.cap.len() {
                    if !seen[v] && self.cap[u][v] > RESIDUAL_EPSILON {
                        seen[v] = true;
                        stack.push(v);
                    }
                }
            }
            for i in 0..self.n {
                if seen[i] {
                    mask[i] = 1;
                }
            }
            mask
        }
    }

    #[test]
    fn initial_excess_equals_total_source_capacity() {
        let grid = Grid::new(4, 4).unwrap();
        let intensity = vec![0.5f32; 16];
        let mut markers = vec![0i32; 16];
        markers[5] = SOURCE_MARKER;
        markers[0] = SINK_MARKER;
        let bias = 0.01;
        let mut net = FlowNetwork::build(grid, &intensity, &markers, 0.1, bias);
        let excess = saturate_terminals(&mut net);
        let total: f64 = excess.iter().sum();
        let expected = net.seed_capacity() + 14.0 * bias;
        assert!((total - expected).abs() < 1e-9);
    }

    #[test]
    fn matches_reference_flow_and_cut_on_step_image() {
        // Left half dark, right half bright, seeds on either side of
        // the step. Zero bias keeps the reference network small and
        // the cut crisp.
        let (w, h) = (5u32, 5u32);
        let mut intensity = vec![0.0f32; 25];
        for y in 0..5 {
            for x in 3..5 {
                intensity[y * 5 + x] = 1.0;
            }
        }
        let mut markers = vec![0i32; 25];
        markers[2 * 5] = SINK_MARKER;
        markers[2 * 5 + 4] = SOURCE_MARKER;
        let config = SegmentConfig {
            bias: 0.0,
            ..SegmentConfig::default()
        };

        let cut = run(w, h, &intensity, &markers, &config);

        let grid = Grid::new(w, h).unwrap();
        let mut reference = Reference::build(grid, &intensity, &markers, config.sigma, config.bias);
        let expected_flow = reference.max_flow();
        let expected_mask = reference.min_cut_mask();

        let StageMetrics::SequentialCut { total_flow, .. } = cut.metrics else {
            panic!("sequential solver must report sequential metrics");
        };
        assert!(
            (total_flow - expected_flow).abs() < 1e-6,
            "flow {total_flow} vs reference {expected_flow}"
        );
        assert_eq!(cut.mask, expected_mask);
        // The bright half is the foreground, the dark half is not.
        assert_eq!(cut.mask[2 * 5 + 4], 1);
        assert_eq!(cut.mask[2 * 5], 0);
    }

    #[test]
    fn matches_reference_on_noisy_image_with_bias() {
        let (w, h) = (4u32, 4u32);
        let intensity: Vec<f32> = (0..16).map(|i| f32::from(i as u8) / 20.0).collect();
        let mut markers = vec![0i32; 16];
        markers[0] = SINK_MARKER;
        markers[15] = SOURCE_MARKER;
        let config = SegmentConfig::default();

        let cut = run(w, h, &intensity, &markers, &config);

        let grid = Grid::new(w, h).unwrap();
        let mut reference = Reference::build(grid, &intensity, &markers, config.sigma, config.bias);
        let expected_flow = reference.max_flow();
        let expected_mask = reference.min_cut_mask();

        let StageMetrics::SequentialCut { total_flow, .. } = cut.metrics else {
            panic!("sequential solver must report sequential metrics");
        };
        assert!((total_flow - expected_flow).abs() < 1e-6);
        assert_eq!(cut.mask, expected_mask);
    }

    #[test]
    fn isolated_source_claims_only_itself() {
        // A single source seed in a field of sink seeds: every grid
        // arc out of the seed saturates at init and the cut hugs it.
        let mut markers = vec![SINK_MARKER; 9];
        markers[4] = SOURCE_MARKER;
        let intensity = vec![0.5f32; 9];
        let cut = run(3, 3, &intensity, &markers, &SegmentConfig::default());
        assert_eq!(cut.mask.iter().filter(|&&m| m == 1).count(), 1);
        assert_eq!(cut.mask[4], 1);
    }
}
