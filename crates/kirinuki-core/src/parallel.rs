//! Data-parallel checkerboard push-relabel solver.
//!
//! Pixels of one checkerboard parity step together: each active pixel
//! plans its pushes and relabel against a frozen snapshot of the
//! network, then all plans are applied in a gather pass. Adjacent
//! pixels always have opposite parity, so every residual edge and
//! every height cell has exactly one writer per step and the whole
//! iteration runs as flat [`rayon`] loops with no locking.
//!
//! The solver runs a fixed iteration budget with periodic global
//! relabeling instead of detecting convergence, and decides the
//! foreground by height threshold rather than by exact residual
//! reachability. The sequential solver is the authority; this one
//! trades a bounded amount of accuracy for throughput on large grids.

use rayon::prelude::*;

use crate::diagnostics::StageMetrics;
use crate::grid::{Bbox, Grid, SLOT_DOWN, SLOT_LEFT, SLOT_RIGHT, SLOT_UP};
use crate::jfa::SeedMap;
use crate::network::{FlowNetwork, RESIDUAL_EPSILON};
use crate::solver::{
    BinaryCut, HEIGHT_UNREACHABLE, saturate_source_arcs, saturate_terminals, seed_heights,
};
use crate::types::{SINK_MARKER, SOURCE_MARKER, SegmentConfig};

/// One pixel's plan for a lock-step iteration, computed against frozen
/// state. `arcs` is slot-indexed to match [`Grid::arc_slots`].
#[derive(Debug, Clone, Copy)]
struct StepDecision {
    sink: f64,
    arcs: [f64; 4],
    new_height: i32,
}

struct State<'a> {
    net: FlowNetwork,
    markers: &'a [i32],
    bbox: Bbox,
    heights: Vec<i32>,
    excess: Vec<f64>,
}

pub(crate) fn solve(
    grid: Grid,
    intensity: &[f32],
    markers: &[i32],
    seed_map: &SeedMap,
    config: &SegmentConfig,
    bbox: Bbox,
) -> BinaryCut {
    let mut net = FlowNetwork::build(grid, intensity, markers, config.sigma, config.bias);
    let heights = seed_heights(grid, seed_map);
    let mut excess = saturate_terminals(&mut net);
    saturate_source_arcs(grid, &mut net, markers, &mut excess);

    let mut state = State {
        net,
        markers,
        bbox,
        heights,
        excess,
    };

    let n = grid.pixel_count();
    let mut decisions = vec![
        StepDecision {
            sink: 0.0,
            arcs: [0.0; 4],
            new_height: 0,
        };
        n
    ];
    let mut global_relabels = 0u32;
    for iteration in 0..config.max_iterations {
        if config.global_relabel_frequency > 0
            && iteration > 0
            && iteration % config.global_relabel_frequency == 0
        {
            state.global_relabel(grid);
            global_relabels += 1;
        }
        let parity = iteration % 2;
        {
            let frozen = &state;
            decisions
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, d)| *d = frozen.decide(grid, i, parity));
        }
        state.apply(grid, &decisions);
    }
    state.global_relabel(grid);
    global_relabels += 1;

    state.finish(grid, config.max_iterations, global_relabels)
}

impl State<'_> {
    /// Plan pixel `i`'s step. Inactive pixels (wrong parity, seeded,
    /// outside the working box, or without excess) return a no-op plan
    /// that carries their current height through the gather pass.
    fn decide(&self, grid: Grid, i: usize, parity: u32) -> StepDecision {
        let h = self.heights[i];
        let mut d = StepDecision {
            sink: 0.0,
            arcs: [0.0; 4],
            new_height: h,
        };
        let (x, y) = grid.coords(i);
        if (x + y) % 2 != parity
            || !self.bbox.contains(x, y)
            || self.markers[i] == SOURCE_MARKER
            || self.markers[i] == SINK_MARKER
        {
            return d;
        }
        let mut remaining = self.excess[i];
        if remaining <= RESIDUAL_EPSILON {
            return d;
        }

        let mut pushed = false;
        if h == 1 && self.net.cap_sink[i] > RESIDUAL_EPSILON {
            let amount = remaining.min(self.net.cap_sink[i]);
            d.sink = amount;
            remaining -= amount;
            pushed = true;
        }
        for (slot, arc) in grid.arc_slots(i).iter().enumerate() {
            if remaining <= RESIDUAL_EPSILON {
                break;
            }
            let Some(arc) = arc else { continue };
            if self.heights[arc.to] + 1 != h {
                continue;
            }
            let residual = self.net.residual(*arc);
            if residual <= RESIDUAL_EPSILON {
                continue;
            }
            let amount = remaining.min(residual);
            d.arcs[slot] = amount;
            remaining -= amount;
            pushed = true;
        }

        if !pushed {
            let mut min_height: Option<i32> = None;
            if self.net.cap_sink[i] > RESIDUAL_EPSILON {
                min_height = Some(0);
            }
            for arc in grid.arcs(i) {
                if self.net.residual(arc) > RESIDUAL_EPSILON {
                    let neighbor = self.heights[arc.to];
                    min_height = Some(min_height.map_or(neighbor, |m| m.min(neighbor)));
                }
            }
            if let Some(m) = min_height {
                d.new_height = m.saturating_add(1);
            }
        }
        d
    }

    /// Gather-apply all plans. Every mutated cell has exactly one
    /// contributing active pixel per field except excess, which sums
    /// its own outflow against the inbound slot amounts of its four
    /// neighbors.
    fn apply(&mut self, grid: Grid, decisions: &[StepDecision]) {
        self.heights
            .par_iter_mut()
            .zip(decisions.par_iter())
            .for_each(|(h, d)| *h = d.new_height);

        self.net
            .cap_sink
            .par_iter_mut()
            .zip(decisions.par_iter())
            .for_each(|(c, d)| *c -= d.sink);

        let w = grid.width() as usize;
        self.net
            .horizontal
            .forward
            .par_iter_mut()
            .zip(self.net.horizontal.backward.par_iter_mut())
            .enumerate()
            .for_each(|(e, (forward, backward))| {
                let a = (e / (w - 1)) * w + e % (w - 1);
                let net_push = decisions[a].arcs[SLOT_RIGHT] - decisions[a + 1].arcs[SLOT_LEFT];
                *forward -= net_push;
                *backward += net_push;
            });
        self.net
            .vertical
            .forward
            .par_iter_mut()
            .zip(self.net.vertical.backward.par_iter_mut())
            .enumerate()
            .for_each(|(e, (forward, backward))| {
                let net_push = decisions[e].arcs[SLOT_DOWN] - decisions[e + w].arcs[SLOT_UP];
                *forward -= net_push;
                *backward += net_push;
            });

        self.excess.par_iter_mut().enumerate().for_each(|(i, e)| {
            let own = &decisions[i];
            *e -= own.sink + own.arcs.iter().sum::<f64>();
            for (slot, arc) in grid.arc_slots(i).iter().enumerate() {
                if let Some(arc) = arc {
                    // A neighbor pushes into `i` through the slot
                    // opposite ours; opposite slots differ in bit 0.
                    *e += decisions[arc.to].arcs[slot ^ 1];
                }
            }
        });
    }

    /// Replace all heights with exact residual distances to the sink,
    /// computed by ping-pong relaxation. Pixels the sink cannot be
    /// reached from are lifted to [`HEIGHT_UNREACHABLE`], as are
    /// source seeds so no flow is planned into them afterwards.
    fn global_relabel(&mut self, grid: Grid) {
        let n = grid.pixel_count();
        let mut cur = vec![HEIGHT_UNREACHABLE; n];
        for (i, &m) in self.markers.iter().enumerate() {
            if m == SINK_MARKER {
                cur[i] = 0;
            }
        }
        let mut next = vec![0i32; n];
        let sweeps = (self.bbox.width() + self.bbox.height()) as usize;
        for _ in 0..sweeps {
            let frozen = &*self;
            next.par_iter_mut().enumerate().for_each(|(i, out)| {
                let mut best = cur[i];
                if frozen.net.cap_sink[i] > RESIDUAL_EPSILON {
                    best = best.min(1);
                }
                for arc in grid.arcs(i) {
                    if frozen.net.residual(arc) > RESIDUAL_EPSILON {
                        best = best.min(cur[arc.to].saturating_add(1));
                    }
                }
                *out = best;
            });
            std::mem::swap(&mut cur, &mut next);
        }
        for (i, h) in self.heights.iter_mut().enumerate() {
            *h = if self.markers[i] == SOURCE_MARKER {
                HEIGHT_UNREACHABLE
            } else {
                cur[i]
            };
        }
    }

    /// Height-threshold foreground decision plus the height statistics
    /// reported in diagnostics.
    #[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
    fn finish(&self, grid: Grid, iterations: u32, global_relabels: u32) -> BinaryCut {
        let threshold = (2 * (self.bbox.width() + self.bbox.height())) as i32;
        let n = grid.pixel_count();
        let mut mask = vec![0u8; n];
        for (i, m) in mask.iter_mut().enumerate() {
            let (x, y) = grid.coords(i);
            if self.markers[i] == SOURCE_MARKER {
                *m = 1;
            } else if self.markers[i] != SINK_MARKER
                && self.bbox.contains(x, y)
                && self.heights[i] >= threshold
            {
                *m = 1;
            }
        }

        let mut min_height = i32::MAX;
        let mut max_finite_height = 0i32;
        let mut finite_sum = 0i64;
        let mut finite_count = 0u64;
        let mut unreachable_pixels = 0usize;
        for &h in &self.heights {
            min_height = min_height.min(h);
            if h >= HEIGHT_UNREACHABLE {
                unreachable_pixels += 1;
            } else {
                max_finite_height = max_finite_height.max(h);
                finite_sum += i64::from(h);
                finite_count += 1;
            }
        }
        let mean_finite_height = if finite_count == 0 {
            0.0
        } else {
            finite_sum as f64 / finite_count as f64
        };

        let foreground_pixels = mask.iter().filter(|&&m| m == 1).count();
        BinaryCut {
            mask,
            metrics: StageMetrics::ParallelCut {
                iterations,
                global_relabels,
                threshold,
                min_height,
                max_finite_height,
                mean_finite_height,
                unreachable_pixels,
                foreground_pixels,
            },
        }
    }
}
