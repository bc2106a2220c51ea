//! kirinuki-core: Pure seeded graph-cut segmentation (sans-IO).
//!
//! Turns sparse user-drawn seed markers into a per-pixel label map
//! through: jump-flooding seed propagation -> grid flow network
//! construction -> push-relabel minimum cut -> one-vs-rest label
//! merging.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! intensity and marker arrays and returns structured data. Image
//! decode/encode and all other interaction lives in the callers.
//!
//! The intensity field is an opaque scalar input: callers feed in
//! whatever per-pixel edge strength their preprocessing produces,
//! normalized to `0.0..=1.0`. Markers use `-1`/`0` for unknown, `1`
//! for background, and `2..=255` for distinct foreground objects.

pub mod diagnostics;
pub mod grid;
pub mod jfa;
pub mod network;
mod parallel;
mod sequential;
pub mod solver;
pub mod types;

use std::time::Instant;

use diagnostics::{ObjectDiagnostics, SegmentDiagnostics, StageDiagnostics, StageMetrics};
pub use grid::{Bbox, Grid};
pub use solver::SolverKind;
pub use types::{SegmentConfig, SegmentError, Segmentation};
use types::{SINK_MARKER, SOURCE_MARKER, UNKNOWN_MARKER};

/// Distinct foreground object ids present in a marker field, in
/// descending order. Background and unknown markers are not ids.
///
/// This is the id order [`segment`] processes, so callers that want
/// the default one-vs-rest behavior can pass the result through
/// unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn object_ids(markers: &[i32]) -> Vec<u8> {
    let mut present = [false; 256];
    for &m in markers {
        if (2..=255).contains(&m) {
            present[m as usize] = true;
        }
    }
    (2..=255u16)
        .rev()
        .filter(|&id| present[id as usize])
        .map(|id| id as u8)
        .collect()
}

/// Segment an intensity field into a label map.
///
/// Runs one binary cut per id in `object_ids` (deduplicated, in
/// descending order) and merges the foregrounds: wherever a cut claims
/// a pixel, its object id is written into the label map, later passes
/// overwriting earlier ones. Unclaimed pixels stay `0`.
///
/// `intensity` is the caller's per-pixel edge strength in
/// `0.0..=1.0`; `markers` follows the crate-level marker convention.
/// Ids without a single marked pixel are skipped.
///
/// # Errors
///
/// Returns [`SegmentError::DegenerateGrid`] for a zero-area grid,
/// [`SegmentError::LengthMismatch`] when `intensity` or `markers` do
/// not match it, [`SegmentError::MarkerOutOfRange`] for marker values
/// outside `-1..=255`, [`SegmentError::ReservedObjectId`] when an
/// entry of `object_ids` is below 2, and
/// [`SegmentError::InvalidConfig`] for unusable parameters.
pub fn segment(
    width: u32,
    height: u32,
    intensity: &[f32],
    markers: &[i32],
    object_ids: &[u8],
    config: &SegmentConfig,
) -> Result<Segmentation, SegmentError> {
    run(width, height, intensity, markers, object_ids, config).map(|(result, _)| result)
}

/// [`segment`] with per-stage diagnostics collected alongside the
/// label map. Skipped ids still get a diagnostics entry so runs are
/// auditable.
///
/// # Errors
///
/// Same conditions as [`segment`].
pub fn segment_with_diagnostics(
    width: u32,
    height: u32,
    intensity: &[f32],
    markers: &[i32],
    object_ids: &[u8],
    config: &SegmentConfig,
) -> Result<(Segmentation, SegmentDiagnostics), SegmentError> {
    run(width, height, intensity, markers, object_ids, config)
}

fn run(
    width: u32,
    height: u32,
    intensity: &[f32],
    markers: &[i32],
    object_ids: &[u8],
    config: &SegmentConfig,
) -> Result<(Segmentation, SegmentDiagnostics), SegmentError> {
    let total_start = Instant::now();
    let grid = Grid::new(width, height)?;
    let n = grid.pixel_count();
    if intensity.len() != n {
        return Err(SegmentError::LengthMismatch {
            name: "intensity",
            expected: n,
            actual: intensity.len(),
        });
    }
    if markers.len() != n {
        return Err(SegmentError::LengthMismatch {
            name: "markers",
            expected: n,
            actual: markers.len(),
        });
    }
    if let Some(&value) = markers.iter().find(|&&m| !(-1..=255).contains(&m)) {
        return Err(SegmentError::MarkerOutOfRange { value });
    }
    if let Some(&id) = object_ids.iter().find(|&&id| id < 2) {
        return Err(SegmentError::ReservedObjectId(id));
    }
    config.validate()?;

    let content_bbox = grid.content_bbox(intensity, config.bbox_threshold, config.bbox_padding);
    let working_bbox = content_bbox.unwrap_or_else(|| Bbox::full(grid));

    let mut ids = object_ids.to_vec();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.dedup();

    let mut labels = vec![0u8; n];
    let mut objects = Vec::with_capacity(ids.len());
    for id in ids {
        let marked_pixels = markers.iter().filter(|&&m| m == i32::from(id)).count();
        if marked_pixels == 0 {
            objects.push(ObjectDiagnostics {
                object_id: id,
                marked_pixels,
                skipped: true,
                propagation: None,
                solve: None,
            });
            continue;
        }

        let binary = temp_marker(grid, markers, id, content_bbox);

        let propagation_start = Instant::now();
        let seed_map = jfa::propagate(&grid, &binary);
        let propagation = StageDiagnostics {
            duration: propagation_start.elapsed(),
            metrics: StageMetrics::Propagation {
                sweeps: jfa::sweep_count(&grid),
                seeded_pixels: seed_map.seeded_pixels(),
                unreached_pixels: seed_map.unreached_pixels(),
            },
        };

        let solve_start = Instant::now();
        let cut = config
            .solver
            .solve(grid, intensity, &binary, &seed_map, config, working_bbox);
        let solve = StageDiagnostics {
            duration: solve_start.elapsed(),
            metrics: cut.metrics,
        };

        for (label, &m) in labels.iter_mut().zip(&cut.mask) {
            if m == 1 {
                *label = id;
            }
        }
        objects.push(ObjectDiagnostics {
            object_id: id,
            marked_pixels,
            skipped: false,
            propagation: Some(propagation),
            solve: Some(solve),
        });
    }

    let diagnostics = SegmentDiagnostics {
        image_width: width,
        image_height: height,
        pixel_count: n as u64,
        content_bbox,
        objects,
        total_duration: total_start.elapsed(),
    };
    Ok((Segmentation::new(grid, labels), diagnostics))
}

/// Binary marker field for one object pass: the target id becomes the
/// source, every other non-zero marker becomes the sink, and unknown
/// pixels outside the content box are auto-filled as sink so the cut
/// cannot leak through unmarked borders.
fn temp_marker(grid: Grid, markers: &[i32], target: u8, content_bbox: Option<Bbox>) -> Vec<i32> {
    let target = i32::from(target);
    markers
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            if m == target {
                SOURCE_MARKER
            } else if m > 0 {
                SINK_MARKER
            } else {
                let (x, y) = grid.coords(i);
                match content_bbox {
                    Some(bbox) if !bbox.contains(x, y) => SINK_MARKER,
                    _ => UNKNOWN_MARKER,
                }
            }
        })
        .collect()
}
