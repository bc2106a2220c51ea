//! Segmentation diagnostics: timing, counts, and solver statistics
//! for each per-object pass.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning and solver comparison. Every call to
//! [`segment_with_diagnostics`](crate::segment_with_diagnostics)
//! collects diagnostics alongside the label map.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::grid::Bbox;

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single segmentation run.
///
/// One [`ObjectDiagnostics`] entry is collected per object id, in the
/// order the one-vs-rest passes executed (descending id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDiagnostics {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Content bounding box used for the implicit sink fill, `None`
    /// when no pixel cleared the intensity threshold.
    pub content_bbox: Option<Bbox>,
    /// Per-object pass diagnostics, in execution order.
    pub objects: Vec<ObjectDiagnostics>,
    /// Total wall-clock duration of the entire run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for one object's one-vs-rest pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDiagnostics {
    /// The object id this pass segmented.
    pub object_id: u8,
    /// Number of pixels marked with this id in the input.
    pub marked_pixels: usize,
    /// Whether the pass was skipped (no marked pixels).
    pub skipped: bool,
    /// Seed propagation metrics, `None` when the pass was skipped.
    pub propagation: Option<StageDiagnostics>,
    /// Min-cut solve metrics, `None` when the pass was skipped.
    pub solve: Option<StageDiagnostics>,
}

/// Diagnostics for a single stage of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, flow, heights).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by stage and solver variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Jump-flooding seed propagation metrics.
    Propagation {
        /// Number of halving sweeps executed.
        sweeps: u32,
        /// Pixels carrying a seed in the input field.
        seeded_pixels: usize,
        /// Pixels no seed propagated to (only when there are no seeds
        /// at all).
        unreached_pixels: usize,
    },
    /// Exact sequential push-relabel metrics.
    SequentialCut {
        /// Total flow pushed into the sink.
        total_flow: f64,
        /// Discharge operations executed.
        discharges: u64,
        /// Relabel operations executed.
        relabels: u64,
        /// Pixels on the source side of the cut.
        foreground_pixels: usize,
    },
    /// Checkerboard parallel push-relabel metrics.
    ParallelCut {
        /// Lock-step iterations executed.
        iterations: u32,
        /// Global relabeling passes executed (periodic plus final).
        global_relabels: u32,
        /// Height threshold used for the foreground decision.
        threshold: i32,
        /// Minimum height after the final global relabel.
        min_height: i32,
        /// Maximum sink-reachable height.
        max_finite_height: i32,
        /// Mean sink-reachable height.
        mean_finite_height: f64,
        /// Pixels the sink is unreachable from.
        unreachable_pixels: usize,
        /// Pixels the height threshold classified as foreground.
        foreground_pixels: usize,
    },
}

impl SegmentDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Segmentation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.image_width, self.image_height, self.pixel_count,
        ));
        if let Some(bbox) = self.content_bbox {
            lines.push(format!(
                "Content bbox: ({}, {})..({}, {})",
                bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y,
            ));
        } else {
            lines.push("Content bbox: none (image below threshold)".to_string());
        }
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<10} {:>8} {:<12} {:>10}  {}",
            "Object", "Marked", "Stage", "Duration", "Details"
        ));
        lines.push("-".repeat(80));

        for object in &self.objects {
            if object.skipped {
                lines.push(format!(
                    "{:<10} {:>8} {:<12} {:>10}  skipped (no marked pixels)",
                    object.object_id, object.marked_pixels, "-", "-",
                ));
                continue;
            }
            let stages = [
                ("propagation", object.propagation.as_ref()),
                ("solve", object.solve.as_ref()),
            ];
            for (name, stage) in stages {
                let Some(stage) = stage else { continue };
                lines.push(format!(
                    "{:<10} {:>8} {:<12} {:>8.3}ms  {}",
                    object.object_id,
                    object.marked_pixels,
                    name,
                    duration_ms(stage.duration),
                    format_metrics(&stage.metrics),
                ));
            }
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Propagation {
            sweeps,
            seeded_pixels,
            unreached_pixels,
        } => {
            format!("{sweeps} sweeps, {seeded_pixels} seeds, {unreached_pixels} unreached")
        }
        StageMetrics::SequentialCut {
            total_flow,
            discharges,
            relabels,
            foreground_pixels,
        } => {
            format!(
                "flow={total_flow:.4} discharges={discharges} relabels={relabels} fg={foreground_pixels}",
            )
        }
        StageMetrics::ParallelCut {
            iterations,
            global_relabels,
            threshold,
            unreachable_pixels,
            foreground_pixels,
            ..
        } => {
            format!(
                "{iterations} iters, {global_relabels} relabels, h>={threshold} unreachable={unreachable_pixels} fg={foreground_pixels}",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1234);
        let ms = duration_ms(d);
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn durations_serialize_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(250),
            metrics: StageMetrics::Propagation {
                sweeps: 5,
                seeded_pixels: 10,
                unreached_pixels: 0,
            },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 0.25).abs() < 1e-9);
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, Duration::from_millis(250));
    }

    #[test]
    fn report_produces_nonempty_string() {
        let diag = SegmentDiagnostics {
            image_width: 64,
            image_height: 48,
            pixel_count: 3072,
            content_bbox: Some(Bbox {
                min_x: 4,
                min_y: 4,
                max_x: 59,
                max_y: 43,
            }),
            objects: vec![
                ObjectDiagnostics {
                    object_id: 3,
                    marked_pixels: 120,
                    skipped: false,
                    propagation: Some(StageDiagnostics {
                        duration: Duration::from_millis(2),
                        metrics: StageMetrics::Propagation {
                            sweeps: 7,
                            seeded_pixels: 140,
                            unreached_pixels: 0,
                        },
                    }),
                    solve: Some(StageDiagnostics {
                        duration: Duration::from_millis(40),
                        metrics: StageMetrics::SequentialCut {
                            total_flow: 12.5,
                            discharges: 9000,
                            relabels: 4000,
                            foreground_pixels: 800,
                        },
                    }),
                },
                ObjectDiagnostics {
                    object_id: 2,
                    marked_pixels: 0,
                    skipped: true,
                    propagation: None,
                    solve: None,
                },
            ],
            total_duration: Duration::from_millis(45),
        };

        let report = diag.report();
        assert!(report.contains("Segmentation Diagnostics Report"));
        assert!(report.contains("flow=12.5000"));
        assert!(report.contains("skipped (no marked pixels)"));
    }
}
