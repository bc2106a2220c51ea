//! kirinuki-bench: CLI tool for solver parameter experimentation and
//! diagnostics.
//!
//! Runs the segmentation solver on an intensity image and a marker
//! image with configurable parameters, printing detailed per-object
//! diagnostics. Useful for:
//!
//! - Comparing the sequential and parallel solver variants
//! - Tuning sigma, bias, iteration budget, and relabel frequency
//! - Measuring propagation vs. solve time per object
//! - Inspecting flow, discharge, and height statistics
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin kirinuki-bench -- [OPTIONS] <IMAGE_PATH> <MARKERS_PATH>
//! ```
//!
//! The marker image is grayscale with the crate's marker convention:
//! `0` unknown, `1` background, `2..=255` object ids.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use kirinuki_core::diagnostics::SegmentDiagnostics;
use kirinuki_core::{SegmentConfig, Segmentation, SolverKind};

/// Solver parameter experimentation and diagnostics for kirinuki.
///
/// Runs the seeded graph-cut solver on an intensity image with
/// configurable parameters and prints detailed per-object timing and
/// solver diagnostics.
#[derive(Parser)]
#[command(name = "kirinuki-bench", version)]
struct Cli {
    /// Path to the intensity image (PNG, JPEG, BMP, WebP); converted
    /// to grayscale and normalized to 0..=1.
    image_path: PathBuf,

    /// Path to the marker image (grayscale; 0 unknown, 1 background,
    /// 2..=255 object ids).
    markers_path: PathBuf,

    /// Edge-weight sensitivity sigma.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_SIGMA)]
    sigma: f64,

    /// Terminal bias capacity for unseeded pixels.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_BIAS)]
    bias: f64,

    /// Push-relabel solver variant.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_SOLVER)]
    solver: Solver,

    /// Iteration budget for the parallel solver.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_MAX_ITERATIONS, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_iterations: u32,

    /// Global relabel period for the parallel solver (0 disables
    /// periodic passes).
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_GLOBAL_RELABEL_FREQUENCY)]
    global_relabel_frequency: u32,

    /// Intensity threshold for the content bounding box.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_BBOX_THRESHOLD)]
    bbox_threshold: f32,

    /// Padding in pixels around the content bounding box.
    #[arg(long, default_value_t = SegmentConfig::DEFAULT_BBOX_PADDING)]
    bbox_padding: u32,

    /// Write the raw label map to a grayscale PNG (pixel value =
    /// object id).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write a viewable label map PNG with ids stretched across the
    /// full grayscale range.
    #[arg(long)]
    visualize: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full solver config as a JSON string.
    ///
    /// When provided, all other solver parameter flags are ignored.
    /// The JSON must be a valid `SegmentConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Solver variant selection.
#[derive(Clone, Copy, ValueEnum)]
enum Solver {
    /// Exact single-threaded push-relabel with residual BFS.
    Sequential,
    /// Checkerboard lock-step push-relabel with height threshold.
    Parallel,
}

/// Maps a [`SolverKind`] to the local CLI [`Solver`] enum.
const fn solver_from_core(kind: SolverKind) -> Solver {
    match kind {
        SolverKind::Sequential => Solver::Sequential,
        SolverKind::Parallel => Solver::Parallel,
    }
}

/// The CLI default solver, derived from the core default so the two
/// cannot silently diverge.
const CLI_DEFAULT_SOLVER: Solver = solver_from_core(SegmentConfig::DEFAULT_SOLVER);

/// Build a [`SegmentConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<SegmentConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(SegmentConfig {
        sigma: cli.sigma,
        bias: cli.bias,
        solver: match cli.solver {
            Solver::Sequential => SolverKind::Sequential,
            Solver::Parallel => SolverKind::Parallel,
        },
        max_iterations: cli.max_iterations,
        global_relabel_frequency: cli.global_relabel_frequency,
        bbox_threshold: cli.bbox_threshold,
        bbox_padding: cli.bbox_padding,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match image::open(&cli.image_path) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };
    let markers_image = match image::open(&cli.markers_path) {
        Ok(img) => img.to_luma8(),
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.markers_path.display());
            return ExitCode::FAILURE;
        }
    };
    if markers_image.dimensions() != image.dimensions() {
        eprintln!(
            "Marker image is {}x{}, expected {}x{} to match the intensity image",
            markers_image.width(),
            markers_image.height(),
            image.width(),
            image.height(),
        );
        return ExitCode::FAILURE;
    }

    let (width, height) = image.dimensions();
    let intensity: Vec<f32> = image.as_raw().iter().map(|&v| f32::from(v) / 255.0).collect();
    let markers: Vec<i32> = markers_image.as_raw().iter().map(|&v| i32::from(v)).collect();
    let object_ids = kirinuki_core::object_ids(&markers);

    eprintln!(
        "Image: {} ({}x{}, {} object ids)",
        cli.image_path.display(),
        width,
        height,
        object_ids.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match kirinuki_core::segment_with_diagnostics(
            width,
            height,
            &intensity,
            &markers,
            &object_ids,
            &config,
        ) {
            Ok((segmentation, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write label maps on the first run only.
                if run == 0 {
                    if let Some(ref path) = cli.output
                        && !write_label_png(path, &segmentation, false)
                    {
                        return ExitCode::FAILURE;
                    }
                    if let Some(ref path) = cli.visualize
                        && !write_label_png(path, &segmentation, true)
                    {
                        return ExitCode::FAILURE;
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Segmentation error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Write the label map as a grayscale PNG, optionally stretching ids
/// across the full value range for viewing.
fn write_label_png(path: &PathBuf, segmentation: &Segmentation, stretch: bool) -> bool {
    let grid = segmentation.grid();
    let max_id = segmentation.labels().iter().copied().max().unwrap_or(0);
    let pixels: Vec<u8> = if stretch && max_id > 0 {
        segmentation
            .labels()
            .iter()
            .map(|&l| ((u16::from(l) * 255) / u16::from(max_id)) as u8)
            .collect()
    } else {
        segmentation.labels().to_vec()
    };
    let Some(img) = image::GrayImage::from_raw(grid.width(), grid.height(), pixels) else {
        eprintln!("Error assembling label image");
        return false;
    };
    match img.save(path) {
        Ok(()) => {
            eprintln!("Label map written to {}", path.display());
            true
        }
        Err(e) => {
            eprintln!("Error writing label map to {}: {e}", path.display());
            false
        }
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[SegmentDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means, summed across objects within each run.
    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_sums = |pick: fn(&kirinuki_core::diagnostics::ObjectDiagnostics) -> Option<f64>| {
        all_diagnostics
            .iter()
            .map(|d| d.objects.iter().filter_map(pick).sum::<f64>())
            .collect::<Vec<f64>>()
    };
    let stages: [(&str, Vec<f64>); 2] = [
        (
            "Propagation",
            stage_sums(|o| o.propagation.as_ref().map(|s| s.duration.as_secs_f64() * 1000.0)),
        ),
        (
            "Solve",
            stage_sums(|o| o.solve.as_ref().map(|s| s.duration.as_secs_f64() * 1000.0)),
        ),
    ];
    for (name, sums) in stages {
        if sums.is_empty() {
            continue;
        }
        let stage_mean = sums.iter().sum::<f64>() / sums.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}
