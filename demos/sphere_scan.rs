//! Synthetic sphere-scan demo for the GP block map.
//!
//! Generates partial scans of a sphere (four azimuth windows, like turning
//! an object on a table), streams them through the full pipeline and
//! reports what the map extracted after each pass.
//!
//! The bundled engine is a deliberately simple stand-in for a real
//! Gaussian-process backend: it fits the local tangent plane through the
//! training points and reports signed plane distance with 1/n variance.
//! Plug any [`ghana_map::RegressionEngine`] implementation in its place.
//!
//! Usage:
//!   cargo run --example sphere_scan
//!   cargo run --example sphere_scan -- --scans 8 --train

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

use ghana_map::core::math::Matrix;
use ghana_map::{
    BcmMode, GpMap, Hyperparameters, MapConfig, Point3D, PointCloud3D, Posterior,
    RegressionEngine, RegressionError, TrainingSet,
};

/// Synthetic sphere-scan demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of partial scans around the sphere
    #[arg(long, default_value_t = 4)]
    scans: usize,

    /// Points per scan
    #[arg(long, default_value_t = 1500)]
    points: usize,

    /// Sphere radius in meters
    #[arg(long, default_value_t = 0.5)]
    radius: f32,

    /// Block size in meters
    #[arg(long, default_value_t = 0.1)]
    block_size: f32,

    /// Sub-cells per block axis
    #[arg(long, default_value_t = 4)]
    cells: usize,

    /// Minimum training-set size per block
    #[arg(long, default_value_t = 10)]
    min_points: usize,

    /// Occupancy threshold
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Run hyperparameter training after the last pass
    #[arg(long)]
    train: bool,

    /// RNG seed
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

/// Tangent-plane stand-in for a real GP backend.
struct TangentPlaneEngine;

impl TangentPlaneEngine {
    fn centroid(points: &[Point3D]) -> Point3D {
        let n = points.len().max(1) as f32;
        let mut sum = Point3D::ZERO;
        for p in points {
            sum = sum + *p;
        }
        sum * (1.0 / n)
    }

    fn mean_normal(data: &TrainingSet, centroid: Point3D) -> Point3D {
        let raw = match &data.normals {
            Some(normals) => Self::centroid(normals),
            // without normals, fall back to the radial direction
            None => centroid,
        };
        let len = raw.length();
        if len > 1e-6 {
            raw * (1.0 / len)
        } else {
            Point3D::new(0.0, 0.0, 1.0)
        }
    }
}

impl RegressionEngine for TangentPlaneEngine {
    fn train(
        &self,
        hyp: &Hyperparameters,
        _data: &TrainingSet,
        _max_iterations: usize,
    ) -> Result<Hyperparameters, RegressionError> {
        Ok(hyp.clone())
    }

    fn predict(
        &self,
        _hyp: &Hyperparameters,
        data: &TrainingSet,
        test_positions: &[Point3D],
        mode: BcmMode,
    ) -> Result<Posterior, RegressionError> {
        if data.is_empty() {
            return Err(RegressionError::EmptyTrainingSet);
        }
        let centroid = Self::centroid(&data.positions);
        let normal = Self::mean_normal(data, centroid);
        let variance = 1.0 / data.len() as f64;

        let mean: Vec<f64> = test_positions
            .iter()
            .map(|x| {
                let d = *x - centroid;
                (d.x * normal.x + d.y * normal.y + d.z * normal.z) as f64
            })
            .collect();
        let cells = mean.len();
        match mode {
            BcmMode::Independent => Ok(Posterior::Independent {
                mean,
                variance: vec![variance; cells],
            }),
            BcmMode::Dependent => Ok(Posterior::Dependent {
                mean,
                covariance: Matrix::from_diagonal(&vec![variance; cells]),
            }),
        }
    }

    fn negative_log_marginal_likelihood(
        &self,
        hyp: &Hyperparameters,
        data: &TrainingSet,
    ) -> Result<f64, RegressionError> {
        // smooth surrogate: favors moderate log-hyperparameters
        let bowl: f64 = hyp.flatten().iter().map(|v| v * v).sum();
        Ok(data.len() as f64 * 0.01 + bowl)
    }
}

/// One partial scan: points on the sphere within an azimuth window, with
/// outward normals and mild range noise.
fn sphere_scan(args: &Args, rng: &mut StdRng, window: usize) -> PointCloud3D {
    let window_width = TAU / args.scans as f32;
    let start = window as f32 * window_width;

    let mut positions = Vec::with_capacity(args.points);
    let mut normals = Vec::with_capacity(args.points);
    for _ in 0..args.points {
        let azimuth = start + rng.random_range(0.0..window_width);
        let z: f32 = rng.random_range(-1.0..1.0);
        let ring = (1.0 - z * z).sqrt();
        let normal = Point3D::new(ring * azimuth.cos(), ring * azimuth.sin(), z);
        let radius = args.radius * (1.0 + rng.random_range(-0.01..0.01));
        positions.push(normal * radius);
        normals.push(normal);
    }
    PointCloud3D::from_points(&positions).with_normals(normals)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = MapConfig::default()
        .with_block_size(args.block_size)
        .with_cells_per_axis(args.cells)
        .with_min_points_to_predict(args.min_points)
        .with_occupancy_threshold(args.threshold);
    let mut map = GpMap::new(config);

    let engine = TangentPlaneEngine;
    let hyp = Hyperparameters::surface_prior();
    let mut rng = StdRng::seed_from_u64(args.seed);

    for scan in 0..args.scans {
        log::info!("==== updating the map with scan #{scan} ====");

        let cloud = sphere_scan(&args, &mut rng, scan);
        map.set_input_cloud(cloud);

        let inserted = map.add_points_from_input_cloud();
        log::info!(
            "inserted {} points into {} populated blocks",
            inserted,
            map.populated_block_count()
        );

        let stats = map.update(&engine, &hyp);
        log::info!(
            "update: {} visited, {} updated, {} skipped, {} failed",
            stats.blocks_visited,
            stats.blocks_updated,
            stats.blocks_skipped,
            stats.blocks_failed
        );
    }

    if args.train {
        match map.train_hyperparameters(&engine, &hyp) {
            Ok(outcome) => log::info!(
                "hyperparameter training: objective {:.4} over {} blocks in {} iterations",
                outcome.objective,
                outcome.blocks_used,
                outcome.iterations
            ),
            Err(e) => log::warn!("hyperparameter training failed: {e}"),
        }
    }

    let cells = map.occupied_cell_centers_default();
    let blocks = map.occupied_block_centers(true);
    let bounds = map.bounds();
    println!(
        "map: {} blocks total, bounds [{:.2}, {:.2}, {:.2}] .. [{:.2}, {:.2}, {:.2}]",
        map.block_count(),
        bounds.min.x,
        bounds.min.y,
        bounds.min.z,
        bounds.max.x,
        bounds.max.y,
        bounds.max.z
    );
    println!(
        "extracted {} occupied cells in {} occupied blocks",
        cells.len(),
        blocks.len()
    );
    if let Some(first) = cells.first() {
        let r = first.length();
        println!(
            "first cell center ({:.3}, {:.3}, {:.3}), radius {:.3} (target {:.3})",
            first.x, first.y, first.z, r, args.radius
        );
    }
}
