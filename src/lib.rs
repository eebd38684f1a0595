//! # Ghana-Map: Gaussian-Process Block Mapping
//!
//! A continuous 3D occupancy/surface mapping library. Streamed point-cloud
//! observations are partitioned into a regular grid of cubic blocks, a
//! local Gaussian-process posterior is estimated per block through an
//! external regression engine, and overlapping estimates are fused into one
//! statistic per sub-cell with a Bayesian Committee Machine.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ghana_map::{GpMap, MapConfig, Hyperparameters, PointCloud3D, Point3D};
//!
//! let mut map = GpMap::new(MapConfig::default().with_block_size(0.01));
//! let engine = my_gp_backend(); // any ghana_map::RegressionEngine
//! let hyp = Hyperparameters::surface_prior();
//!
//! for cloud in scans {
//!     map.set_input_cloud(cloud);
//!     map.add_points_from_input_cloud();
//!     let stats = map.update(&engine, &hyp);
//!     println!("updated {} blocks", stats.blocks_updated);
//! }
//! let surface = map.occupied_cell_centers_default();
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: fundamental types (points, keys, bounds, clouds, matrix math)
//! - [`config`]: configuration types
//! - [`index`]: hash-keyed spatial index and bounding-box manager
//! - [`gp`]: the regression-engine boundary (trait + data contracts)
//! - [`fusion`]: Bayesian Committee Machine fusion
//! - [`extract`]: occupancy classification and surface extraction
//! - [`train`]: whole-map hyperparameter training
//! - [`map`]: the [`GpMap`] pipeline glue
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────────┐
//!            │  PointCloud  │
//!            └──────┬───────┘
//!                   │ add_points_from_input_cloud()
//!                   ▼
//!          ┌─────────────────┐
//!          │   BlockIndex    │  hash-keyed blocks, growing
//!          │ (+ bounding box)│  block-snapped bounds
//!          └──────┬──────────┘
//!                 │ 27-neighborhood training sets
//!                 ▼
//!        ┌──────────────────┐
//!        │ RegressionEngine │  external GP capability
//!        │ (train/predict)  │
//!        └──────┬───────────┘
//!               │ posterior per block
//!               ▼
//!        ┌──────────────┐
//!        │  BCM Fusion  │  precision-weighted, per cell
//!        └──────┬───────┘
//!               │ fused (mean, variance)
//!               ▼
//!        ┌──────────────┐
//!        │  Extraction  │──► occupied cell/block centers
//!        └──────────────┘
//! ```
//!
//! The hyperparameter trainer ([`train`]) consumes the spatial index and
//! the engine independently of the update pass: it samples blocks, sums
//! negative log marginal likelihoods, and minimizes the sum over the
//! shared log-space hyperparameter vector.
//!
//! ## Concurrency Model
//!
//! The reference design is single-pass per input cloud: insertion,
//! training-set assembly, regression and fusion run to completion before
//! the next cloud. Within a pass the key set and bounds are frozen after
//! empty-neighbor creation, and each block's update touches only its own
//! statistics plus read-only neighbor index lists, so a parallel harness
//! would only need block-scoped synchronization. Hyperparameter training
//! is read-only over block state and must not overlap a fusion-writing
//! update pass.

pub mod config;
pub mod core;
pub mod extract;
pub mod fusion;
pub mod gp;
pub mod index;
pub mod map;
pub mod train;

// Re-export main types at crate root
pub use config::{BcmMode, ConfigError, InsertMode, MapConfig, OptimizerConfig};
pub use crate::core::{BlockKey, Bounds3D, Point3D, PointCloud3D};
pub use gp::{Hyperparameters, Posterior, RegressionEngine, RegressionError, TrainingSet};
pub use index::{Block, BlockIndex, BlockStats};
pub use map::{GpMap, UpdateStats};
pub use train::{TrainError, TrainingOutcome};
