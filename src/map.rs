//! The top-level Gaussian-process block map.
//!
//! [`GpMap`] wires the spatial index, the regression-engine boundary, BCM
//! fusion and occupancy extraction into the streamed update cycle:
//!
//! ```text
//! set_input_cloud -> add_points_from_input_cloud -> update -> extract
//! ```
//!
//! Each update pass runs to completion before the next cloud is processed.
//! Within a pass the key set and bounds are frozen (empty-neighbor creation
//! happens first), and every block's update touches only that block's own
//! stored statistics plus read-only neighbor index lists, so the per-block
//! work is independent. Failures from the regression engine are caught at
//! block granularity, logged, and skipped; fusion is the last step of a
//! block update, so a failed block never corrupts previously fused state.

use log::{debug, warn};

use crate::config::{InsertMode, MapConfig};
use crate::core::{Bounds3D, Point3D, PointCloud3D};
use crate::extract;
use crate::fusion;
use crate::gp::{Hyperparameters, RegressionEngine, TrainingSet};
use crate::index::{BlockIndex, cell_center_offsets};
use crate::train::{TrainError, TrainingOutcome, train_hyperparameters};

/// Summary of one update pass.
#[derive(Clone, Debug, Default)]
pub struct UpdateStats {
    /// Blocks visited by the pass.
    pub blocks_visited: usize,
    /// Blocks whose statistics were updated by fusion.
    pub blocks_updated: usize,
    /// Blocks skipped because their training set was under-sized
    /// (explicit no-op, prior statistics retained).
    pub blocks_skipped: usize,
    /// Blocks skipped because regression or fusion failed.
    pub blocks_failed: usize,
    /// Empty placeholder blocks created ahead of the pass.
    pub blocks_created: usize,
}

/// Continuous 3D occupancy/surface model built from streamed point clouds.
pub struct GpMap {
    config: MapConfig,
    index: BlockIndex,
    cloud: PointCloud3D,
    /// Cell-center offsets from a block's minimum corner, shared by all
    /// blocks.
    cell_offsets: Vec<Point3D>,
}

impl GpMap {
    /// Create an empty map. Degenerate configuration values are
    /// normalized, not rejected.
    pub fn new(config: MapConfig) -> Self {
        let config = config.normalized();
        let cell_offsets = cell_center_offsets(config.cells_per_axis, config.cell_size());
        let index = BlockIndex::new(config.block_size, config.insert_mode);
        Self {
            config,
            index,
            cloud: PointCloud3D::new(),
            cell_offsets,
        }
    }

    /// Active (normalized) configuration.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Edge length of one sub-cell in meters.
    pub fn cell_size(&self) -> f32 {
        self.config.cell_size()
    }

    /// Current bounding box.
    pub fn bounds(&self) -> Bounds3D {
        self.index.bounds()
    }

    /// Total number of blocks (placeholders included).
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    /// Number of blocks holding points of the current cloud.
    pub fn populated_block_count(&self) -> usize {
        self.index.populated_count()
    }

    /// Total point indices stored across all blocks (27x the interior
    /// point count in duplicate mode).
    pub fn total_points_in_blocks(&self) -> usize {
        self.index.total_points_in_blocks()
    }

    /// Shared access to the spatial index.
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Define the bounding box up front.
    ///
    /// # Panics
    /// Panics if blocks already carry data and the snapped request does
    /// not cover them (see [`BlockIndex::define_bounding_box`]).
    pub fn define_bounding_box(&mut self, min: Point3D, max: Point3D) {
        self.index.define_bounding_box(min, max);
    }

    /// Set the input cloud for the next insertion pass.
    pub fn set_input_cloud(&mut self, cloud: PointCloud3D) {
        self.cloud = cloud;
    }

    /// Insert the current input cloud into the spatial index.
    ///
    /// Non-finite points are skipped silently; the bounding box grows to
    /// cover all finite points plus a one-block margin. Point indices from
    /// the previous pass are replaced. Returns the number of points
    /// inserted.
    pub fn add_points_from_input_cloud(&mut self) -> usize {
        self.index.add_points_from_cloud(&self.cloud)
    }

    /// Run one update pass: assemble each block's training set, predict at
    /// its cell centers through the regression engine, and fuse the
    /// posterior into the block's stored statistics.
    pub fn update<E: RegressionEngine>(
        &mut self,
        engine: &E,
        hyp: &Hyperparameters,
    ) -> UpdateStats {
        let mut stats = UpdateStats::default();

        // neighbor reads during aggregation must never miss a key; the
        // key set and bounds are frozen from here on
        if self.config.insert_mode == InsertMode::Aggregate {
            stats.blocks_created = self.index.create_empty_neighboring_blocks();
        }

        let keys = self.index.sorted_keys();
        stats.blocks_visited = keys.len();

        for key in keys {
            let indices = self.index.collect_training_indices(key);
            if indices.len() < self.config.min_points_to_predict {
                stats.blocks_skipped += 1;
                continue;
            }
            let training = TrainingSet::from_cloud_indices(&self.cloud, &indices);

            let min_pt = self.index.block_min_point(key);
            let test_positions: Vec<Point3D> =
                self.cell_offsets.iter().map(|&o| min_pt + o).collect();

            let posterior =
                match engine.predict(hyp, &training, &test_positions, self.config.bcm_mode) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(
                            "regression failed for block ({}, {}, {}): {e}; block skipped",
                            key.x, key.y, key.z
                        );
                        stats.blocks_failed += 1;
                        continue;
                    }
                };
            if posterior.len() != self.config.cells_per_block() {
                warn!(
                    "posterior covers {} cells, expected {}; block ({}, {}, {}) skipped",
                    posterior.len(),
                    self.config.cells_per_block(),
                    key.x,
                    key.y,
                    key.z
                );
                stats.blocks_failed += 1;
                continue;
            }

            // fusion is the last step: state changes only on full success
            let block = self
                .index
                .block_mut(&key)
                .expect("frozen key set contains every visited key");
            match fusion::fused(block.stats(), &posterior) {
                Ok(new_stats) => {
                    block.set_stats(new_stats);
                    stats.blocks_updated += 1;
                }
                Err(e) => {
                    warn!(
                        "fusion failed for block ({}, {}, {}): {e}; block skipped",
                        key.x, key.y, key.z
                    );
                    stats.blocks_failed += 1;
                }
            }
        }

        debug!(
            "update pass: {} visited, {} updated, {} skipped, {} failed",
            stats.blocks_visited, stats.blocks_updated, stats.blocks_skipped, stats.blocks_failed
        );
        stats
    }

    /// World-space centers of occupied cells under the given threshold.
    ///
    /// Repeated extraction over unchanged state yields an identical list.
    pub fn occupied_cell_centers(&self, threshold: f32, remove_isolated: bool) -> Vec<Point3D> {
        extract::occupied_cell_centers(
            &self.index,
            self.config.cells_per_axis,
            &self.cell_offsets,
            threshold,
            remove_isolated,
        )
    }

    /// Occupied-cell centers with the configured threshold and isolation
    /// setting.
    pub fn occupied_cell_centers_default(&self) -> Vec<Point3D> {
        self.occupied_cell_centers(self.config.occupancy_threshold, self.config.remove_isolated)
    }

    /// World-space centers of occupied blocks.
    pub fn occupied_block_centers(&self, remove_isolated: bool) -> Vec<Point3D> {
        extract::occupied_block_centers(&self.index, remove_isolated)
    }

    /// Refine the shared hyperparameters on a sampled subset of blocks.
    ///
    /// Read-only over block state; may run between update passes.
    pub fn train_hyperparameters<E: RegressionEngine>(
        &self,
        engine: &E,
        initial: &Hyperparameters,
    ) -> Result<TrainingOutcome, TrainError> {
        train_hyperparameters(&self.index, &self.cloud, &self.config, engine, initial)
    }
}
