//! Configuration types for the block map.

use serde::{Deserialize, Serialize};

/// How fused statistics are represented inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BcmMode {
    /// One scalar variance per cell. Fusion costs a scalar division per
    /// cell, O(n) in the number of cells per block.
    Independent,
    /// One full covariance matrix per block. Fusion requires per-block
    /// matrix inversions, O(n³) in the number of cells per block.
    /// Substantially more expensive; use only when cross-cell correlation
    /// matters downstream.
    Dependent,
}

/// How inserted point indices are distributed over blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Each point index is stored only in its owning block; training sets
    /// are assembled from the 27-block neighborhood at update time.
    Aggregate,
    /// Each point index is additionally stored in all 26 neighboring
    /// blocks, making every block self-contained for training at a 27x
    /// index-storage cost.
    Duplicate,
}

/// Bounded derivative-free optimizer settings, shared by the regression
/// engine's per-block refinement and the whole-map hyperparameter trainer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Maximum number of iterations.
    /// Default: 200
    pub max_iterations: usize,

    /// Convergence threshold on the objective spread.
    /// Iteration stops early once the candidate objectives agree within
    /// this tolerance.
    /// Default: 1e-6
    pub convergence_threshold: f64,

    /// Initial simplex step in log-hyperparameter space.
    /// Default: 0.3
    pub initial_step: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            convergence_threshold: 1e-6,
            initial_step: 0.3,
        }
    }
}

/// Full map configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapConfig {
    /// Edge length of a cubic block in meters.
    /// Default: 0.01
    pub block_size: f32,

    /// Number of sub-cells per block axis; each block holds
    /// `cells_per_axis³` cells.
    /// Default: 4
    pub cells_per_axis: usize,

    /// Fused-statistic representation (scalar variances vs. block
    /// covariance).
    /// Default: independent
    pub bcm_mode: BcmMode,

    /// Point-index distribution at insertion time.
    /// Default: aggregate
    pub insert_mode: InsertMode,

    /// Minimum training-set size below which a block's update is an
    /// explicit no-op (its stored statistic is retained unchanged).
    /// Default: 10
    pub min_points_to_predict: usize,

    /// Occupancy threshold on the surface-crossing statistic in [0, 1].
    /// Default: 0.5
    pub occupancy_threshold: f32,

    /// Exclude isolated cells/blocks (no occupied 6-connected neighbor)
    /// from extraction output.
    /// Default: true
    pub remove_isolated: bool,

    /// Number of non-empty blocks sampled per hyperparameter-training run.
    /// Default: 32
    pub hyper_training_blocks: usize,

    /// Optimizer settings (hyperparameter training and engine refinement).
    pub optimizer: OptimizerConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            block_size: 0.01,
            cells_per_axis: 4,
            bcm_mode: BcmMode::Independent,
            insert_mode: InsertMode::Aggregate,
            min_points_to_predict: 10,
            occupancy_threshold: 0.5,
            remove_isolated: true,
            hyper_training_blocks: 32,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl MapConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for block size.
    pub fn with_block_size(mut self, meters: f32) -> Self {
        self.block_size = meters;
        self
    }

    /// Builder-style setter for cells per axis.
    pub fn with_cells_per_axis(mut self, cells: usize) -> Self {
        self.cells_per_axis = cells;
        self
    }

    /// Builder-style setter for the BCM mode.
    pub fn with_bcm_mode(mut self, mode: BcmMode) -> Self {
        self.bcm_mode = mode;
        self
    }

    /// Builder-style setter for the insertion mode.
    pub fn with_insert_mode(mut self, mode: InsertMode) -> Self {
        self.insert_mode = mode;
        self
    }

    /// Builder-style setter for the minimum training-set size.
    pub fn with_min_points_to_predict(mut self, count: usize) -> Self {
        self.min_points_to_predict = count;
        self
    }

    /// Builder-style setter for the occupancy threshold.
    pub fn with_occupancy_threshold(mut self, threshold: f32) -> Self {
        self.occupancy_threshold = threshold;
        self
    }

    /// Builder-style setter for isolation removal.
    pub fn with_remove_isolated(mut self, remove: bool) -> Self {
        self.remove_isolated = remove;
        self
    }

    /// Edge length of a sub-cell in meters.
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.block_size / self.cells_per_axis as f32
    }

    /// Number of cells in one block.
    #[inline]
    pub fn cells_per_block(&self) -> usize {
        self.cells_per_axis * self.cells_per_axis * self.cells_per_axis
    }

    /// Clamp degenerate values to the nearest valid setting.
    ///
    /// Zero cells-per-axis or zero minimum-points become 1, a
    /// non-positive or non-finite block size falls back to the default,
    /// and the occupancy threshold is clamped into [0, 1]. Lenient by
    /// policy: degenerate configuration is normalized, not rejected.
    pub fn normalized(mut self) -> Self {
        if self.cells_per_axis == 0 {
            log::warn!("cells_per_axis 0 clamped to 1");
            self.cells_per_axis = 1;
        }
        if self.min_points_to_predict == 0 {
            log::warn!("min_points_to_predict 0 clamped to 1");
            self.min_points_to_predict = 1;
        }
        if !(self.block_size > 0.0) || !self.block_size.is_finite() {
            log::warn!(
                "block_size {} replaced with default 0.01",
                self.block_size
            );
            self.block_size = 0.01;
        }
        if !(0.0..=1.0).contains(&self.occupancy_threshold) {
            let clamped = self.occupancy_threshold.clamp(0.0, 1.0);
            log::warn!(
                "occupancy_threshold {} clamped to {}",
                self.occupancy_threshold,
                clamped
            );
            self.occupancy_threshold = clamped;
        }
        self
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Serialize to YAML string.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration error type.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// File I/O error
    IoError(String),
    /// YAML parsing error
    ParseError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
