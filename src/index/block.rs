//! Block records: per-pass point indices plus persistent fused statistics.

use crate::core::Point3D;
use crate::core::math::Matrix;

/// Fused cell statistics of one block.
///
/// `Unset` is a valid state distinct from a zero-variance estimate: a block
/// stays unset until its training set first meets the minimum size and a
/// posterior is fused in.
#[derive(Clone, Debug, Default)]
pub enum BlockStats {
    /// No fused estimate yet.
    #[default]
    Unset,
    /// Scalar mean and variance per cell.
    Independent {
        /// Fused mean per cell.
        mean: Vec<f64>,
        /// Fused variance per cell (positive).
        variance: Vec<f64>,
    },
    /// Mean per cell and one covariance matrix over the whole block.
    Dependent {
        /// Fused mean per cell.
        mean: Vec<f64>,
        /// Fused covariance over the block's cells.
        covariance: Matrix,
    },
}

impl BlockStats {
    /// Whether a fused estimate is present.
    #[inline]
    pub fn is_set(&self) -> bool {
        !matches!(self, BlockStats::Unset)
    }

    /// Fused mean of cell `idx`, if set.
    pub fn mean_at(&self, idx: usize) -> Option<f64> {
        match self {
            BlockStats::Unset => None,
            BlockStats::Independent { mean, .. } => mean.get(idx).copied(),
            BlockStats::Dependent { mean, .. } => mean.get(idx).copied(),
        }
    }

    /// Fused marginal variance of cell `idx`, if set.
    pub fn variance_at(&self, idx: usize) -> Option<f64> {
        match self {
            BlockStats::Unset => None,
            BlockStats::Independent { variance, .. } => variance.get(idx).copied(),
            BlockStats::Dependent { covariance, .. } => {
                (idx < covariance.rows()).then(|| covariance.at(idx, idx))
            }
        }
    }
}

/// One block of the spatial index.
///
/// The point-index list refers to the current input cloud and is rebuilt on
/// every insertion pass; the fused statistics persist for the lifetime of
/// the map. Spatial bounds are always derived from the block's key, the
/// block size and the bounding-box origin, never stored here.
#[derive(Clone, Debug, Default)]
pub struct Block {
    indices: Vec<usize>,
    stats: BlockStats,
}

impl Block {
    /// Create an empty block (placeholder state).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a point index from the current cloud.
    #[inline]
    pub fn push_index(&mut self, idx: usize) {
        self.indices.push(idx);
    }

    /// Drop all point indices (start of a new insertion pass). Fused
    /// statistics are untouched.
    #[inline]
    pub fn clear_indices(&mut self) {
        self.indices.clear();
    }

    /// Point indices of the current cloud stored in this block.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of stored point indices.
    #[inline]
    pub fn point_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the block holds any points of the current cloud.
    #[inline]
    pub fn is_populated(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Fused statistics.
    #[inline]
    pub fn stats(&self) -> &BlockStats {
        &self.stats
    }

    /// Replace the fused statistics (the final step of a block update).
    #[inline]
    pub fn set_stats(&mut self, stats: BlockStats) {
        self.stats = stats;
    }
}

/// Flat cell index for the (ix, iy, iz) sub-cell of an `n`-per-axis block.
#[inline]
pub fn cell_index(n: usize, ix: usize, iy: usize, iz: usize) -> usize {
    debug_assert!(ix < n && iy < n && iz < n);
    (ix * n + iy) * n + iz
}

/// Cell-center offsets from a block's minimum corner, in flat-index order.
///
/// Cell (ix, iy, iz) is centered at `(i + 0.5) * cell_size` per axis; the
/// same offsets are shared by every block, so callers compute them once and
/// translate by each block's minimum corner.
pub fn cell_center_offsets(n: usize, cell_size: f32) -> Vec<Point3D> {
    let mut offsets = Vec::with_capacity(n * n * n);
    for ix in 0..n {
        for iy in 0..n {
            for iz in 0..n {
                offsets.push(Point3D::new(
                    (ix as f32 + 0.5) * cell_size,
                    (iy as f32 + 0.5) * cell_size,
                    (iz as f32 + 0.5) * cell_size,
                ));
            }
        }
    }
    offsets
}
