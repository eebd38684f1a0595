//! Occupancy and surface extraction from fused block statistics.
//!
//! A cell's fused (mean, variance) is squashed into a surface-crossing
//! likelihood (PLSC) and thresholded into a boolean classification. Cells
//! or blocks classified occupied but with no occupied 6-connected neighbor
//! are treated as noise and dropped when isolation removal is enabled;
//! locations on a grid boundary cannot prove they are connected and are
//! conservatively treated as isolated.

use crate::core::math::normal_cdf;
use crate::core::{BlockKey, Point3D};
use crate::index::{BlockIndex, cell_index};

/// Probabilistic least-squares-classification statistic.
///
/// Squashes a Gaussian posterior over the latent surface function into the
/// probability that the function is non-positive (on or behind the
/// surface) at the query point: `Φ(-mean / sqrt(1 + variance))`. On the
/// surface itself (mean 0) the statistic is 0.5; deep in free space it
/// tends to 0.
///
/// # Example
/// ```
/// use ghana_map::extract::plsc;
///
/// assert!((plsc(0.0, 0.5) - 0.5).abs() < 1e-9);
/// assert!(plsc(-1.0, 0.1) > plsc(0.0, 0.1)); // behind the surface
/// assert!(plsc(1.0, 0.1) < 0.5); // in front of the surface
/// ```
#[inline]
pub fn plsc(mean: f64, variance: f64) -> f64 {
    normal_cdf(-mean / (1.0 + variance.max(0.0)).sqrt())
}

/// Boolean occupancy classification of one fused cell estimate.
#[inline]
pub fn is_occupied(mean: f64, variance: f64, threshold: f32) -> bool {
    plsc(mean, variance) >= threshold as f64
}

/// World-space centers of all occupied cells.
///
/// Traverses blocks in sorted key order, so repeated extraction over
/// unchanged state yields an identical list. Blocks without fused
/// statistics contribute nothing.
pub fn occupied_cell_centers(
    index: &BlockIndex,
    cells_per_axis: usize,
    cell_offsets: &[Point3D],
    threshold: f32,
    remove_isolated: bool,
) -> Vec<Point3D> {
    let n = cells_per_axis;
    debug_assert_eq!(cell_offsets.len(), n * n * n);

    let mut centers = Vec::new();
    let mut occupied = vec![false; n * n * n];
    for key in index.sorted_keys() {
        let Some(block) = index.block(&key) else {
            continue;
        };
        let stats = block.stats();
        if !stats.is_set() {
            continue;
        }

        for (idx, occ) in occupied.iter_mut().enumerate() {
            *occ = match (stats.mean_at(idx), stats.variance_at(idx)) {
                (Some(m), Some(v)) => is_occupied(m, v, threshold),
                _ => false,
            };
        }

        let min_pt = index.block_min_point(key);
        for ix in 0..n {
            for iy in 0..n {
                for iz in 0..n {
                    let idx = cell_index(n, ix, iy, iz);
                    if !occupied[idx] {
                        continue;
                    }
                    if remove_isolated && cell_is_isolated(&occupied, n, ix, iy, iz) {
                        continue;
                    }
                    centers.push(min_pt + cell_offsets[idx]);
                }
            }
        }
    }
    centers
}

/// Isolation test over a block's cell grid.
///
/// Cells on the grid boundary cannot see all 6 neighbors and count as
/// isolated; interior cells are isolated iff no face-adjacent neighbor is
/// occupied.
fn cell_is_isolated(occupied: &[bool], n: usize, ix: usize, iy: usize, iz: usize) -> bool {
    let last = n - 1;
    if ix == 0 || iy == 0 || iz == 0 || ix >= last || iy >= last || iz >= last {
        return true;
    }
    let neighbors = [
        cell_index(n, ix + 1, iy, iz),
        cell_index(n, ix - 1, iy, iz),
        cell_index(n, ix, iy + 1, iz),
        cell_index(n, ix, iy - 1, iz),
        cell_index(n, ix, iy, iz + 1),
        cell_index(n, ix, iy, iz - 1),
    ];
    !neighbors.iter().any(|&i| occupied[i])
}

/// World-space centers of all occupied blocks.
///
/// A block counts as occupied once it carries fused statistics. With
/// isolation removal enabled, blocks on the bounding-box boundary and
/// blocks with no occupied 6-connected neighbor are dropped.
pub fn occupied_block_centers(index: &BlockIndex, remove_isolated: bool) -> Vec<Point3D> {
    let mut centers = Vec::new();
    for key in index.sorted_keys() {
        let Some(block) = index.block(&key) else {
            continue;
        };
        if !block.stats().is_set() {
            continue;
        }
        if remove_isolated && block_is_isolated(index, key) {
            continue;
        }
        centers.push(index.block_center(key));
    }
    centers
}

fn block_is_isolated(index: &BlockIndex, key: BlockKey) -> bool {
    if index.is_boundary_key(key) {
        return true;
    }
    !key.neighbors_6().iter().any(|neighbor| {
        index
            .block(neighbor)
            .map(|b| b.stats().is_set())
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InsertMode;
    use crate::core::PointCloud3D;
    use crate::index::{BlockStats, cell_center_offsets};
    use approx::assert_relative_eq;

    const OCCUPIED_MEAN: f64 = -1.0;
    const FREE_MEAN: f64 = 1.0;

    #[test]
    fn test_plsc_monotonic_in_mean() {
        let v = 0.2;
        assert!(plsc(-2.0, v) > plsc(-1.0, v));
        assert!(plsc(-1.0, v) > plsc(0.0, v));
        assert!(plsc(0.0, v) > plsc(1.0, v));
    }

    #[test]
    fn test_plsc_variance_pulls_toward_half() {
        // more uncertainty moves the statistic toward indifference
        assert!(plsc(-1.0, 10.0) < plsc(-1.0, 0.1));
        assert!(plsc(1.0, 10.0) > plsc(1.0, 0.1));
        assert_relative_eq!(plsc(0.0, 100.0), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_is_occupied_threshold() {
        assert!(is_occupied(OCCUPIED_MEAN, 0.1, 0.5));
        assert!(!is_occupied(FREE_MEAN, 0.1, 0.5));
        // raising the threshold excludes marginal cells
        assert!(!is_occupied(-0.01, 0.1, 0.95));
    }

    /// Index with one stats-carrying block of `n` cells per axis, with the
    /// given cells occupied.
    fn single_block_index(n: usize, occupied_cells: &[(usize, usize, usize)]) -> BlockIndex {
        let mut index = BlockIndex::new(0.3, InsertMode::Aggregate);
        index.add_points_from_cloud(&PointCloud3D::from_points(&[Point3D::new(
            0.15, 0.15, 0.15,
        )]));
        let key = index.key_for_point(Point3D::new(0.15, 0.15, 0.15));

        let cells = n * n * n;
        let mut mean = vec![FREE_MEAN; cells];
        for &(ix, iy, iz) in occupied_cells {
            mean[cell_index(n, ix, iy, iz)] = OCCUPIED_MEAN;
        }
        index.block_mut(&key).unwrap().set_stats(BlockStats::Independent {
            mean,
            variance: vec![0.1; cells],
        });
        index
    }

    #[test]
    fn test_isolated_cell_filtered() {
        let n = 3;
        let index = single_block_index(n, &[(1, 1, 1)]);
        let offsets = cell_center_offsets(n, 0.1);

        let kept = occupied_cell_centers(&index, n, &offsets, 0.5, false);
        assert_eq!(kept.len(), 1);

        let filtered = occupied_cell_centers(&index, n, &offsets, 0.5, true);
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_connected_interior_cell_kept() {
        let n = 3;
        // center cell plus one face neighbor on the grid edge
        let index = single_block_index(n, &[(1, 1, 1), (1, 1, 0)]);
        let offsets = cell_center_offsets(n, 0.1);

        let centers = occupied_cell_centers(&index, n, &offsets, 0.5, true);
        // the edge cell is conservatively isolated, the center survives
        assert_eq!(centers.len(), 1);
        let key = index.key_for_point(Point3D::new(0.15, 0.15, 0.15));
        let expected = index.block_min_point(key) + offsets[cell_index(n, 1, 1, 1)];
        assert_relative_eq!(centers[0].x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(centers[0].z, expected.z, epsilon = 1e-6);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let n = 3;
        let index = single_block_index(n, &[(1, 1, 1), (1, 1, 2), (0, 1, 1)]);
        let offsets = cell_center_offsets(n, 0.1);

        let a = occupied_cell_centers(&index, n, &offsets, 0.5, true);
        let b = occupied_cell_centers(&index, n, &offsets, 0.5, true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unset_blocks_emit_nothing() {
        let mut index = BlockIndex::new(0.3, InsertMode::Aggregate);
        index.add_points_from_cloud(&PointCloud3D::from_points(&[Point3D::new(
            0.15, 0.15, 0.15,
        )]));
        let offsets = cell_center_offsets(3, 0.1);
        assert!(occupied_cell_centers(&index, 3, &offsets, 0.5, false).is_empty());
        assert!(occupied_block_centers(&index, false).is_empty());
    }

    #[test]
    fn test_block_centers_respect_isolation() {
        let n = 2;
        let index = single_block_index(n, &[(0, 0, 0)]);

        // a single stats-carrying block has no occupied neighbors
        let kept = occupied_block_centers(&index, false);
        assert_eq!(kept.len(), 1);
        let filtered = occupied_block_centers(&index, true);
        assert!(filtered.is_empty());
    }
}
