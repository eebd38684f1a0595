//! Hash-keyed spatial index and bounding-box manager.
//!
//! Space is partitioned into a regular grid of cubic blocks keyed by
//! [`BlockKey`] in a flat hashmap; 26-neighbor and 27-neighborhood lookups
//! are O(1) key arithmetic. The bounding box grows monotonically and is
//! always snapped outward to whole block-size multiples plus a one-block
//! margin per axis, which guarantees that every populated block and all of
//! its 26 neighbor keys stay inside the valid key range `[0, max_key]`.
//!
//! Growing below the current origin shifts the origin by whole blocks; all
//! existing keys are rehashed by the same shift, so a block's world-space
//! bounds never move once created.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::InsertMode;
use crate::core::{BlockKey, Bounds3D, Point3D, PointCloud3D};

use super::block::Block;

/// Spatial index of fixed-size blocks over a dynamically growing
/// bounding box.
#[derive(Clone, Debug)]
pub struct BlockIndex {
    blocks: HashMap<BlockKey, Block>,
    bounds: Bounds3D,
    block_size: f32,
    insert_mode: InsertMode,
}

impl BlockIndex {
    /// Create an empty index.
    pub fn new(block_size: f32, insert_mode: InsertMode) -> Self {
        debug_assert!(block_size > 0.0);
        Self {
            blocks: HashMap::new(),
            bounds: Bounds3D::empty(),
            block_size,
            insert_mode,
        }
    }

    /// Edge length of one block in meters.
    #[inline]
    pub fn block_size(&self) -> f32 {
        self.block_size
    }

    /// Point-index distribution mode.
    #[inline]
    pub fn insert_mode(&self) -> InsertMode {
        self.insert_mode
    }

    /// Current snapped bounding box (empty before any growth).
    #[inline]
    pub fn bounds(&self) -> Bounds3D {
        self.bounds
    }

    /// World position of block key (0, 0, 0)'s minimum corner.
    ///
    /// Only meaningful once the bounds are non-empty.
    #[inline]
    pub fn origin(&self) -> Point3D {
        self.bounds.min
    }

    /// Largest valid block key per axis, derived from the bounding box.
    pub fn max_key(&self) -> BlockKey {
        if self.bounds.is_empty() {
            return BlockKey::new(-1, -1, -1);
        }
        let size = self.bounds.size();
        BlockKey::new(
            (size.x / self.block_size).round() as i32 - 1,
            (size.y / self.block_size).round() as i32 - 1,
            (size.z / self.block_size).round() as i32 - 1,
        )
    }

    /// Number of blocks in the index (placeholders included).
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the index holds no blocks.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks holding points of the current cloud.
    pub fn populated_count(&self) -> usize {
        self.blocks.values().filter(|b| b.is_populated()).count()
    }

    /// Total number of point indices stored across all blocks.
    ///
    /// In duplicate mode this is 27x the inserted interior point count.
    pub fn total_points_in_blocks(&self) -> usize {
        self.blocks.values().map(|b| b.point_count()).sum()
    }

    /// Whether any block carries data (points or fused statistics).
    pub fn has_data(&self) -> bool {
        self.blocks
            .values()
            .any(|b| b.is_populated() || b.stats().is_set())
    }

    /// Shared access to a block.
    #[inline]
    pub fn block(&self, key: &BlockKey) -> Option<&Block> {
        self.blocks.get(key)
    }

    /// Mutable access to a block.
    #[inline]
    pub fn block_mut(&mut self, key: &BlockKey) -> Option<&mut Block> {
        self.blocks.get_mut(key)
    }

    /// Check whether a key is present.
    #[inline]
    pub fn contains_key(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    /// Iterate over all blocks.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &Block)> {
        self.blocks.iter()
    }

    /// All block keys in sorted order (deterministic traversal).
    pub fn sorted_keys(&self) -> Vec<BlockKey> {
        let mut keys: Vec<BlockKey> = self.blocks.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Whether a key touches the bounding-box boundary on any axis.
    pub fn is_boundary_key(&self, key: BlockKey) -> bool {
        let max = self.max_key();
        key.x == 0
            || key.y == 0
            || key.z == 0
            || key.x >= max.x
            || key.y >= max.y
            || key.z >= max.z
    }

    /// Owning block key of a world point.
    ///
    /// Only valid for points inside the current bounds.
    #[inline]
    pub fn key_for_point(&self, p: Point3D) -> BlockKey {
        let origin = self.origin();
        BlockKey::new(
            ((p.x - origin.x) / self.block_size).floor() as i32,
            ((p.y - origin.y) / self.block_size).floor() as i32,
            ((p.z - origin.z) / self.block_size).floor() as i32,
        )
    }

    /// Minimum corner of a block in world space.
    #[inline]
    pub fn block_min_point(&self, key: BlockKey) -> Point3D {
        self.origin()
            + Point3D::new(
                key.x as f32 * self.block_size,
                key.y as f32 * self.block_size,
                key.z as f32 * self.block_size,
            )
    }

    /// Center of a block in world space.
    #[inline]
    pub fn block_center(&self, key: BlockKey) -> Point3D {
        self.block_min_point(key)
            + Point3D::new(
                0.5 * self.block_size,
                0.5 * self.block_size,
                0.5 * self.block_size,
            )
    }

    /// Define the bounding box explicitly.
    ///
    /// The requested extent is snapped outward to block multiples plus a
    /// one-block margin and merged into the current bounds. Intended to be
    /// called up front to avoid repeated growth during streaming.
    ///
    /// # Panics
    /// Panics if any block already carries data and the snapped request
    /// does not cover the current bounds: shrinking the box would
    /// invalidate existing block keys, which is a broken spatial-index
    /// invariant.
    pub fn define_bounding_box(&mut self, min: Point3D, max: Point3D) {
        let snapped = Bounds3D::new(min, max).snapped_to_blocks(self.block_size, 1);
        if self.has_data() {
            assert!(
                snapped.contains_bounds(&self.bounds),
                "bounding box redefinition incompatible with populated blocks: \
                 {:?} does not cover {:?}",
                snapped,
                self.bounds
            );
        }
        self.apply_snapped_bounds(snapped);
    }

    /// Grow the bounds to cover `target` (plus the one-block margin).
    fn grow_to_include(&mut self, target: Bounds3D) {
        if target.is_empty() {
            return;
        }
        let snapped = target.snapped_to_blocks(self.block_size, 1);
        self.apply_snapped_bounds(snapped);
    }

    /// Merge a snapped box into the bounds, rehashing keys when the origin
    /// moves down.
    fn apply_snapped_bounds(&mut self, snapped: Bounds3D) {
        if !self.bounds.is_empty() && self.bounds.contains_bounds(&snapped) {
            return;
        }
        let merged = self.bounds.union(&snapped);
        if self.bounds.is_empty() {
            self.bounds = merged;
            return;
        }

        let old_origin = self.bounds.min;
        let shift = BlockKey::new(
            ((old_origin.x - merged.min.x) / self.block_size).round() as i32,
            ((old_origin.y - merged.min.y) / self.block_size).round() as i32,
            ((old_origin.z - merged.min.z) / self.block_size).round() as i32,
        );
        self.bounds = merged;

        if shift != BlockKey::new(0, 0, 0) {
            debug!(
                "origin moved by ({}, {}, {}) blocks, rehashing {} keys",
                shift.x,
                shift.y,
                shift.z,
                self.blocks.len()
            );
            let rehashed = self
                .blocks
                .drain()
                .map(|(key, block)| (key + shift, block))
                .collect();
            self.blocks = rehashed;
        }
    }

    /// Drop every block's point indices ahead of a new insertion pass.
    /// Fused statistics are untouched.
    pub fn reset_point_indices(&mut self) {
        for block in self.blocks.values_mut() {
            block.clear_indices();
        }
    }

    /// Insert one point index at its world position.
    ///
    /// Non-finite positions are skipped silently (returns false). The
    /// bounds grow as needed; in duplicate mode the index lands in the
    /// owning block and all 26 neighbors.
    pub fn insert_point(&mut self, idx: usize, p: Point3D) -> bool {
        if !p.is_finite() {
            return false;
        }
        self.grow_to_include(Bounds3D::from_point(p));

        let key = self.key_for_point(p);
        debug_assert!(key.is_within(self.max_key()));
        match self.insert_mode {
            InsertMode::Aggregate => {
                self.blocks.entry(key).or_default().push_index(idx);
            }
            InsertMode::Duplicate => {
                // the one-block margin keeps the whole neighborhood in range
                for neighbor in key.neighborhood_27() {
                    debug_assert!(neighbor.is_within(self.max_key()));
                    self.blocks.entry(neighbor).or_default().push_index(idx);
                }
            }
        }
        true
    }

    /// Insert a whole input cloud: reset the per-pass indices, grow the
    /// bounds over all finite points plus the one-block margin, and insert
    /// every finite point. Returns the number of points inserted.
    pub fn add_points_from_cloud(&mut self, cloud: &PointCloud3D) -> usize {
        self.reset_point_indices();

        let finite = cloud.finite_bounds();
        if finite.is_empty() {
            warn!("input cloud has no finite points, nothing inserted");
            return 0;
        }
        self.grow_to_include(finite);

        let mut inserted = 0;
        for i in 0..cloud.len() {
            if self.insert_point(i, cloud.position(i)) {
                inserted += 1;
            }
        }
        debug!(
            "inserted {} of {} points into {} blocks",
            inserted,
            cloud.len(),
            self.populated_count()
        );
        inserted
    }

    /// Create all 26 neighbors of every populated block as empty
    /// placeholders where absent.
    ///
    /// Idempotent; never alters a block that already exists. Must run
    /// before an aggregate-mode update pass so the 3x3x3 neighborhood read
    /// never encounters a missing key. Returns the number of placeholders
    /// created.
    pub fn create_empty_neighboring_blocks(&mut self) -> usize {
        let populated: Vec<BlockKey> = self
            .blocks
            .iter()
            .filter(|(_, b)| b.is_populated())
            .map(|(k, _)| *k)
            .collect();

        let max_key = self.max_key();
        let mut created = 0;
        for key in populated {
            for neighbor in key.neighbors_26() {
                // the insertion margin keeps neighbors of populated blocks
                // inside the box
                debug_assert!(neighbor.is_within(max_key));
                self.blocks.entry(neighbor).or_insert_with(|| {
                    created += 1;
                    Block::empty()
                });
            }
        }
        if created > 0 {
            debug!("created {} empty neighboring blocks", created);
        }
        created
    }

    /// Assemble the training-point indices for one block.
    ///
    /// Duplicate mode reads the block's own (already duplicated) list;
    /// aggregate mode takes the union over the 27-block neighborhood.
    pub fn collect_training_indices(&self, key: BlockKey) -> Vec<usize> {
        match self.insert_mode {
            InsertMode::Duplicate => self
                .blocks
                .get(&key)
                .map(|b| b.indices().to_vec())
                .unwrap_or_default(),
            InsertMode::Aggregate => {
                let mut indices = Vec::new();
                for neighbor in key.neighborhood_27() {
                    if let Some(block) = self.blocks.get(&neighbor) {
                        indices.extend_from_slice(block.indices());
                    }
                }
                indices
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cloud_of(points: &[(f32, f32, f32)]) -> PointCloud3D {
        let pts: Vec<Point3D> = points
            .iter()
            .map(|&(x, y, z)| Point3D::new(x, y, z))
            .collect();
        PointCloud3D::from_points(&pts)
    }

    #[test]
    fn test_insert_creates_owning_block() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        let cloud = cloud_of(&[(0.05, 0.05, 0.05)]);
        assert_eq!(index.add_points_from_cloud(&cloud), 1);
        assert_eq!(index.populated_count(), 1);
        assert_eq!(index.total_points_in_blocks(), 1);

        let key = index.key_for_point(Point3D::new(0.05, 0.05, 0.05));
        assert!(index.block(&key).unwrap().is_populated());
    }

    #[test]
    fn test_non_finite_points_skipped() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        let cloud = cloud_of(&[(0.0, 0.0, 0.0), (f32::NAN, 0.0, 0.0)]);
        assert_eq!(index.add_points_from_cloud(&cloud), 1);
        assert_eq!(index.total_points_in_blocks(), 1);
    }

    #[test]
    fn test_duplicate_mode_stores_27_copies() {
        let mut index = BlockIndex::new(0.1, InsertMode::Duplicate);
        let cloud = cloud_of(&[(0.05, 0.05, 0.05)]);
        index.add_points_from_cloud(&cloud);
        assert_eq!(index.total_points_in_blocks(), 27);
        assert_eq!(index.len(), 27);
    }

    #[test]
    fn test_margin_keeps_keys_interior() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        let cloud = cloud_of(&[(0.0, 0.0, 0.0), (0.95, 0.95, 0.95)]);
        index.add_points_from_cloud(&cloud);
        let max = index.max_key();
        for (key, block) in index.iter() {
            if block.is_populated() {
                assert!(key.x >= 1 && key.y >= 1 && key.z >= 1);
                assert!(key.x < max.x && key.y < max.y && key.z < max.z);
            }
        }
    }

    #[test]
    fn test_bounds_growth_is_monotonic() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05)]));
        let first = index.bounds();

        index.add_points_from_cloud(&cloud_of(&[(-1.0, 2.0, 0.5)]));
        let second = index.bounds();
        assert!(second.contains_bounds(&first));

        // growing below the origin must not move existing blocks
        let probe = Point3D::new(0.05, 0.05, 0.05);
        let min_pt = index.block_min_point(index.key_for_point(probe));
        assert!(min_pt.x <= probe.x && min_pt.x + 0.1 > probe.x);
    }

    #[test]
    fn test_rehash_preserves_block_world_position() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.55, 0.55, 0.55)]));
        let key_before = index.key_for_point(Point3D::new(0.55, 0.55, 0.55));
        let world_before = index.block_min_point(key_before);

        // force an origin shift by growing far below
        index.insert_point(1, Point3D::new(-2.0, -2.0, -2.0));

        let key_after = index.key_for_point(Point3D::new(0.55, 0.55, 0.55));
        assert!(key_after.x > key_before.x);
        let world_after = index.block_min_point(key_after);
        assert_relative_eq!(world_before.x, world_after.x, epsilon = 1e-5);
        assert_relative_eq!(world_before.y, world_after.y, epsilon = 1e-5);
        assert_relative_eq!(world_before.z, world_after.z, epsilon = 1e-5);
        // the shifted key still owns the original point's indices
        assert!(index.block(&key_after).unwrap().is_populated());
    }

    #[test]
    fn test_create_empty_neighbors_completeness() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05), (0.35, 0.05, 0.05)]));
        index.create_empty_neighboring_blocks();

        for (key, block) in index.iter() {
            if block.is_populated() {
                for neighbor in key.neighbors_26() {
                    assert!(index.contains_key(&neighbor));
                }
            }
        }
    }

    #[test]
    fn test_create_empty_neighbors_idempotent() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05)]));
        let created = index.create_empty_neighboring_blocks();
        assert_eq!(created, 26);
        assert_eq!(index.create_empty_neighboring_blocks(), 0);
        assert_eq!(index.len(), 27);
    }

    #[test]
    fn test_collect_training_indices_aggregate_union() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        // two points in adjacent blocks
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05), (0.15, 0.05, 0.05)]));
        index.create_empty_neighboring_blocks();

        let key = index.key_for_point(Point3D::new(0.05, 0.05, 0.05));
        let mut indices = index.collect_training_indices(key);
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_collect_training_indices_duplicate_self_contained() {
        let mut index = BlockIndex::new(0.1, InsertMode::Duplicate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05), (0.15, 0.05, 0.05)]));

        let key = index.key_for_point(Point3D::new(0.05, 0.05, 0.05));
        let mut indices = index.collect_training_indices(key);
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_reset_on_new_cloud() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05)]));
        assert_eq!(index.total_points_in_blocks(), 1);

        // second pass replaces the per-pass indices entirely
        index.add_points_from_cloud(&cloud_of(&[(0.55, 0.55, 0.55)]));
        assert_eq!(index.total_points_in_blocks(), 1);
    }

    #[test]
    fn test_define_bounding_box_up_front() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.define_bounding_box(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0));
        let bounds = index.bounds();
        assert!(bounds.contains(Point3D::ZERO));
        assert!(bounds.contains(Point3D::new(1.0, 1.0, 1.0)));
        // one-block margin on each side
        assert_relative_eq!(bounds.min.x, -0.1, epsilon = 1e-6);
        assert_relative_eq!(bounds.max.x, 1.1, epsilon = 1e-6);
    }

    #[test]
    #[should_panic(expected = "incompatible")]
    fn test_define_bounding_box_shrink_panics() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[(0.05, 0.05, 0.05), (2.0, 2.0, 2.0)]));
        index.define_bounding_box(Point3D::ZERO, Point3D::new(0.2, 0.2, 0.2));
    }

    #[test]
    fn test_sorted_keys_deterministic() {
        let mut index = BlockIndex::new(0.1, InsertMode::Aggregate);
        index.add_points_from_cloud(&cloud_of(&[
            (0.05, 0.05, 0.05),
            (0.75, 0.35, 0.15),
            (0.35, 0.75, 0.55),
        ]));
        let a = index.sorted_keys();
        let b = index.sorted_keys();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }
}
