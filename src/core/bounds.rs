//! Axis-aligned bounding box for the block grid.
//!
//! [`Bounds3D`] tracks the occupied extent of the map. The extent only ever
//! grows, and before it is used to key blocks it is snapped outward to whole
//! block-size multiples plus a one-block margin per axis, so that every
//! point's owning block and all 26 of its neighbors fall inside the box.

use super::point::Point3D;

/// Axis-aligned bounding box in 3D space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds3D {
    /// Minimum corner (smallest x, y and z values).
    pub min: Point3D,
    /// Maximum corner (largest x, y and z values).
    pub max: Point3D,
}

impl Bounds3D {
    /// Create a new bounding box from min and max corners.
    #[inline]
    pub const fn new(min: Point3D, max: Point3D) -> Self {
        Self { min, max }
    }

    /// Create an empty (invalid) bounding box.
    ///
    /// The empty bounds has min > max, so it will expand to fit any point.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point3D::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3D::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    /// Check if the bounds are empty (invalid).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Create bounds from a single point.
    #[inline]
    pub fn from_point(point: Point3D) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Size of the bounding box as a Point3D (extent per axis).
    #[inline]
    pub fn size(&self) -> Point3D {
        self.max - self.min
    }

    /// Check if a point is inside the bounding box.
    #[inline]
    pub fn contains(&self, point: Point3D) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Check if this bounds fully contains another.
    #[inline]
    pub fn contains_bounds(&self, other: &Bounds3D) -> bool {
        other.is_empty() || (self.contains(other.min) && self.contains(other.max))
    }

    /// Compute the union of two bounds (smallest box containing both).
    #[inline]
    pub fn union(&self, other: &Bounds3D) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Expand bounds to include a point.
    #[inline]
    pub fn expand_to_include(&mut self, point: Point3D) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Snap outward to whole block-size multiples plus a margin of
    /// `margin_blocks` blocks per axis.
    ///
    /// The snapped corners land exactly on the global block lattice
    /// (multiples of `block_size` from the world origin), so any two
    /// snapped boxes differ by whole blocks per axis.
    pub fn snapped_to_blocks(&self, block_size: f32, margin_blocks: i32) -> Bounds3D {
        debug_assert!(block_size > 0.0);
        let m = margin_blocks as f32;
        let snap_down = |v: f32| ((v / block_size).floor() - m) * block_size;
        let snap_up = |v: f32| ((v / block_size).ceil() + m) * block_size;
        Bounds3D {
            min: Point3D::new(
                snap_down(self.min.x),
                snap_down(self.min.y),
                snap_down(self.min.z),
            ),
            max: Point3D::new(
                snap_up(self.max.x),
                snap_up(self.max.y),
                snap_up(self.max.z),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty() {
        let bounds = Bounds3D::empty();
        assert!(bounds.is_empty());

        let valid = Bounds3D::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0));
        assert!(!valid.is_empty());
    }

    #[test]
    fn test_contains() {
        let bounds = Bounds3D::new(Point3D::ZERO, Point3D::new(10.0, 10.0, 10.0));
        assert!(bounds.contains(Point3D::new(5.0, 5.0, 5.0)));
        assert!(bounds.contains(Point3D::ZERO));
        assert!(bounds.contains(Point3D::new(10.0, 10.0, 10.0)));
        assert!(!bounds.contains(Point3D::new(-0.1, 5.0, 5.0)));
        assert!(!bounds.contains(Point3D::new(5.0, 5.0, 10.1)));
    }

    #[test]
    fn test_union_with_empty() {
        let a = Bounds3D::new(Point3D::ZERO, Point3D::new(1.0, 2.0, 3.0));
        let empty = Bounds3D::empty();
        assert_eq!(a.union(&empty), a);
        assert_eq!(empty.union(&a), a);
    }

    #[test]
    fn test_expand_to_include() {
        let mut bounds = Bounds3D::empty();
        bounds.expand_to_include(Point3D::new(1.0, 2.0, 3.0));
        bounds.expand_to_include(Point3D::new(-1.0, 5.0, 0.0));
        assert_eq!(bounds.min, Point3D::new(-1.0, 2.0, 0.0));
        assert_eq!(bounds.max, Point3D::new(1.0, 5.0, 3.0));
    }

    #[test]
    fn test_snap_adds_margin() {
        let bounds = Bounds3D::new(
            Point3D::new(0.05, 0.05, 0.05),
            Point3D::new(0.15, 0.15, 0.15),
        );
        let snapped = bounds.snapped_to_blocks(0.1, 1);

        // floor(0.5) - 1 = -1 block, ceil(1.5) + 1 = 3 blocks
        assert_relative_eq!(snapped.min.x, -0.1, epsilon = 1e-6);
        assert_relative_eq!(snapped.max.x, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_snap_is_superset() {
        let bounds = Bounds3D::new(
            Point3D::new(-0.32, 0.11, 1.7),
            Point3D::new(0.44, 0.93, 2.6),
        );
        let snapped = bounds.snapped_to_blocks(0.25, 1);
        assert!(snapped.contains_bounds(&bounds));
    }

    #[test]
    fn test_snap_lands_on_lattice() {
        let bounds = Bounds3D::new(
            Point3D::new(0.07, -0.21, 0.33),
            Point3D::new(0.61, 0.12, 0.55),
        );
        let block = 0.2;
        let snapped = bounds.snapped_to_blocks(block, 1);
        for v in [
            snapped.min.x,
            snapped.min.y,
            snapped.min.z,
            snapped.max.x,
            snapped.max.y,
            snapped.max.z,
        ] {
            let blocks = v / block;
            assert_relative_eq!(blocks, blocks.round(), epsilon = 1e-4);
        }
    }
}
