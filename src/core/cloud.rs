//! Input point-cloud container.
//!
//! A [`PointCloud3D`] is one batch of streamed observations: 3D positions,
//! optionally paired per point with a surface-normal (derivative)
//! observation and a target value. Surface hits carry a target of 0.0; any
//! virtual free-space points synthesized upstream from the sensor geometry
//! arrive as ordinary points with positive targets.

use super::bounds::Bounds3D;
use super::point::Point3D;

/// A batch of 3D observations fed to the map.
#[derive(Clone, Debug, Default)]
pub struct PointCloud3D {
    positions: Vec<Point3D>,
    normals: Option<Vec<Point3D>>,
    targets: Option<Vec<f32>>,
}

impl PointCloud3D {
    /// Create a new empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cloud of plain surface hits (no normals, all targets 0.0).
    pub fn from_points(points: &[Point3D]) -> Self {
        Self {
            positions: points.to_vec(),
            normals: None,
            targets: None,
        }
    }

    /// Attach per-point surface normals.
    ///
    /// # Panics
    /// Panics if `normals.len()` differs from the number of points.
    pub fn with_normals(mut self, normals: Vec<Point3D>) -> Self {
        assert_eq!(
            normals.len(),
            self.positions.len(),
            "one normal per point required"
        );
        self.normals = Some(normals);
        self
    }

    /// Attach per-point target values (overrides the 0.0 default).
    ///
    /// # Panics
    /// Panics if `targets.len()` differs from the number of points.
    pub fn with_targets(mut self, targets: Vec<f32>) -> Self {
        assert_eq!(
            targets.len(),
            self.positions.len(),
            "one target per point required"
        );
        self.targets = Some(targets);
        self
    }

    /// Number of points in the cloud (finite or not).
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Position of point `i`.
    #[inline]
    pub fn position(&self, i: usize) -> Point3D {
        self.positions[i]
    }

    /// Normal of point `i`, if normals were provided.
    #[inline]
    pub fn normal(&self, i: usize) -> Option<Point3D> {
        self.normals.as_ref().map(|n| n[i])
    }

    /// Target value of point `i` (0.0 when none were provided).
    #[inline]
    pub fn target(&self, i: usize) -> f32 {
        self.targets.as_ref().map(|t| t[i]).unwrap_or(0.0)
    }

    /// Whether the cloud carries normals.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Positions slice.
    #[inline]
    pub fn positions(&self) -> &[Point3D] {
        &self.positions
    }

    /// Bounding box of the finite points only.
    ///
    /// Returns an empty bounds if the cloud has no finite points.
    pub fn finite_bounds(&self) -> Bounds3D {
        let mut bounds = Bounds3D::empty();
        for p in &self.positions {
            if p.is_finite() {
                bounds.expand_to_include(*p);
            }
        }
        bounds
    }

    /// Number of finite points.
    pub fn finite_count(&self) -> usize {
        self.positions.iter().filter(|p| p.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points_defaults() {
        let cloud = PointCloud3D::from_points(&[Point3D::new(1.0, 2.0, 3.0)]);
        assert_eq!(cloud.len(), 1);
        assert!(!cloud.has_normals());
        assert_eq!(cloud.target(0), 0.0);
        assert!(cloud.normal(0).is_none());
    }

    #[test]
    fn test_with_normals_and_targets() {
        let cloud = PointCloud3D::from_points(&[Point3D::ZERO, Point3D::new(1.0, 0.0, 0.0)])
            .with_normals(vec![Point3D::new(0.0, 0.0, 1.0); 2])
            .with_targets(vec![0.0, 0.01]);
        assert!(cloud.has_normals());
        assert_eq!(cloud.normal(1), Some(Point3D::new(0.0, 0.0, 1.0)));
        assert_eq!(cloud.target(1), 0.01);
    }

    #[test]
    #[should_panic(expected = "one normal per point")]
    fn test_normal_length_mismatch_panics() {
        let _ = PointCloud3D::from_points(&[Point3D::ZERO]).with_normals(vec![]);
    }

    #[test]
    fn test_finite_bounds_skips_non_finite() {
        let cloud = PointCloud3D::from_points(&[
            Point3D::new(1.0, 1.0, 1.0),
            Point3D::new(f32::NAN, 0.0, 0.0),
            Point3D::new(-2.0, 0.5, 3.0),
        ]);
        let bounds = cloud.finite_bounds();
        assert_eq!(bounds.min, Point3D::new(-2.0, 0.5, 1.0));
        assert_eq!(bounds.max, Point3D::new(1.0, 1.0, 3.0));
        assert_eq!(cloud.finite_count(), 2);
    }

    #[test]
    fn test_finite_bounds_of_empty_cloud() {
        let cloud = PointCloud3D::new();
        assert!(cloud.finite_bounds().is_empty());
    }
}
