//! Regression-engine boundary.
//!
//! The Gaussian-process math itself (training, prediction, marginal
//! likelihood) is an external collaborator. This module defines the entire
//! contract the map depends on: the training-set representation, the
//! grouped log-space hyperparameter vector, the posterior shape, and the
//! [`RegressionEngine`] trait with its three operations. Nothing about the
//! regression internals leaks past this seam.

use crate::config::BcmMode;
use crate::core::math::Matrix;
use crate::core::{Point3D, PointCloud3D};

/// Shared regression hyperparameters, held in log space for unconstrained
/// optimization and grouped into mean-, covariance- and likelihood-function
/// components. One vector is applied identically to every block.
#[derive(Clone, Debug, PartialEq)]
pub struct Hyperparameters {
    /// Mean-function parameters (empty for a zero-mean prior).
    pub mean: Vec<f64>,
    /// Covariance-function parameters, e.g. `[ln ell, ln sigma_f]`.
    pub cov: Vec<f64>,
    /// Likelihood parameters, e.g. `[ln sigma_n, ln sigma_nd]`.
    pub lik: Vec<f64>,
}

impl Hyperparameters {
    /// Create from explicit component groups (already in log space).
    pub fn new(mean: Vec<f64>, cov: Vec<f64>, lik: Vec<f64>) -> Self {
        Self { mean, cov, lik }
    }

    /// Generic zero-mean surface prior: length-scale 0.5, signal magnitude
    /// 1.5, value noise 0.1, derivative noise 0.2.
    pub fn surface_prior() -> Self {
        Self {
            mean: Vec::new(),
            cov: vec![(0.5f64).ln(), (1.5f64).ln()],
            lik: vec![(0.1f64).ln(), (0.2f64).ln()],
        }
    }

    /// Total number of parameters across all groups.
    pub fn len(&self) -> usize {
        self.mean.len() + self.cov.len() + self.lik.len()
    }

    /// Check if there are no parameters at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all groups into one flat vector (mean, cov, lik order).
    pub fn flatten(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.len());
        flat.extend_from_slice(&self.mean);
        flat.extend_from_slice(&self.cov);
        flat.extend_from_slice(&self.lik);
        flat
    }

    /// Rebuild grouped hyperparameters from a flat vector, using this
    /// value's group sizes.
    ///
    /// # Panics
    /// Panics if `flat.len()` differs from [`Hyperparameters::len`].
    pub fn with_flattened(&self, flat: &[f64]) -> Self {
        assert_eq!(flat.len(), self.len(), "flat vector length mismatch");
        let (mean, rest) = flat.split_at(self.mean.len());
        let (cov, lik) = rest.split_at(self.cov.len());
        Self {
            mean: mean.to_vec(),
            cov: cov.to_vec(),
            lik: lik.to_vec(),
        }
    }
}

/// Training data for one block: positions, optional derivative (normal)
/// observations, and target values.
#[derive(Clone, Debug, Default)]
pub struct TrainingSet {
    /// Observation positions.
    pub positions: Vec<Point3D>,
    /// Per-point unit normals when the input cloud carried them.
    pub normals: Option<Vec<Point3D>>,
    /// Per-point target values (0.0 for on-surface hits).
    pub targets: Vec<f64>,
}

impl TrainingSet {
    /// Gather the training set for the given point indices of a cloud.
    ///
    /// Indices are expected to be valid for the cloud; they come from the
    /// spatial index, which rebuilds them for every input cloud.
    pub fn from_cloud_indices(cloud: &PointCloud3D, indices: &[usize]) -> Self {
        let mut positions = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());
        let mut normals = cloud
            .has_normals()
            .then(|| Vec::with_capacity(indices.len()));
        for &i in indices {
            positions.push(cloud.position(i));
            targets.push(cloud.target(i) as f64);
            if let Some(ns) = normals.as_mut() {
                // has_normals() guarantees presence
                ns.push(cloud.normal(i).unwrap_or(Point3D::ZERO));
            }
        }
        Self {
            positions,
            normals,
            targets,
        }
    }

    /// Number of observations.
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Posterior estimate at a block's cell centers.
#[derive(Clone, Debug)]
pub enum Posterior {
    /// Mean and scalar variance per cell.
    Independent {
        /// Posterior mean per cell.
        mean: Vec<f64>,
        /// Posterior variance per cell (non-negative).
        variance: Vec<f64>,
    },
    /// Mean per cell and one covariance matrix over all cells.
    Dependent {
        /// Posterior mean per cell.
        mean: Vec<f64>,
        /// Posterior covariance over the block's cells.
        covariance: Matrix,
    },
}

impl Posterior {
    /// Number of cells covered by this posterior.
    pub fn len(&self) -> usize {
        match self {
            Posterior::Independent { mean, .. } => mean.len(),
            Posterior::Dependent { mean, .. } => mean.len(),
        }
    }

    /// Check if the posterior covers no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Posterior mean vector.
    pub fn mean(&self) -> &[f64] {
        match self {
            Posterior::Independent { mean, .. } => mean,
            Posterior::Dependent { mean, .. } => mean,
        }
    }

    /// Marginal variance of cell `i` (diagonal entry in dependent mode).
    pub fn variance_at(&self, i: usize) -> f64 {
        match self {
            Posterior::Independent { variance, .. } => variance[i],
            Posterior::Dependent { covariance, .. } => covariance.at(i, i),
        }
    }
}

/// Regression-engine failure, reported per block and consumed by the
/// update pass as a skip-and-continue signal.
#[derive(Debug, Clone)]
pub enum RegressionError {
    /// The training set was empty or otherwise unusable.
    EmptyTrainingSet,
    /// A returned quantity had the wrong dimension.
    DimensionMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Numerical failure inside the engine (factorization, overflow, ...).
    Numerical(String),
}

impl std::fmt::Display for RegressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegressionError::EmptyTrainingSet => write!(f, "empty training set"),
            RegressionError::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            RegressionError::Numerical(msg) => write!(f, "numerical failure: {msg}"),
        }
    }
}

impl std::error::Error for RegressionError {}

/// The external Gaussian-process capability this map consumes.
///
/// Implementations must treat every call as read-only with respect to map
/// state; in particular [`RegressionEngine::negative_log_marginal_likelihood`]
/// is evaluated repeatedly by the hyperparameter trainer and must be a pure
/// function of its arguments.
pub trait RegressionEngine {
    /// Refine hyperparameters on one training set by minimizing the
    /// negative log marginal likelihood with a bounded derivative-free
    /// search.
    ///
    /// Non-convergence is non-fatal: implementations return the best
    /// hyperparameters found within `max_iterations`.
    fn train(
        &self,
        hyp: &Hyperparameters,
        data: &TrainingSet,
        max_iterations: usize,
    ) -> Result<Hyperparameters, RegressionError>;

    /// Posterior at fixed test positions inside a block.
    ///
    /// Callers guarantee a non-empty, adequately sized training set; the
    /// mode selects between a variance vector and a full covariance.
    fn predict(
        &self,
        hyp: &Hyperparameters,
        data: &TrainingSet,
        test_positions: &[Point3D],
        mode: BcmMode,
    ) -> Result<Posterior, RegressionError>;

    /// Negative log marginal likelihood of one training set under the
    /// given hyperparameters. Used only by the hyperparameter trainer.
    fn negative_log_marginal_likelihood(
        &self,
        hyp: &Hyperparameters,
        data: &TrainingSet,
    ) -> Result<f64, RegressionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_prior_grouping() {
        let hyp = Hyperparameters::surface_prior();
        assert!(hyp.mean.is_empty());
        assert_eq!(hyp.cov.len(), 2);
        assert_eq!(hyp.lik.len(), 2);
        assert_eq!(hyp.len(), 4);
        assert!((hyp.cov[0].exp() - 0.5).abs() < 1e-12);
        assert!((hyp.lik[1].exp() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_flatten_round_trip() {
        let hyp = Hyperparameters::new(vec![0.1], vec![0.2, 0.3], vec![0.4, 0.5]);
        let flat = hyp.flatten();
        assert_eq!(flat, vec![0.1, 0.2, 0.3, 0.4, 0.5]);
        let rebuilt = hyp.with_flattened(&flat);
        assert_eq!(rebuilt, hyp);
    }

    #[test]
    fn test_training_set_from_indices() {
        let cloud = PointCloud3D::from_points(&[
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
        ])
        .with_targets(vec![0.0, 0.5, 1.0]);
        let ts = TrainingSet::from_cloud_indices(&cloud, &[2, 0]);
        assert_eq!(ts.len(), 2);
        assert_eq!(ts.positions[0], Point3D::new(2.0, 0.0, 0.0));
        assert_eq!(ts.targets, vec![1.0, 0.0]);
        assert!(ts.normals.is_none());
    }

    #[test]
    fn test_posterior_variance_access() {
        let ind = Posterior::Independent {
            mean: vec![0.0, 1.0],
            variance: vec![0.5, 0.25],
        };
        assert_eq!(ind.variance_at(1), 0.25);

        let dep = Posterior::Dependent {
            mean: vec![0.0, 1.0],
            covariance: Matrix::from_diagonal(&[0.5, 0.25]),
        };
        assert_eq!(dep.len(), 2);
        assert_eq!(dep.variance_at(0), 0.5);
    }
}
