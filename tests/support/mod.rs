//! Shared test support: deterministic stand-ins for the external
//! regression engine.

use ghana_map::core::math::Matrix;
use ghana_map::{
    BcmMode, Hyperparameters, Point3D, Posterior, RegressionEngine, RegressionError, TrainingSet,
};

/// Deterministic engine: posterior mean equals the training-target mean,
/// posterior variance shrinks as 1/n with the training-set size.
///
/// The 1/n variance mimics the information growth of a real GP posterior
/// closely enough to exercise fusion and extraction end to end.
pub struct MockEngine {
    /// Variance of a single-point training set.
    pub base_variance: f64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self { base_variance: 1.0 }
    }
}

impl MockEngine {
    /// Posterior variance for a training set of `n` points.
    pub fn variance_for(&self, n: usize) -> f64 {
        self.base_variance / n.max(1) as f64
    }
}

impl RegressionEngine for MockEngine {
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
        let mean_value = data.targets.iter().sum::<f64>() / data.len() as f64;
        let variance = self.variance_for(data.len());
        let cells = test_positions.len();
        match mode {
            BcmMode::Independent => Ok(Posterior::Independent {
                mean: vec![mean_value; cells],
                variance: vec![variance; cells],
            }),
            BcmMode::Dependent => Ok(Posterior::Dependent {
                mean: vec![mean_value; cells],
                covariance: Matrix::from_diagonal(&vec![variance; cells]),
            }),
        }
    }

    fn negative_log_marginal_likelihood(
        &self,
        hyp: &Hyperparameters,
        data: &TrainingSet,
    ) -> Result<f64, RegressionError> {
        // smooth bowl with its minimum at the all-zero log vector, offset
        // by the set size so every block contributes
        let bowl: f64 = hyp.flatten().iter().map(|v| v * v).sum();
        Ok(data.len() as f64 * 0.01 + bowl)
    }
}

/// Engine that fails every operation; used to verify skip-and-continue.
pub struct FailingEngine;

impl RegressionEngine for FailingEngine {
    fn train(
        &self,
        _hyp: &Hyperparameters,
        _data: &TrainingSet,
        _max_iterations: usize,
    ) -> Result<Hyperparameters, RegressionError> {
        Err(RegressionError::Numerical("forced failure".into()))
    }

    fn predict(
        &self,
        _hyp: &Hyperparameters,
        _data: &TrainingSet,
        _test_positions: &[Point3D],
        _mode: BcmMode,
    ) -> Result<Posterior, RegressionError> {
        Err(RegressionError::Numerical("forced failure".into()))
    }

    fn negative_log_marginal_likelihood(
        &self,
        _hyp: &Hyperparameters,
        _data: &TrainingSet,
    ) -> Result<f64, RegressionError> {
        Err(RegressionError::Numerical("forced failure".into()))
    }
}
