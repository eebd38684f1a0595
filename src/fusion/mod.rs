//! Bayesian Committee Machine fusion of per-block posterior estimates.
//!
//! Each update pass produces one posterior "expert" per block; fusion
//! combines it with the block's previously stored statistic by
//! precision-weighted averaging. In independent mode that is a scalar
//! division per cell; in dependent mode it is a sum of precision matrices
//! with the fused mean solved through the combined precision.
//!
//! Fusion is pure: it builds the new statistic from the prior and the
//! posterior and only the caller commits it, so a numerical failure leaves
//! the previously fused state untouched.

use crate::gp::Posterior;
use crate::index::BlockStats;

/// Variances never fall below this floor, keeping precisions finite no
/// matter how much information accumulates.
const MIN_VARIANCE: f64 = 1e-12;

/// Fusion failure for one block. The update pass logs it and skips the
/// block; the prior statistic stays in place.
#[derive(Debug, Clone)]
pub enum FusionError {
    /// A covariance (prior or new) was not positive definite.
    NotPositiveDefinite,
    /// Prior and posterior disagree on representation (scalar vs. matrix).
    ModeMismatch,
    /// Two quantities that must cover the same cells disagree in length.
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// The posterior carried a non-finite or negative variance.
    InvalidVariance,
}

impl std::fmt::Display for FusionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FusionError::NotPositiveDefinite => {
                write!(f, "covariance not positive definite")
            }
            FusionError::ModeMismatch => {
                write!(f, "prior and posterior representation mismatch")
            }
            FusionError::LengthMismatch { expected, actual } => {
                write!(f, "cell count mismatch: expected {expected}, got {actual}")
            }
            FusionError::InvalidVariance => write!(f, "non-finite or negative variance"),
        }
    }
}

impl std::error::Error for FusionError {}

/// Precision-weighted fusion of two scalar estimates of the same quantity.
///
/// Returns the fused (mean, variance). The fused variance never exceeds
/// either input variance: combining information can only tighten the
/// estimate.
///
/// # Example
/// ```
/// use ghana_map::fusion::fuse_scalar;
///
/// let (mean, variance) = fuse_scalar(0.0, 1.0, 2.0, 1.0);
/// assert!((mean - 1.0).abs() < 1e-12);
/// assert!((variance - 0.5).abs() < 1e-12);
/// ```
#[inline]
pub fn fuse_scalar(m1: f64, v1: f64, m2: f64, v2: f64) -> (f64, f64) {
    let v1 = v1.max(MIN_VARIANCE);
    let v2 = v2.max(MIN_VARIANCE);
    let p1 = 1.0 / v1;
    let p2 = 1.0 / v2;
    let fused_precision = p1 + p2;
    let mean = (p1 * m1 + p2 * m2) / fused_precision;
    // algebraically <= min(v1, v2); the clamp guards rounding
    let variance = (1.0 / fused_precision).min(v1).min(v2).max(MIN_VARIANCE);
    (mean, variance)
}

/// Fuse a new posterior into a block's stored statistic.
///
/// The first fusion for an unset block stores the posterior directly
/// (variances clamped positive). Later fusions apply the precision-weighted
/// BCM rule per cell (independent) or on the block covariance (dependent).
pub fn fused(prior: &BlockStats, posterior: &Posterior) -> Result<BlockStats, FusionError> {
    validate(posterior)?;
    match (prior, posterior) {
        (BlockStats::Unset, Posterior::Independent { mean, variance }) => {
            Ok(BlockStats::Independent {
                mean: mean.clone(),
                variance: variance.iter().map(|v| v.max(MIN_VARIANCE)).collect(),
            })
        }
        (BlockStats::Unset, Posterior::Dependent { mean, covariance }) => {
            // reject covariances a later fusion could not invert
            if covariance.cholesky().is_none() {
                return Err(FusionError::NotPositiveDefinite);
            }
            Ok(BlockStats::Dependent {
                mean: mean.clone(),
                covariance: covariance.clone(),
            })
        }
        (
            BlockStats::Independent {
                mean: prior_mean,
                variance: prior_var,
            },
            Posterior::Independent { mean, variance },
        ) => {
            if prior_mean.len() != mean.len() {
                return Err(FusionError::LengthMismatch {
                    expected: prior_mean.len(),
                    actual: mean.len(),
                });
            }
            let mut fused_mean = Vec::with_capacity(mean.len());
            let mut fused_var = Vec::with_capacity(mean.len());
            for i in 0..mean.len() {
                let (m, v) = fuse_scalar(prior_mean[i], prior_var[i], mean[i], variance[i]);
                fused_mean.push(m);
                fused_var.push(v);
            }
            Ok(BlockStats::Independent {
                mean: fused_mean,
                variance: fused_var,
            })
        }
        (
            BlockStats::Dependent {
                mean: prior_mean,
                covariance: prior_cov,
            },
            Posterior::Dependent { mean, covariance },
        ) => {
            if prior_mean.len() != mean.len() {
                return Err(FusionError::LengthMismatch {
                    expected: prior_mean.len(),
                    actual: mean.len(),
                });
            }
            let p1 = prior_cov
                .cholesky()
                .ok_or(FusionError::NotPositiveDefinite)?
                .inverse();
            let p2 = covariance
                .cholesky()
                .ok_or(FusionError::NotPositiveDefinite)?
                .inverse();
            let fused_precision = p1.add(&p2);
            let chol = fused_precision
                .cholesky()
                .ok_or(FusionError::NotPositiveDefinite)?;

            // fused mean solves (P1 + P2) m = P1 m1 + P2 m2
            let mut rhs = p1.mul_vec(prior_mean);
            for (r, v) in rhs.iter_mut().zip(p2.mul_vec(mean)) {
                *r += v;
            }
            let fused_mean = chol.solve(&rhs);
            let fused_cov = chol.inverse();
            Ok(BlockStats::Dependent {
                mean: fused_mean,
                covariance: fused_cov,
            })
        }
        _ => Err(FusionError::ModeMismatch),
    }
}

fn validate(posterior: &Posterior) -> Result<(), FusionError> {
    match posterior {
        Posterior::Independent { mean, variance } => {
            if mean.len() != variance.len() {
                return Err(FusionError::LengthMismatch {
                    expected: mean.len(),
                    actual: variance.len(),
                });
            }
            for (&m, &v) in mean.iter().zip(variance) {
                if !m.is_finite() || !v.is_finite() || v < 0.0 {
                    return Err(FusionError::InvalidVariance);
                }
            }
        }
        Posterior::Dependent { mean, covariance } => {
            if covariance.rows() != mean.len() || covariance.cols() != mean.len() {
                return Err(FusionError::LengthMismatch {
                    expected: mean.len(),
                    actual: covariance.rows(),
                });
            }
            for &m in mean {
                if !m.is_finite() {
                    return Err(FusionError::InvalidVariance);
                }
            }
            for i in 0..covariance.rows() {
                let v = covariance.at(i, i);
                if !v.is_finite() || v < 0.0 {
                    return Err(FusionError::InvalidVariance);
                }
            }
        }
    }
    Ok(())
}
