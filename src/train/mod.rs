//! Whole-map hyperparameter training.
//!
//! Samples a subset of non-empty blocks, sums the regression engine's
//! negative log marginal likelihood over their training sets, and minimizes
//! that sum over the shared log-space hyperparameter vector with a bounded
//! derivative-free Nelder-Mead search. The trainer reads block state only;
//! it never runs concurrently with a fusion-writing update pass and never
//! mutates the map.

use log::{debug, info};
use rand::prelude::*;

use crate::config::MapConfig;
use crate::core::PointCloud3D;
use crate::gp::{Hyperparameters, RegressionEngine, TrainingSet};
use crate::index::BlockIndex;

/// Result of one hyperparameter-training run.
#[derive(Clone, Debug)]
pub struct TrainingOutcome {
    /// Refined hyperparameters (best found; non-convergence is non-fatal).
    pub hyperparameters: Hyperparameters,
    /// Achieved objective: sum of negative log marginal likelihoods.
    pub objective: f64,
    /// Number of blocks whose training sets entered the objective.
    pub blocks_used: usize,
    /// Optimizer iterations performed.
    pub iterations: usize,
    /// Whether the objective spread fell below the convergence threshold.
    pub converged: bool,
}

/// Hyperparameter-training failure.
#[derive(Debug, Clone)]
pub enum TrainError {
    /// No sampled block met the minimum training-set size.
    NoQualifyingBlocks,
    /// The objective was non-finite at the starting point.
    ObjectiveFailed,
}

impl std::fmt::Display for TrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainError::NoQualifyingBlocks => {
                write!(f, "no block meets the minimum training-set size")
            }
            TrainError::ObjectiveFailed => {
                write!(f, "objective not finite at the initial hyperparameters")
            }
        }
    }
}

impl std::error::Error for TrainError {}

/// Train the shared hyperparameters on a sampled subset of blocks.
///
/// `config.hyper_training_blocks` bounds the sample size; 0 means every
/// qualifying block. Under-sized training sets are skipped. The engine's
/// likelihood evaluation must be pure; evaluations that fail numerically
/// count as infinitely bad and steer the search away.
pub fn train_hyperparameters<E: RegressionEngine>(
    index: &BlockIndex,
    cloud: &PointCloud3D,
    config: &MapConfig,
    engine: &E,
    initial: &Hyperparameters,
) -> Result<TrainingOutcome, TrainError> {
    let populated: Vec<_> = index
        .iter()
        .filter(|(_, b)| b.is_populated())
        .map(|(k, _)| *k)
        .collect();

    let sample_size = if config.hyper_training_blocks == 0 {
        populated.len()
    } else {
        config.hyper_training_blocks.min(populated.len())
    };
    let mut rng = rand::rng();
    let sampled = populated.choose_multiple(&mut rng, sample_size);

    let mut training_sets = Vec::new();
    for &key in sampled {
        let indices = index.collect_training_indices(key);
        if indices.len() < config.min_points_to_predict {
            continue;
        }
        training_sets.push(TrainingSet::from_cloud_indices(cloud, &indices));
    }
    if training_sets.is_empty() {
        return Err(TrainError::NoQualifyingBlocks);
    }
    debug!(
        "training hyperparameters on {} of {} populated blocks",
        training_sets.len(),
        populated.len()
    );

    let objective = |flat: &[f64]| -> f64 {
        let hyp = initial.with_flattened(flat);
        let mut sum = 0.0;
        for ts in &training_sets {
            match engine.negative_log_marginal_likelihood(&hyp, ts) {
                Ok(nlml) if nlml.is_finite() => sum += nlml,
                Ok(_) | Err(_) => return f64::INFINITY,
            }
        }
        sum
    };

    let x0 = initial.flatten();
    let f0 = objective(&x0);
    if !f0.is_finite() {
        return Err(TrainError::ObjectiveFailed);
    }

    // nothing to optimize over: report the evaluated objective
    if x0.is_empty() {
        return Ok(TrainingOutcome {
            hyperparameters: initial.clone(),
            objective: f0,
            blocks_used: training_sets.len(),
            iterations: 0,
            converged: true,
        });
    }

    let search = nelder_mead(
        &objective,
        &x0,
        f0,
        config.optimizer.initial_step,
        config.optimizer.max_iterations,
        config.optimizer.convergence_threshold,
    );
    info!(
        "hyperparameter training: objective {:.4} -> {:.4} in {} iterations (converged: {})",
        f0, search.best_value, search.iterations, search.converged
    );

    Ok(TrainingOutcome {
        hyperparameters: initial.with_flattened(&search.best_point),
        objective: search.best_value,
        blocks_used: training_sets.len(),
        iterations: search.iterations,
        converged: search.converged,
    })
}

struct SearchResult {
    best_point: Vec<f64>,
    best_value: f64,
    iterations: usize,
    converged: bool,
}

/// Bounded Nelder-Mead simplex minimization.
///
/// Standard reflection/expansion/contraction/shrink coefficients
/// (1, 2, 0.5, 0.5). Stops once the objective spread across the simplex
/// falls below `tolerance` or `max_iterations` is reached; always returns
/// the best vertex found.
fn nelder_mead(
    objective: &dyn Fn(&[f64]) -> f64,
    x0: &[f64],
    f0: f64,
    initial_step: f64,
    max_iterations: usize,
    tolerance: f64,
) -> SearchResult {
    let dim = x0.len();
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(dim + 1);
    simplex.push((x0.to_vec(), f0));
    for i in 0..dim {
        let mut x = x0.to_vec();
        x[i] += initial_step;
        let f = objective(&x);
        simplex.push((x, f));
    }
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;

        let spread = simplex[dim].1 - simplex[0].1;
        if spread.abs() <= tolerance {
            converged = true;
            break;
        }

        // centroid of all vertices except the worst
        let mut centroid = vec![0.0; dim];
        for (x, _) in &simplex[..dim] {
            for (c, v) in centroid.iter_mut().zip(x) {
                *c += v;
            }
        }
        for c in centroid.iter_mut() {
            *c /= dim as f64;
        }

        let worst = simplex[dim].clone();
        let reflected: Vec<f64> = centroid
            .iter()
            .zip(&worst.0)
            .map(|(c, w)| c + (c - w))
            .collect();
        let f_reflected = objective(&reflected);

        if f_reflected < simplex[0].1 {
            // try to go further in the same direction
            let expanded: Vec<f64> = centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + 2.0 * (c - w))
                .collect();
            let f_expanded = objective(&expanded);
            simplex[dim] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[dim - 1].1 {
            simplex[dim] = (reflected, f_reflected);
        } else {
            let contracted: Vec<f64> = centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + 0.5 * (w - c))
                .collect();
            let f_contracted = objective(&contracted);
            if f_contracted < worst.1 {
                simplex[dim] = (contracted, f_contracted);
            } else {
                // shrink everything toward the best vertex
                let best = simplex[0].0.clone();
                for (x, f) in simplex.iter_mut().skip(1) {
                    for (v, b) in x.iter_mut().zip(&best) {
                        *v = b + 0.5 * (*v - b);
                    }
                    *f = objective(x);
                }
            }
        }

        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    }

    let (best_point, best_value) = simplex.swap_remove(0);
    SearchResult {
        best_point,
        best_value,
        iterations,
        converged,
    }
}
