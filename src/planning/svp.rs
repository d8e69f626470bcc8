//! The structured value-based planning loop.
//!
//! Every iteration draws a fresh Bernoulli mask over the state-action grid,
//! evaluates the exact Bellman backup on the masked pairs only, and hands the
//! sparse result to the matrix estimator to obtain the next dense Q-matrix.

use std::path::PathBuf;

use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Result, SvpError};
use crate::estimation::{EstimatorConfig, MatrixEstimator};
use crate::mdp::{check_dimensions, checked_transition, MarkovDecisionProcess};
use crate::persist::write_q_matrix;
use crate::planning::sampling::ObservationMask;
use crate::policy::Policy;

/// Configuration for the planner
#[derive(Debug, Clone)]
pub struct SvpConfig {
    /// Probability with which each state-action pair is backed up per round.
    pub observation_probability: f64,
    /// Discount factor, in `[0, 1)`.
    pub gamma: f64,
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop once `max |Q(t+1) - Q(t)|` drops below this.
    pub tolerance: f64,
    /// Seed for the sampling RNG; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub estimator: EstimatorConfig,
    /// Where to dump the final Q-matrix, if anywhere.
    pub output_path: Option<PathBuf>,
}

impl Default for SvpConfig {
    fn default() -> Self {
        Self {
            observation_probability: 0.4,
            gamma: 0.9,
            max_iterations: 500,
            tolerance: 1e-6,
            seed: None,
            estimator: EstimatorConfig::default(),
            output_path: None,
        }
    }
}

impl SvpConfig {
    pub fn validate(&self) -> Result<()> {
        let p = self.observation_probability;
        if !(p > 0.0 && p <= 1.0) {
            return Err(SvpError::invalid_config(format!(
                "observation probability must lie in (0, 1], got {}",
                p
            )));
        }
        if !(0.0..1.0).contains(&self.gamma) {
            return Err(SvpError::invalid_config(format!(
                "discount factor must lie in [0, 1), got {}",
                self.gamma
            )));
        }
        if self.max_iterations == 0 {
            return Err(SvpError::invalid_config(
                "iteration cap must be at least 1",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SvpError::invalid_config(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        self.estimator.validate()
    }
}

/// Result of a planning run.
#[derive(Debug, Clone)]
pub struct SvpOutcome {
    /// The last reconstructed Q-matrix, rows = states, columns = actions.
    pub q: Array2<f64>,
    /// Number of iterations performed
    pub iterations: usize,
    /// Whether the change between iterations fell below the tolerance
    pub converged: bool,
    /// `max |Q(t+1) - Q(t)|` for every iteration that backed up at least one
    /// pair, in order. Rounds that sampled nothing carry `Q(t)` forward and
    /// record no change.
    pub deltas: Vec<f64>,
    /// Total number of Bellman backups evaluated over the run.
    pub observed_pairs: usize,
}

impl SvpOutcome {
    /// Greedy policy over the final Q-matrix.
    pub fn policy(&self) -> Policy {
        Policy::extract(&self.q)
    }

    /// `max_a Q(s, a)` for every state.
    pub fn state_values(&self) -> Array1<f64> {
        state_values(&self.q)
    }

    pub fn final_delta(&self) -> Option<f64> {
        self.deltas.last().copied()
    }
}

/// Runs structured value-based planning against a model.
#[derive(Debug, Clone)]
pub struct SvpPlanner {
    config: SvpConfig,
}

impl SvpPlanner {
    /// Validates `config` and builds a planner.
    ///
    /// # Errors
    /// `InvalidConfig` if `p` is not in `(0, 1]`, `gamma` is not in `[0, 1)`,
    /// the iteration cap is zero, or the tolerance is negative.
    pub fn new(config: SvpConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SvpConfig {
        &self.config
    }

    /// Plans on `model` starting from the all-zero Q-matrix.
    ///
    /// Each round's reconstruction starts its unobserved cells from the
    /// previous iterate. A round that samples no pair leaves the iterate as
    /// it was and never counts towards convergence.
    ///
    /// # Errors
    /// - `InvalidConfig` if the model has no states or no actions.
    /// - `ModelContract` for the first sampled pair whose transition or reward
    ///   is invalid.
    /// - `Io` if writing the configured output fails.
    pub fn plan<M>(&self, model: &M) -> Result<SvpOutcome>
    where
        M: MarkovDecisionProcess + Sync + ?Sized,
    {
        let (states, actions) = check_dimensions(model)?;
        let cfg = &self.config;
        let p = cfg.observation_probability;

        let mut estimator = MatrixEstimator::new(cfg.estimator.clone());
        if let Some((lo, hi)) = admissible_range(model, cfg.gamma) {
            estimator = estimator.with_clip(lo, hi);
        }
        let mut rng = match cfg.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        };

        let mut q = Array2::<f64>::zeros((states, actions));
        let mut deltas = Vec::new();
        let mut iterations = 0;
        let mut observed_pairs = 0;
        let mut converged = false;

        for t in 0..cfg.max_iterations {
            iterations = t + 1;
            let mask = ObservationMask::sample(states, actions, p, &mut rng)?;
            if mask.is_empty() {
                debug!(
                    "svp iteration {}: no pairs sampled, keeping the previous estimate",
                    t + 1
                );
                continue;
            }
            let backups = bellman_backup(model, &q, &mask, cfg.gamma)?;
            observed_pairs += backups.len();

            let next = estimator.estimate_with_prior(&backups, p, (states, actions), &q)?;
            let delta = max_abs_diff(&next, &q);
            q = next;
            deltas.push(delta);
            debug!(
                "svp iteration {}: {} of {} pairs backed up, max change {:.6e}",
                t + 1,
                backups.len(),
                states * actions,
                delta
            );

            if delta < cfg.tolerance {
                converged = true;
                break;
            }
        }

        if converged {
            info!(
                "svp converged after {} iterations ({} backups)",
                iterations, observed_pairs
            );
        } else {
            info!(
                "svp stopped at the iteration cap of {} (last change {:.6e})",
                iterations,
                deltas.last().copied().unwrap_or(f64::NAN)
            );
        }

        if let Some(path) = &cfg.output_path {
            write_q_matrix(path, &q)?;
            info!("wrote Q-matrix to {}", path.display());
        }

        Ok(SvpOutcome {
            q,
            iterations,
            converged,
            deltas,
            observed_pairs,
        })
    }
}

/// Plans with default estimator settings and returns the final Q-matrix.
///
/// # Examples
///
/// ```
/// use svp::mdp::tabular::TabularMdp;
/// use svp::planning::run;
///
/// let mdp = TabularMdp::new(
///     vec![vec![vec![(0, 1.0)]]],
///     vec![vec![1.0]],
/// )
/// .unwrap();
/// let q = run(&mdp, 1.0, 0.5, 200, 1e-9).unwrap();
/// assert!((q[[0, 0]] - 2.0).abs() < 1e-6);
/// ```
pub fn run<M>(
    model: &M,
    p: f64,
    gamma: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<Array2<f64>>
where
    M: MarkovDecisionProcess + Sync + ?Sized,
{
    let config = SvpConfig {
        observation_probability: p,
        gamma,
        max_iterations,
        tolerance,
        ..SvpConfig::default()
    };
    Ok(SvpPlanner::new(config)?.plan(model)?.q)
}

/// Exact one-step Bellman backup on every pair of `mask`:
///
/// `Q(s, a) = sum_{s'} P(s' | s, a) * (r(s, a) + gamma * max_{a'} q(s', a'))`
///
/// Returns `(state, action, value)` triples in the mask's row-major order.
pub fn bellman_backup<M>(
    model: &M,
    q: &Array2<f64>,
    mask: &ObservationMask,
    gamma: f64,
) -> Result<Vec<(usize, usize, f64)>>
where
    M: MarkovDecisionProcess + Sync + ?Sized,
{
    let values = state_values(q);
    let pairs: Vec<(usize, usize)> = mask.pairs().collect();
    let backup = |&(s, a): &(usize, usize)| -> Result<(usize, usize, f64)> {
        let (dist, reward) = checked_transition(model, s, a)?;
        let value: f64 = dist
            .iter()
            .map(|&(next, prob)| prob * (reward + gamma * values[next]))
            .sum();
        Ok((s, a, value))
    };

    #[cfg(feature = "parallel")]
    let results: Vec<Result<(usize, usize, f64)>> = pairs.par_iter().map(backup).collect();
    #[cfg(not(feature = "parallel"))]
    let results: Vec<Result<(usize, usize, f64)>> = pairs.iter().map(backup).collect();

    // First failure in row-major order, however the work was split.
    results.into_iter().collect()
}

/// `max_a q(s, a)` for every row.
pub fn state_values(q: &Array2<f64>) -> Array1<f64> {
    q.map_axis(Axis(1), |row| {
        row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Largest absolute elementwise difference between two equally shaped matrices.
pub fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Range every Q-value iterate started from zero stays inside.
fn admissible_range<M>(model: &M, gamma: f64) -> Option<(f64, f64)>
where
    M: MarkovDecisionProcess + ?Sized,
{
    let (r_min, r_max) = model.reward_range()?;
    if !r_min.is_finite() || !r_max.is_finite() {
        return None;
    }
    let horizon = 1.0 / (1.0 - gamma);
    Some((r_min.min(0.0) * horizon, r_max.max(0.0) * horizon))
}
