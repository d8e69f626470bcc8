//! Classical Q-value iteration, evaluating every state-action pair each round.
//!
//! This is the baseline the subsampled planner reduces to when every pair is
//! observed, and what it is measured against.

use log::debug;
use ndarray::Array2;

use crate::error::Result;
use crate::mdp::{check_dimensions, MarkovDecisionProcess};
use crate::planning::sampling::ObservationMask;
use crate::planning::svp::{bellman_backup, max_abs_diff};
use crate::policy::Policy;

/// Result of [`q_value_iteration`].
#[derive(Debug, Clone)]
pub struct ExactOutcome {
    pub q: Array2<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub deltas: Vec<f64>,
}

impl ExactOutcome {
    pub fn policy(&self) -> Policy {
        Policy::extract(&self.q)
    }
}

/// Performs Q-value iteration on the given MDP.
///
/// # Arguments
/// - `model`: the Markov Decision Process
/// - `gamma`: discount factor
/// - `max_iterations`: maximum number of iterations
/// - `tolerance`: stop early if the maximum change in the Q-matrix is < `tolerance`.
///
/// # Examples
///
/// ```
/// use svp::mdp::tabular::TabularMdp;
/// use svp::planning::exact::q_value_iteration;
///
/// let mdp = TabularMdp::new(
///     vec![
///         vec![vec![(0, 0.7), (1, 0.3)], vec![(1, 1.0)]],
///         vec![vec![(0, 0.4), (1, 0.6)], vec![(0, 0.1), (1, 0.9)]],
///     ],
///     vec![vec![1.0, 2.0], vec![0.8, 1.5]],
/// )
/// .unwrap();
/// let outcome = q_value_iteration(&mdp, 0.9, 100, 0.01).unwrap();
///
/// assert_eq!(outcome.q.dim(), (2, 2));
/// assert_eq!(outcome.policy().len(), 2);
/// ```
pub fn q_value_iteration<M>(
    model: &M,
    gamma: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<ExactOutcome>
where
    M: MarkovDecisionProcess + Sync + ?Sized,
{
    let (states, actions) = check_dimensions(model)?;
    let mask = ObservationMask::full(states, actions);
    let mut q = Array2::<f64>::zeros((states, actions));
    let mut deltas = Vec::new();
    let mut converged = false;

    for _iter in 0..max_iterations {
        // Updated values go into a fresh matrix to avoid partial updates
        let mut q_new = Array2::<f64>::zeros((states, actions));
        for (s, a, value) in bellman_backup(model, &q, &mask, gamma)? {
            q_new[[s, a]] = value;
        }

        let delta = max_abs_diff(&q_new, &q);
        q = q_new;
        deltas.push(delta);
        if delta < tolerance {
            converged = true;
            break;
        }
    }
    debug!(
        "q-value iteration finished after {} iterations (converged: {})",
        deltas.len(),
        converged
    );

    Ok(ExactOutcome {
        q,
        iterations: deltas.len(),
        converged,
        deltas,
    })
}
