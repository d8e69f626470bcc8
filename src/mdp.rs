//! The capability contract a discretized MDP has to satisfy for planning.
//!
//! States and actions are dense indices `0..state_count()` and
//! `0..action_count()`. How those indices map back onto physical quantities
//! (grid bounds, control magnitudes) belongs to the model, never to the planner.

pub mod tabular;

use std::borrow::Cow;

use crate::error::{Result, SvpError};

/// Probabilities of one transition distribution must sum to 1 within this.
pub const PROBABILITY_TOLERANCE: f64 = 1e-8;

/// A finite Markov decision process with a queryable model.
pub trait MarkovDecisionProcess {
    /// Number of discretized states.
    fn state_count(&self) -> usize;

    /// Number of discretized actions, available in every state.
    fn action_count(&self) -> usize;

    /// Distribution over next states as `(next_state, probability)` pairs.
    fn transition(&self, state: usize, action: usize) -> Cow<'_, [(usize, f64)]>;

    /// Immediate reward for taking `action` in `state`.
    fn reward(&self, state: usize, action: usize) -> f64;

    /// Bounds `(min, max)` on [`reward`](Self::reward), when known.
    ///
    /// The planner uses them to clamp estimated Q-values into the range the
    /// discounted return can actually take.
    fn reward_range(&self) -> Option<(f64, f64)> {
        None
    }
}

/// Rejects models with an empty state or action set.
pub fn check_dimensions<M>(model: &M) -> Result<(usize, usize)>
where
    M: MarkovDecisionProcess + ?Sized,
{
    let states = model.state_count();
    let actions = model.action_count();
    if states == 0 || actions == 0 {
        return Err(SvpError::invalid_config(format!(
            "model must have at least one state and one action, got {}x{}",
            states, actions
        )));
    }
    Ok((states, actions))
}

/// Queries the model for `(state, action)` and validates what comes back.
///
/// Returns the transition distribution and the reward. Any violation is
/// reported as [`SvpError::ModelContract`] naming the pair.
pub fn checked_transition<M>(
    model: &M,
    state: usize,
    action: usize,
) -> Result<(Cow<'_, [(usize, f64)]>, f64)>
where
    M: MarkovDecisionProcess + ?Sized,
{
    let states = model.state_count();
    let reward = model.reward(state, action);
    if !reward.is_finite() {
        return Err(SvpError::model_contract(
            state,
            action,
            format!("reward {} is not finite", reward),
        ));
    }

    let dist = model.transition(state, action);
    if dist.is_empty() {
        return Err(SvpError::model_contract(
            state,
            action,
            "transition distribution is empty",
        ));
    }
    let mut total = 0.0;
    for &(next, prob) in dist.iter() {
        if next >= states {
            return Err(SvpError::model_contract(
                state,
                action,
                format!("next state {} is outside 0..{}", next, states),
            ));
        }
        if !prob.is_finite() || prob < 0.0 {
            return Err(SvpError::model_contract(
                state,
                action,
                format!("probability {} of next state {} is invalid", prob, next),
            ));
        }
        total += prob;
    }
    if (total - 1.0).abs() >= PROBABILITY_TOLERANCE {
        return Err(SvpError::model_contract(
            state,
            action,
            format!("probabilities sum to {}, expected 1.0", total),
        ));
    }

    Ok((dist, reward))
}
