//! Rolls a policy forward under the true model, for checking what a plan does.

use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::Distribution;

use crate::error::{Result, SvpError};
use crate::mdp::{checked_transition, MarkovDecisionProcess};
use crate::policy::Policy;

/// States visited, actions taken and rewards collected along one rollout.
///
/// `states` has one more entry than `actions` and `rewards`: it starts with
/// the initial state and ends with the state reached after the last step.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub states: Vec<usize>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f64>,
}

impl Trajectory {
    pub fn total_reward(&self) -> f64 {
        self.rewards.iter().sum()
    }

    pub fn discounted_return(&self, gamma: f64) -> f64 {
        self.rewards
            .iter()
            .rev()
            .fold(0.0, |acc, &r| r + gamma * acc)
    }

    pub fn final_state(&self) -> usize {
        // Never empty: the initial state is pushed before stepping.
        self.states[self.states.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Follows `policy` from `initial_state` for `horizon` steps.
///
/// Next states are drawn from the model's transition distribution; a
/// single-state support is followed without touching `rng`.
///
/// # Errors
/// - `InvalidConfig` if the policy does not cover every state or
///   `initial_state` is out of range.
/// - `ModelContract` if a visited pair has an invalid transition or reward.
pub fn simulate<M, R>(
    model: &M,
    policy: &Policy,
    initial_state: usize,
    horizon: usize,
    rng: &mut R,
) -> Result<Trajectory>
where
    M: MarkovDecisionProcess + ?Sized,
    R: Rng + ?Sized,
{
    let states = model.state_count();
    if policy.len() != states {
        return Err(SvpError::invalid_config(format!(
            "policy covers {} states, model has {}",
            policy.len(),
            states
        )));
    }
    if initial_state >= states {
        return Err(SvpError::invalid_config(format!(
            "initial state {} is outside 0..{}",
            initial_state, states
        )));
    }

    let mut trajectory = Trajectory {
        states: Vec::with_capacity(horizon + 1),
        actions: Vec::with_capacity(horizon),
        rewards: Vec::with_capacity(horizon),
    };
    let mut state = initial_state;
    trajectory.states.push(state);

    for _ in 0..horizon {
        let action = policy.actions()[state];
        if action >= model.action_count() {
            return Err(SvpError::invalid_config(format!(
                "policy picks action {} in state {}, model has {} actions",
                action,
                state,
                model.action_count()
            )));
        }
        let (dist, reward) = checked_transition(model, state, action)?;
        let next = match &*dist {
            [(only, _)] => *only,
            support => {
                let weights = WeightedIndex::new(support.iter().map(|&(_, prob)| prob))
                    .map_err(|e| SvpError::model_contract(state, action, e.to_string()))?;
                support[weights.sample(rng)].0
            }
        };

        trajectory.actions.push(action);
        trajectory.rewards.push(reward);
        trajectory.states.push(next);
        state = next;
    }

    Ok(trajectory)
}
