//! An explicit, fully tabulated Markov decision process.

use std::borrow::Cow;

use ndarray::Array2;

use crate::error::{Result, SvpError};
use crate::mdp::{check_dimensions, checked_transition, MarkovDecisionProcess};

/// A Markov decision process stored as explicit transition and reward tables.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    /// For each (state, action), a list of (next_state, probability).
    ///
    /// Example:
    /// transitions[s][a] = vec![
    ///     (s_next_0, p_0),
    ///     (s_next_1, p_1),
    ///     ...
    /// ]
    ///
    /// The probabilities for each (s, a) sum to 1.0.
    transitions: Vec<Vec<Vec<(usize, f64)>>>,
    /// Reward for each (state, action), shape `num_states x num_actions`.
    rewards: Array2<f64>,
}

impl TabularMdp {
    /// Creates a new MDP. For each state s and action a, you provide a list of
    /// (next_state, probability) and a scalar reward.
    ///
    /// # Errors
    /// - `InvalidConfig` if the tables are empty or ragged.
    /// - `ModelContract` if any distribution does not sum to ~1.0, points
    ///   outside the state set, or a reward is not finite.
    ///
    /// # Examples
    ///
    /// ```
    /// use svp::mdp::tabular::TabularMdp;
    /// use svp::mdp::MarkovDecisionProcess;
    ///
    /// let transitions = vec![
    ///     // State 0
    ///     vec![vec![(0, 0.7), (1, 0.3)], vec![(1, 1.0)]],
    ///     // State 1
    ///     vec![vec![(0, 0.4), (1, 0.6)], vec![(0, 0.1), (1, 0.9)]],
    /// ];
    /// let rewards = vec![vec![1.0, 2.0], vec![0.5, 1.5]];
    ///
    /// let mdp = TabularMdp::new(transitions, rewards).unwrap();
    /// assert_eq!(mdp.state_count(), 2);
    /// assert_eq!(mdp.reward_range(), Some((0.5, 2.0)));
    /// ```
    pub fn new(transitions: Vec<Vec<Vec<(usize, f64)>>>, rewards: Vec<Vec<f64>>) -> Result<Self> {
        let num_states = transitions.len();
        let num_actions = transitions.first().map_or(0, |row| row.len());
        if num_states == 0 || num_actions == 0 {
            return Err(SvpError::invalid_config(
                "transition table must have at least one state and one action",
            ));
        }
        if rewards.len() != num_states {
            return Err(SvpError::invalid_config(format!(
                "reward table has {} rows for {} states",
                rewards.len(),
                num_states
            )));
        }
        for (s, (sa, rs)) in transitions.iter().zip(rewards.iter()).enumerate() {
            if sa.len() != num_actions || rs.len() != num_actions {
                return Err(SvpError::invalid_config(format!(
                    "state {} lists {} transitions and {} rewards, expected {}",
                    s,
                    sa.len(),
                    rs.len(),
                    num_actions
                )));
            }
        }

        let rewards = Array2::from_shape_fn((num_states, num_actions), |(s, a)| rewards[s][a]);
        let mdp = Self {
            transitions,
            rewards,
        };
        // Validate every pair up front; the table is small enough by construction.
        for s in 0..num_states {
            for a in 0..num_actions {
                checked_transition(&mdp, s, a)?;
            }
        }
        Ok(mdp)
    }

    /// Tabulates another model by querying every (state, action) pair once.
    pub fn from_model<M>(model: &M) -> Result<Self>
    where
        M: MarkovDecisionProcess + ?Sized,
    {
        let (num_states, num_actions) = check_dimensions(model)?;
        let mut transitions = Vec::with_capacity(num_states);
        let mut rewards = Array2::zeros((num_states, num_actions));
        for s in 0..num_states {
            let mut row = Vec::with_capacity(num_actions);
            for a in 0..num_actions {
                let (dist, reward) = checked_transition(model, s, a)?;
                row.push(dist.into_owned());
                rewards[[s, a]] = reward;
            }
            transitions.push(row);
        }
        Ok(Self {
            transitions,
            rewards,
        })
    }

    /// The reward table, rows = states, columns = actions.
    pub fn rewards(&self) -> &Array2<f64> {
        &self.rewards
    }
}

impl MarkovDecisionProcess for TabularMdp {
    fn state_count(&self) -> usize {
        self.transitions.len()
    }

    fn action_count(&self) -> usize {
        self.rewards.ncols()
    }

    fn transition(&self, state: usize, action: usize) -> Cow<'_, [(usize, f64)]> {
        Cow::Borrowed(self.transitions[state][action].as_slice())
    }

    fn reward(&self, state: usize, action: usize) -> f64 {
        self.rewards[[state, action]]
    }

    fn reward_range(&self) -> Option<(f64, f64)> {
        let min = self.rewards.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}
